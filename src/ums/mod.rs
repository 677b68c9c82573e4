//! USB Mass Storage Bulk-Only target, using the CBW/CSW framing and opcode
//! table in [`bot`]/[`scsi`] and a layered `thiserror` error enum driving a
//! steady-state main loop.
//!
//! Threading is the caller's responsibility: [`UmsTarget::run_main_loop`]
//! is meant to run on its own worker thread, spawned once
//! [`UmsTarget::is_online`] reports the gadget enumerated and a 500 ms
//! settling delay has elapsed, while the caller blocks on
//! [`crate::kmsg::wait_for_keypress`] and then calls [`UmsTarget::stop`]
//! followed by [`UmsTarget::exit_mode`]. `queue_request` is synchronous: a
//! concrete target wires up the actual OS thread, and the trait-shaped code
//! here only needs the `active` flag to know when to stop.

pub mod bot;
pub mod dma;
pub mod scsi;

use thiserror::Error;

use abcore_pal::block::BlockDevice;
use abcore_pal::cache::CacheOps;
use abcore_pal::usb::{Direction, EndpointHandle, GadgetDescriptor, RequestHandle, UsbController};

use crate::mount::{resolve_base_device, DeviceEnumerator, MountError};

use bot::{Cbw, Csw, CswStatus, CBW_LEN};
use dma::DmaBuffer;
use scsi::{Context as ScsiContext, Outcome, Sense};

/// Fixed vendor/product identity this target presents on enumeration.
const GADGET_DESCRIPTOR: GadgetDescriptor = GadgetDescriptor {
    vendor_id: 0x18D1,
    product_id: 0xD00D,
    class: GadgetDescriptor::MASS_STORAGE_CLASS,
    subclass: GadgetDescriptor::SCSI_TRANSPARENT_SUBCLASS,
    protocol: GadgetDescriptor::BULK_ONLY_TRANSPORT_PROTOCOL,
};

#[derive(Error, Debug)]
pub enum UmsError {
    #[error("partition '{0}' did not appear after 30 retries")]
    PartitionNotFound(String),
    #[error("controller error: {0}")]
    Controller(std::io::Error),
}

/// Resolve `partition_name` to a concrete device name, retrying up to
/// `attempts` times with `sleep` called between tries, to tolerate a
/// block-device layer that is still publishing nodes.
pub fn resolve_partition_device(
    enumerator: &dyn DeviceEnumerator,
    partition_name: &str,
    attempts: u32,
    sleep: &mut dyn FnMut(),
) -> Result<String, UmsError> {
    let mut last: Result<String, MountError> =
        Err(MountError::DeviceNotFound(partition_name.to_string()));
    for attempt in 0..attempts.max(1) {
        match resolve_base_device(enumerator, partition_name) {
            Ok(device) => return Ok(device),
            Err(err) => {
                last = Err(err);
                if attempt + 1 < attempts {
                    sleep();
                }
            }
        }
    }
    log::error!("ums: {} after retries: {}", partition_name, last.unwrap_err());
    Err(UmsError::PartitionNotFound(partition_name.to_string()))
}

/// Process-wide UMS device state, borrowing its block device, controller
/// and cache collaborators for the duration of the session.
pub struct UmsTarget<'a> {
    controller: &'a mut dyn UsbController,
    device: &'a mut dyn BlockDevice,
    cache: &'a dyn CacheOps,
    dma: DmaBuffer,
    ep_out: EndpointHandle,
    ep_in: EndpointHandle,
    req_out: RequestHandle,
    req_in: RequestHandle,
    partition_name: String,
    read_only: bool,
    block_count: u64,
    block_size: u32,
    sense: Sense,
    active: bool,
}

impl<'a> UmsTarget<'a> {
    /// Bring the controller up, allocate the bulk pair, register the
    /// gadget and start it. The caller has already resolved and opened
    /// `device` ([`resolve_partition_device`]'s retry loop runs
    /// beforehand).
    pub fn enter_mode(
        partition_name: &str,
        device: &'a mut dyn BlockDevice,
        controller: &'a mut dyn UsbController,
        cache: &'a dyn CacheOps,
        scratch_bytes: usize,
        read_only: bool,
    ) -> Result<UmsTarget<'a>, UmsError> {
        controller.init().map_err(UmsError::Controller)?;
        let ep_out = controller.alloc_endpoint(Direction::Out).map_err(UmsError::Controller)?;
        let ep_in = controller.alloc_endpoint(Direction::In).map_err(UmsError::Controller)?;
        let req_out = controller.alloc_request(ep_out).map_err(UmsError::Controller)?;
        let req_in = controller.alloc_request(ep_in).map_err(UmsError::Controller)?;
        controller.register_gadget(GADGET_DESCRIPTOR).map_err(UmsError::Controller)?;
        controller.start().map_err(UmsError::Controller)?;

        let block_size = device.block_size();
        let block_count = device.block_count();
        let is_read_only = device.is_read_only();
        let dma = DmaBuffer::new(scratch_bytes, block_size);

        Ok(UmsTarget {
            controller,
            device,
            cache,
            dma,
            ep_out,
            ep_in,
            req_out,
            req_in,
            partition_name: partition_name.to_string(),
            read_only: read_only || is_read_only,
            block_count,
            block_size,
            sense: Sense::NO_SENSE,
            active: true,
        })
    }

    pub fn stop(&mut self) {
        self.active = false;
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Has the gadget finished enumeration (`SET_CONFIGURATION` observed)?
    /// The caller should wait for this, plus a 500 ms settling delay,
    /// before spawning [`UmsTarget::run_main_loop`].
    pub fn is_online(&self) -> bool {
        self.controller.is_online()
    }

    /// Stop the controller and free the allocated requests/endpoints. The
    /// scratch buffer is dropped with `self`, which plays the role of
    /// nulling the scratch pointer without freeing it at this abstraction
    /// layer (there is no separate free to skip).
    pub fn exit_mode(self) -> std::io::Result<()> {
        self.controller.stop()?;
        self.controller.free_request(self.ep_out, self.req_out)?;
        self.controller.free_request(self.ep_in, self.req_in)?;
        self.controller.free_endpoint(self.ep_out)?;
        self.controller.free_endpoint(self.ep_in)?;
        Ok(())
    }

    fn scsi_context(&self) -> ScsiContext {
        ScsiContext {
            mounted: true,
            read_only: self.read_only,
            block_count: self.block_count,
            block_size: self.block_size,
        }
    }

    /// Send `bytes` over the IN endpoint, chunked to the controller's max
    /// transfer size. Takes the controller/endpoint/request apart from
    /// `self` so callers can pass `self.dma.as_mut_slice()` directly
    /// without a second mutable borrow of `self`.
    fn send_in(
        controller: &mut dyn UsbController,
        ep: EndpointHandle,
        req: RequestHandle,
        bytes: &mut [u8],
    ) -> std::io::Result<()> {
        let max_xfer = controller.kind().max_transfer_bytes();
        let mut offset = 0;
        while offset < bytes.len() {
            let len = (bytes.len() - offset).min(max_xfer);
            controller.queue_request(ep, req, &mut bytes[offset..offset + len])?;
            offset += len;
        }
        Ok(())
    }

    fn recv_out(
        controller: &mut dyn UsbController,
        ep: EndpointHandle,
        req: RequestHandle,
        bytes: &mut [u8],
    ) -> std::io::Result<()> {
        let max_xfer = controller.kind().max_transfer_bytes();
        let mut offset = 0;
        while offset < bytes.len() {
            let len = (bytes.len() - offset).min(max_xfer);
            controller.queue_request(ep, req, &mut bytes[offset..offset + len])?;
            offset += len;
        }
        Ok(())
    }

    /// READ (10): chunk by the DMA buffer's block capacity, reading one
    /// chunk off the device and pushing it to the host before reading the
    /// next. The cleaned/invalidated `self.dma` buffer is handed straight
    /// to the controller, mirroring `service_write`'s no-copy pattern,
    /// since `DmaBuffer`/`CacheOps` only do anything useful if the bytes
    /// the controller DMAs from are the same bytes the cache was just
    /// maintained on.
    fn service_read(&mut self, lba: u64, block_count: u32) -> std::io::Result<()> {
        let chunk_blocks = self.dma.block_capacity(self.block_size).max(1);
        let mut remaining = block_count;
        let mut cur_lba = lba;
        while remaining > 0 {
            let this_chunk = remaining.min(chunk_blocks);
            let chunk_bytes = this_chunk as usize * self.block_size as usize;
            {
                let buf = &mut self.dma.as_mut_slice()[..chunk_bytes];
                self.device.read_at(cur_lba * self.block_size as u64, buf)?;
            }
            self.dma.clean_invalidate(self.cache);
            let buf = &mut self.dma.as_mut_slice()[..chunk_bytes];
            Self::send_in(self.controller, self.ep_in, self.req_in, buf)?;
            cur_lba += this_chunk as u64;
            remaining -= this_chunk;
        }
        Ok(())
    }

    /// WRITE (10): symmetric to `service_read`, with a post-receive cache
    /// invalidate before the block write.
    fn service_write(&mut self, lba: u64, block_count: u32) -> std::io::Result<()> {
        let chunk_blocks = self.dma.block_capacity(self.block_size).max(1);
        let mut remaining = block_count;
        let mut cur_lba = lba;
        while remaining > 0 {
            let this_chunk = remaining.min(chunk_blocks);
            let chunk_bytes = this_chunk as usize * self.block_size as usize;
            {
                let buf = &mut self.dma.as_mut_slice()[..chunk_bytes];
                Self::recv_out(self.controller, self.ep_out, self.req_out, buf)?;
            }
            self.dma.invalidate(self.cache);
            let buf = &self.dma.as_mut_slice()[..chunk_bytes];
            self.device.write_at(cur_lba * self.block_size as u64, buf)?;
            cur_lba += this_chunk as u64;
            remaining -= this_chunk;
        }
        Ok(())
    }

    /// One iteration of the main loop: read a CBW, dispatch it, perform any
    /// data phase, and send the CSW. A malformed CBW is silently dropped
    /// rather than stalling the endpoints.
    pub fn service_one_command(&mut self) -> std::io::Result<()> {
        let mut cbw_buf = [0u8; CBW_LEN];
        self.cache.clean_invalidate(&mut cbw_buf);
        let len = self.controller.queue_request(self.ep_out, self.req_out, &mut cbw_buf)?;
        self.cache.invalidate(&mut cbw_buf);

        let cbw = match Cbw::parse(&cbw_buf[..len]) {
            Some(cbw) => cbw,
            None => return Ok(()),
        };

        let outcome = scsi::dispatch(&cbw.command_block, &self.scsi_context(), &mut self.sense);

        let (status, residue, io_result) = match outcome {
            Outcome::StatusOnly => (CswStatus::Good, 0, Ok(())),
            Outcome::DataIn(mut bytes) => {
                (CswStatus::Good, 0, Self::send_in(self.controller, self.ep_in, self.req_in, &mut bytes))
            }
            Outcome::Read { lba, block_count } => {
                let result = self.service_read(lba, block_count);
                match &result {
                    Ok(()) => (CswStatus::Good, 0, Ok(())),
                    Err(_) => {
                        self.sense = Sense {
                            key: scsi::KEY_MEDIUM_ERROR,
                            asc: 0,
                            ascq: 0,
                        };
                        (CswStatus::Failed, cbw.data_transfer_length, Ok(()))
                    }
                }
            }
            Outcome::Write { lba, block_count } => {
                let result = self.service_write(lba, block_count);
                match &result {
                    Ok(()) => (CswStatus::Good, 0, Ok(())),
                    Err(_) => {
                        self.sense = Sense {
                            key: scsi::KEY_MEDIUM_ERROR,
                            asc: 0,
                            ascq: 0,
                        };
                        (CswStatus::Failed, cbw.data_transfer_length, Ok(()))
                    }
                }
            }
            Outcome::Fail => (CswStatus::Failed, cbw.data_transfer_length, Ok(())),
        };
        io_result?;

        let csw = Csw {
            tag: cbw.tag,
            data_residue: residue,
            status,
        };
        let mut csw_bytes = csw.serialize();
        self.cache.clean_invalidate(&mut csw_bytes);
        self.controller.queue_request(self.ep_in, self.req_in, &mut csw_bytes)?;
        Ok(())
    }

    /// Loop servicing commands until [`UmsTarget::stop`] clears `active`.
    pub fn run_main_loop(&mut self) {
        while self.active {
            if let Err(err) = self.service_one_command() {
                log::error!("ums: transfer failed on '{}': {}", self.partition_name, err);
            }
        }
    }
}
