use std::io;

/// Which of the two controller families backs this target. Drives the
/// maximum bytes a single queued transfer may carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControllerKind {
    /// Legacy high-speed controller. 32 KiB max per queued transfer.
    HighSpeed,
    /// SuperSpeed ("dwc"-style) controller. 16 MiB max per queued transfer.
    SuperSpeed,
}

impl ControllerKind {
    pub fn max_transfer_bytes(self) -> usize {
        match self {
            ControllerKind::HighSpeed => 32 * 1024,
            ControllerKind::SuperSpeed => 16 * 1024 * 1024,
        }
    }

    pub fn max_packet_size(self) -> u16 {
        match self {
            ControllerKind::HighSpeed => 512,
            ControllerKind::SuperSpeed => 1024,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    In,
    Out,
}

/// The fixed identity this target presents on enumeration: USB Mass
/// Storage / SCSI transparent / Bulk-Only Transport (class 0x08, subclass
/// 0x06, protocol 0x50), plus a vendor/product id pair. Built by
/// [`crate::usb`]'s caller and handed to [`UsbController::register_gadget`].
/// The descriptor bytes themselves are the controller driver's concern;
/// this struct only carries the values the UMS Target is responsible for
/// choosing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GadgetDescriptor {
    pub vendor_id: u16,
    pub product_id: u16,
    pub class: u8,
    pub subclass: u8,
    pub protocol: u8,
}

impl GadgetDescriptor {
    pub const MASS_STORAGE_CLASS: u8 = 0x08;
    pub const SCSI_TRANSPARENT_SUBCLASS: u8 = 0x06;
    pub const BULK_ONLY_TRANSPORT_PROTOCOL: u8 = 0x50;
}

/// Opaque endpoint handle returned by [`UsbController::alloc_endpoint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EndpointHandle(pub u32);

/// Opaque request handle returned by [`UsbController::alloc_request`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestHandle(pub u32);

/// The function-table-shaped capability set a USB device controller must
/// provide. `queue_request` is synchronous: under the bulk-only transport's
/// own invariant of at most one outstanding transfer per endpoint, a
/// callback-plus-event-wait and a direct blocking call are observationally
/// identical, so this trait models the simpler of the two. A concrete
/// implementation may still register an interrupt-context completion
/// callback internally and resolve this call from it.
pub trait UsbController {
    fn kind(&self) -> ControllerKind;

    fn init(&mut self) -> io::Result<()>;
    fn start(&mut self) -> io::Result<()>;
    fn stop(&mut self) -> io::Result<()>;

    /// Register the gadget descriptor set so enumeration can proceed.
    fn register_gadget(&mut self, descriptor: GadgetDescriptor) -> io::Result<()>;

    fn alloc_endpoint(&mut self, direction: Direction) -> io::Result<EndpointHandle>;

    /// Optional: some controllers have no distinct endpoint-free operation.
    /// Default is a no-op, matching controllers without the hook.
    fn free_endpoint(&mut self, _ep: EndpointHandle) -> io::Result<()> {
        Ok(())
    }

    fn alloc_request(&mut self, ep: EndpointHandle) -> io::Result<RequestHandle>;
    fn free_request(&mut self, ep: EndpointHandle, req: RequestHandle) -> io::Result<()>;

    /// Queue `buf` on `ep` using `req`, block until completion, and return
    /// the number of bytes actually transferred. Must never be asked to
    /// transfer more than `self.kind().max_transfer_bytes()`.
    fn queue_request(
        &mut self,
        ep: EndpointHandle,
        req: RequestHandle,
        buf: &mut [u8],
    ) -> io::Result<usize>;

    /// True once the gadget has completed enumeration (SET_CONFIGURATION
    /// observed). The UMS main loop blocks on this before starting.
    fn is_online(&self) -> bool;

    /// Stall both bulk endpoints pending a Bulk-Only Mass Storage Reset.
    /// Not called by this crate's main loop, but exposed for stricter
    /// callers that want to stall on an invalid CBW.
    fn stall_endpoint(&mut self, _ep: EndpointHandle) -> io::Result<()> {
        Ok(())
    }
}
