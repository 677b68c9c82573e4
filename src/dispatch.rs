//! The Boot Dispatcher: drives slot choice end-to-end and hands control to
//! the kernel loader.
//!
//! A plain function steps through injected collaborator traits (resolve a
//! device, load an env, mount a slot, parse a boot descriptor), returning a
//! `thiserror` enum rather than panicking on the first failure.

use thiserror::Error;

use abcore_pal::block::{BlockDevice, SubDevicePublisher};
use abcore_pal::fs::{FilesystemDriver, Mount};
use abcore_pal::kernel::KernelLoader;

use crate::cmdline::CmdlineDirectives;
use crate::config::BootConfig;
use crate::env::{EnvError, EnvStore};
use crate::extlinux::{ExtlinuxConfig, ExtlinuxError};
use crate::mount::{fallback_candidates, resolve_base_device, DeviceEnumerator, MountError};
use crate::slot::{current_slot, decrement, next_slot, DecrementOutcome, SlotError};

#[derive(Error, Debug)]
pub enum DispatchError {
    #[error("env store error: {0}")]
    Env(#[from] EnvError),
    #[error("slot selection error: {0}")]
    Slot(#[from] SlotError),
    #[error("base device resolution failed: {0}")]
    BaseDevice(#[from] MountError),
    #[error("publishing slot sub-device failed: {0}")]
    Publish(std::io::Error),
    #[error("mounting slot failed: {0}")]
    Mount(std::io::Error),
    #[error("reading /extlinux/extlinux.conf failed: {0}")]
    ReadExtlinux(std::io::Error),
    #[error("selecting boot entry failed: {0}")]
    Extlinux(#[from] ExtlinuxError),
    #[error("no usable boot entry found")]
    NoBootEntry,
    #[error("kernel hand-off failed: {0}")]
    KernelBoot(std::io::Error),
    #[error("no base device configured for A/B boot")]
    NotAbConfigured,
}

/// The outcome of selecting a boot entry: the entry itself plus the
/// interpreted `lk2nd.*` directives found in its `append` line. Kernel
/// hand-off consumes both.
pub struct Selection {
    pub kernel: String,
    pub initrd: Option<String>,
    pub fdt: Option<String>,
    pub fdt_overlays: Vec<String>,
    pub append: String,
    pub directives: CmdlineDirectives,
}

fn slot_offset(config: &BootConfig, slot: char) -> u64 {
    match slot {
        'B' => config.slot_b_offset,
        _ => config.slot_a_offset,
    }
}

/// Pick the slot to attempt and record the attempt against its counter. A
/// slot whose next-in-order sibling is also exhausted is still returned (as
/// a last resort) rather than silently falling over.
fn pick_and_record_slot(env: &mut EnvStore) -> Result<char, DispatchError> {
    let mut slot = current_slot(env)?;
    if let DecrementOutcome::Exhausted = decrement(env, slot)? {
        if let Some(next) = next_slot(env, slot) {
            slot = next;
            decrement(env, slot)?;
        }
    }
    Ok(slot)
}

fn load_entry_from_mount<M: Mount>(mount: &M, slot: char) -> Result<Selection, DispatchError> {
    let bytes = mount
        .read_file("/extlinux/extlinux.conf")
        .map_err(DispatchError::ReadExtlinux)?;
    let contents = String::from_utf8_lossy(&bytes);
    let config = ExtlinuxConfig::parse(&contents);
    let entry = config.select_entry(slot)?;
    Ok(Selection {
        kernel: entry.kernel.clone(),
        initrd: entry.initrd.clone(),
        fdt: entry.fdt.clone(),
        fdt_overlays: entry.fdt_overlays.clone(),
        append: entry.append.clone(),
        directives: CmdlineDirectives::parse(&entry.append),
    })
}

/// Run the full A/B pre-boot sequence and return the selected entry without
/// handing off to the kernel loader, so callers can log or otherwise
/// inspect the decision before booting.
pub fn resolve_ab_boot<F: FilesystemDriver>(
    config: &BootConfig,
    device: &mut dyn BlockDevice,
    enumerator: &dyn DeviceEnumerator,
    publisher: &mut dyn SubDevicePublisher,
    fs: &mut F,
) -> Result<Selection, DispatchError> {
    let base_device_name = config.base_device.as_deref().ok_or(DispatchError::NotAbConfigured)?;
    let resolved = resolve_base_device(enumerator, base_device_name)?;

    let mut env = EnvStore::init(device, config.env_offset, config.env_size)?;
    let slot = pick_and_record_slot(&mut env)?;
    env.save(device, config.env_offset)?;

    let sub_device = publisher
        .publish(&resolved, slot_offset(config, slot), config.ab_subdevice_name)
        .map_err(DispatchError::Publish)?;
    let mount = fs.mount(&sub_device, true).map_err(DispatchError::Mount)?;
    let selection = load_entry_from_mount(&mount, slot);
    let _ = mount.unmount();
    selection
}

/// Non-A/B fallback: scan leaf block devices, skip undersized
/// non-boot-labeled ones, and boot the `default` label of the first device
/// that mounts and parses cleanly.
pub fn resolve_fallback_boot<F: FilesystemDriver>(
    config: &BootConfig,
    enumerator: &dyn DeviceEnumerator,
    fs: &mut F,
) -> Result<Selection, DispatchError> {
    for device in fallback_candidates(enumerator, config.min_fallback_partition_size) {
        let mount = match fs.mount(&device, true) {
            Ok(m) => m,
            Err(_) => continue,
        };
        let bytes = match mount.read_file("/extlinux/extlinux.conf") {
            Ok(b) => b,
            Err(_) => {
                let _ = mount.unmount();
                continue;
            }
        };
        let contents = String::from_utf8_lossy(&bytes);
        let parsed = ExtlinuxConfig::parse(&contents);
        let entry = parsed.select_default().cloned();
        let _ = mount.unmount();
        if let Some(entry) = entry {
            return Ok(Selection {
                kernel: entry.kernel,
                initrd: entry.initrd,
                fdt: entry.fdt,
                fdt_overlays: entry.fdt_overlays,
                append: entry.append.clone(),
                directives: CmdlineDirectives::parse(&entry.append),
            });
        }
    }
    Err(DispatchError::NoBootEntry)
}

/// Top-level entry point: run A/B if configured, else the non-A/B fallback
/// scan, then hand the selection off to `kernel_loader`. Steps through
/// Init, ResolveBase, LoadEnv, PickSlot, DecrementAndPersist, PublishSubdev,
/// Mount and ParseEntry before the terminal hand-off, falling over to the
/// scan on any earlier step's failure.
pub fn dispatch<F: FilesystemDriver, K: KernelLoader>(
    config: &BootConfig,
    device: &mut dyn BlockDevice,
    enumerator: &dyn DeviceEnumerator,
    publisher: &mut dyn SubDevicePublisher,
    fs: &mut F,
    kernel_loader: &mut K,
) -> Result<(), DispatchError> {
    let selection = if config.is_ab_configured() {
        match resolve_ab_boot(config, device, enumerator, publisher, fs) {
            Ok(selection) => selection,
            Err(err) => {
                log::error!("dispatch: A/B boot failed ({}), falling back to scan", err);
                resolve_fallback_boot(config, enumerator, fs)?
            }
        }
    } else {
        resolve_fallback_boot(config, enumerator, fs)?
    };

    kernel_loader
        .boot(
            &selection.kernel,
            selection.initrd.as_deref(),
            selection.fdt.as_deref(),
            &selection.fdt_overlays,
            &selection.append,
        )
        .map_err(DispatchError::KernelBoot)
}

#[cfg(test)]
mod test {
    use super::*;
    use std::cell::RefCell;
    use std::collections::HashMap;
    use std::io;

    struct FakeDevice {
        bytes: Vec<u8>,
    }
    impl BlockDevice for FakeDevice {
        fn block_size(&self) -> u32 {
            512
        }
        fn block_count(&self) -> u64 {
            (self.bytes.len() as u64) / 512
        }
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
            let offset = offset as usize;
            buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
            Ok(())
        }
        fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()> {
            let offset = offset as usize;
            self.bytes[offset..offset + buf.len()].copy_from_slice(buf);
            Ok(())
        }
    }

    struct FakeEnumerator {
        existing: Vec<String>,
    }
    impl DeviceEnumerator for FakeEnumerator {
        fn exists(&self, device: &str) -> bool {
            self.existing.iter().any(|d| d == device)
        }
        fn list_devices(&self) -> Vec<String> {
            self.existing.clone()
        }
        fn gpt_label(&self, _device: &str) -> Option<String> {
            None
        }
        fn size_bytes(&self, _device: &str) -> u64 {
            64 * 1024 * 1024
        }
    }

    struct FakePublisher;
    impl SubDevicePublisher for FakePublisher {
        fn publish(&mut self, base_device: &str, offset: u64, name: &str) -> io::Result<String> {
            Ok(format!("{}@{}:{}", base_device, offset, name))
        }
    }

    struct FakeMount {
        files: HashMap<String, Vec<u8>>,
    }
    impl Mount for FakeMount {
        fn read_file(&self, path: &str) -> io::Result<Vec<u8>> {
            self.files
                .get(path)
                .cloned()
                .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
        }
        fn unmount(self) -> io::Result<()> {
            Ok(())
        }
    }

    struct FakeFs {
        extlinux: &'static str,
        fail_devices: Vec<String>,
    }
    impl FilesystemDriver for FakeFs {
        type Mount = FakeMount;
        fn mount(&mut self, device: &str, _read_only: bool) -> io::Result<FakeMount> {
            if self.fail_devices.iter().any(|d| d == device) {
                return Err(io::Error::new(io::ErrorKind::Other, "mount failed"));
            }
            let mut files = HashMap::new();
            files.insert("/extlinux/extlinux.conf".to_string(), self.extlinux.as_bytes().to_vec());
            Ok(FakeMount { files })
        }
    }

    struct FakeKernelLoader {
        booted: RefCell<Option<String>>,
    }
    impl KernelLoader for FakeKernelLoader {
        fn boot(
            &mut self,
            kernel_path: &str,
            _initrd_path: Option<&str>,
            _fdt_path: Option<&str>,
            _fdt_overlays: &[String],
            _append: &str,
        ) -> io::Result<()> {
            *self.booted.borrow_mut() = Some(kernel_path.to_string());
            Ok(())
        }
    }

    const EXTLINUX: &str = "default linux\nlabel linux_A\n  linux /boot/Image_A\n  append root=/dev/sda1\nlabel linux_B\n  linux /boot/Image_B\n  append root=/dev/sda2\n";

    fn ab_config() -> BootConfig {
        BootConfig {
            base_device: Some("mmc0".into()),
            slot_a_offset: 0x10_0000,
            slot_b_offset: 0x410_0000,
            ..BootConfig::default()
        }
    }

    #[test]
    fn ab_dispatch_boots_slot_a_on_first_run() {
        let config = ab_config();
        let mut device = FakeDevice {
            bytes: vec![0xFFu8; config.env_size],
        };
        let enumerator = FakeEnumerator {
            existing: vec!["mmc0".into()],
        };
        let mut publisher = FakePublisher;
        let mut fs = FakeFs {
            extlinux: EXTLINUX,
            fail_devices: vec![],
        };
        let mut kernel_loader = FakeKernelLoader {
            booted: RefCell::new(None),
        };

        dispatch(&config, &mut device, &enumerator, &mut publisher, &mut fs, &mut kernel_loader).unwrap();
        assert_eq!(kernel_loader.booted.into_inner(), Some("/boot/Image_A".to_string()));
    }

    #[test]
    fn ab_dispatch_skips_exhausted_slot_a_for_slot_b() {
        let config = ab_config();
        let mut device = FakeDevice {
            bytes: vec![0xFFu8; config.env_size],
        };
        {
            // Exhaust slot A up front by writing a store where BOOT_A_LEFT=0.
            let mut env = EnvStore::init(&mut device, config.env_offset, config.env_size).unwrap();
            env.set("BOOT_A_LEFT", "0").unwrap();
            env.save(&mut device, config.env_offset).unwrap();
        }
        let enumerator = FakeEnumerator {
            existing: vec!["mmc0".into()],
        };
        let mut publisher = FakePublisher;
        let mut fs = FakeFs {
            extlinux: EXTLINUX,
            fail_devices: vec![],
        };
        let mut kernel_loader = FakeKernelLoader {
            booted: RefCell::new(None),
        };

        dispatch(&config, &mut device, &enumerator, &mut publisher, &mut fs, &mut kernel_loader).unwrap();
        assert_eq!(kernel_loader.booted.into_inner(), Some("/boot/Image_B".to_string()));
    }

    #[test]
    fn unconfigured_ab_runs_non_ab_fallback_scan() {
        let config = BootConfig::default();
        let mut device = FakeDevice { bytes: vec![0u8; 0] };
        let enumerator = FakeEnumerator {
            existing: vec!["sda1".into(), "sda2".into()],
        };
        let mut publisher = FakePublisher;
        let mut fs = FakeFs {
            extlinux: "default linux\nlabel linux\n  linux /boot/Image\n",
            fail_devices: vec!["sda1".into()],
        };
        let mut kernel_loader = FakeKernelLoader {
            booted: RefCell::new(None),
        };

        dispatch(&config, &mut device, &enumerator, &mut publisher, &mut fs, &mut kernel_loader).unwrap();
        assert_eq!(kernel_loader.booted.into_inner(), Some("/boot/Image".to_string()));
    }

    #[test]
    fn ab_failure_falls_back_to_scan_without_panicking() {
        let config = ab_config();
        let mut device = FakeDevice {
            bytes: vec![0xFFu8; config.env_size],
        };
        // base device does not exist, forcing resolve_base_device to fail.
        let enumerator = FakeEnumerator { existing: vec!["other_dev".into()] };
        let mut publisher = FakePublisher;
        let mut fs = FakeFs {
            extlinux: "default linux\nlabel linux\n  linux /boot/Image_fallback\n",
            fail_devices: vec![],
        };
        let mut kernel_loader = FakeKernelLoader {
            booted: RefCell::new(None),
        };

        dispatch(&config, &mut device, &enumerator, &mut publisher, &mut fs, &mut kernel_loader).unwrap();
        assert_eq!(kernel_loader.booted.into_inner(), Some("/boot/Image_fallback".to_string()));
    }
}
