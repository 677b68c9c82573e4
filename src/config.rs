//! Build-time configuration for the boot core.
//!
//! A single overridable struct carries every offset this core needs: the
//! env region, both slots, the fallback threshold, and the controller
//! family.

use abcore_pal::usb::ControllerKind;

/// Default byte offset of the env region within the base device.
pub const DEFAULT_ENV_OFFSET: u64 = 0x1_0000;
/// Default size of the env region, in bytes.
pub const DEFAULT_ENV_SIZE: usize = 0x2_0000;

/// Minimum partition size considered during the non-A/B fallback scan,
/// unless the partition's GPT label starts with "boot".
pub const DEFAULT_MIN_FALLBACK_PARTITION_SIZE: u64 = 16 * 1024 * 1024;

/// Name the Boot Dispatcher publishes the selected slot's sub-device under.
pub const DEFAULT_AB_SUBDEVICE_NAME: &str = "ab-slot";

#[derive(Debug, Clone)]
pub struct BootConfig {
    /// Name of the base block device holding the env region and both slots.
    /// `None` means A/B is not configured and the dispatcher always runs
    /// the non-A/B fallback scan.
    pub base_device: Option<String>,
    pub env_offset: u64,
    pub env_size: usize,
    pub slot_a_offset: u64,
    pub slot_b_offset: u64,
    pub min_fallback_partition_size: u64,
    pub ab_subdevice_name: &'static str,
    pub controller_kind: ControllerKind,
}

impl Default for BootConfig {
    fn default() -> Self {
        BootConfig {
            base_device: None,
            env_offset: DEFAULT_ENV_OFFSET,
            env_size: DEFAULT_ENV_SIZE,
            slot_a_offset: 0,
            slot_b_offset: 0,
            min_fallback_partition_size: DEFAULT_MIN_FALLBACK_PARTITION_SIZE,
            ab_subdevice_name: DEFAULT_AB_SUBDEVICE_NAME,
            controller_kind: ControllerKind::HighSpeed,
        }
    }
}

impl BootConfig {
    /// A/B is configured once a base device name and distinct slot offsets
    /// have been supplied.
    pub fn is_ab_configured(&self) -> bool {
        self.base_device.is_some() && self.slot_a_offset != self.slot_b_offset
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn defaults_are_not_ab_configured() {
        let cfg = BootConfig::default();
        assert!(!cfg.is_ab_configured());
    }

    #[test]
    fn configured_once_base_and_offsets_set() {
        let cfg = BootConfig {
            base_device: Some("mmcblk0".into()),
            slot_a_offset: 0x0010_0000,
            slot_b_offset: 0x0410_0000,
            ..BootConfig::default()
        };
        assert!(cfg.is_ab_configured());
    }
}
