/*
    Licensed under the Apache License, Version 2.0 (the "License");
    you may not use this file except in compliance with the License.
    You may obtain a copy of the License at

       http://www.apache.org/licenses/LICENSE-2.0

    Unless required by applicable law or agreed to in writing, software
    distributed under the License is distributed on an "AS IS" BASIS,
    WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
    See the License for the specific language governing permissions and
    limitations under the License.
 */

//! Base-device name resolution.
//!
//! Distinguishes between an exact `/dev/block/<name>` device and a
//! `/dev/block/by-name/<partition-name>` GPT-label lookup, tried in order
//! as three policies behind a [`DeviceEnumerator`] collaborator.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MountError {
    #[error("no device found for '{0}'")]
    DeviceNotFound(String),
}

/// Enumerates currently-visible block devices. A real implementation walks
/// `/sys/class/block` (regenerating uevents as needed) and reads GPT
/// labels; tests use an in-memory fake.
pub trait DeviceEnumerator {
    fn exists(&self, device: &str) -> bool;
    fn list_devices(&self) -> Vec<String>;
    fn gpt_label(&self, device: &str) -> Option<String>;
    fn size_bytes(&self, device: &str) -> u64;
}

/// Translate a Linux `mmcblk<X>p<N>` partition name into this bootloader's
/// internal `wrp0p(N-1)` wrapper naming. Returns `None` for names that
/// don't match the expected shape.
pub fn translate_mmcblk_to_wrp(name: &str) -> Option<String> {
    let rest = name.strip_prefix("mmcblk")?;
    let p_pos = rest.find('p')?;
    let (_controller, partition) = rest.split_at(p_pos);
    let partition_num: u32 = partition[1..].parse().ok()?;
    let zero_based = partition_num.checked_sub(1)?;
    Some(format!("wrp0p{}", zero_based))
}

/// Resolve `wanted` to a concrete device name, trying in order: (a) an
/// exact match, (b) the `mmcblkXpN` -> `wrpNp(N-1)` translation, (c) a GPT
/// label scan.
pub fn resolve_base_device(
    enumerator: &dyn DeviceEnumerator,
    wanted: &str,
) -> Result<String, MountError> {
    if enumerator.exists(wanted) {
        return Ok(wanted.to_string());
    }

    if let Some(translated) = translate_mmcblk_to_wrp(wanted) {
        if enumerator.exists(&translated) {
            return Ok(translated);
        }
    }

    for device in enumerator.list_devices() {
        if enumerator.gpt_label(&device).as_deref() == Some(wanted) {
            return Ok(device);
        }
    }

    Err(MountError::DeviceNotFound(wanted.to_string()))
}

/// Leaf devices eligible for the non-A/B fallback scan: at least
/// `min_size` bytes, unless their GPT label starts with `"boot"`.
pub fn fallback_candidates(enumerator: &dyn DeviceEnumerator, min_size: u64) -> Vec<String> {
    enumerator
        .list_devices()
        .into_iter()
        .filter(|device| {
            let label_is_boot = enumerator
                .gpt_label(device)
                .map(|l| l.starts_with("boot"))
                .unwrap_or(false);
            label_is_boot || enumerator.size_bytes(device) >= min_size
        })
        .collect()
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashMap;

    struct FakeEnumerator {
        existing: Vec<String>,
        labels: HashMap<String, String>,
        sizes: HashMap<String, u64>,
    }

    impl DeviceEnumerator for FakeEnumerator {
        fn exists(&self, device: &str) -> bool {
            self.existing.iter().any(|d| d == device)
        }
        fn list_devices(&self) -> Vec<String> {
            self.existing.clone()
        }
        fn gpt_label(&self, device: &str) -> Option<String> {
            self.labels.get(device).cloned()
        }
        fn size_bytes(&self, device: &str) -> u64 {
            self.sizes.get(device).copied().unwrap_or(0)
        }
    }

    #[test]
    fn translates_mmcblk_partition_names() {
        assert_eq!(translate_mmcblk_to_wrp("mmcblk0p5"), Some("wrp0p4".to_string()));
        assert_eq!(translate_mmcblk_to_wrp("sda1"), None);
    }

    #[test]
    fn resolves_exact_match_first() {
        let enumerator = FakeEnumerator {
            existing: vec!["wrp0p1".into()],
            labels: HashMap::new(),
            sizes: HashMap::new(),
        };
        assert_eq!(resolve_base_device(&enumerator, "wrp0p1").unwrap(), "wrp0p1");
    }

    #[test]
    fn resolves_via_mmcblk_translation() {
        let enumerator = FakeEnumerator {
            existing: vec!["wrp0p4".into()],
            labels: HashMap::new(),
            sizes: HashMap::new(),
        };
        assert_eq!(resolve_base_device(&enumerator, "mmcblk0p5").unwrap(), "wrp0p4");
    }

    #[test]
    fn resolves_via_gpt_label_scan() {
        let mut labels = HashMap::new();
        labels.insert("sda3".to_string(), "userdata".to_string());
        let enumerator = FakeEnumerator {
            existing: vec!["sda1".into(), "sda3".into()],
            labels,
            sizes: HashMap::new(),
        };
        assert_eq!(resolve_base_device(&enumerator, "userdata").unwrap(), "sda3");
    }

    #[test]
    fn unresolvable_name_is_an_error() {
        let enumerator = FakeEnumerator {
            existing: vec![],
            labels: HashMap::new(),
            sizes: HashMap::new(),
        };
        assert!(resolve_base_device(&enumerator, "nope").is_err());
    }

    #[test]
    fn fallback_candidates_keeps_large_or_boot_labeled() {
        let mut labels = HashMap::new();
        labels.insert("sda1".to_string(), "boot_a".to_string());
        let sizes: HashMap<String, u64> = [
            ("sda1".to_string(), 1024u64),
            ("sda2".to_string(), 1024),
            ("sda3".to_string(), 64 * 1024 * 1024),
        ]
        .iter()
        .cloned()
        .collect();
        let enumerator = FakeEnumerator {
            existing: vec!["sda1".into(), "sda2".into(), "sda3".into()],
            labels,
            sizes,
        };
        let candidates = fallback_candidates(&enumerator, 16 * 1024 * 1024);
        assert_eq!(candidates, vec!["sda1".to_string(), "sda3".to_string()]);
    }
}
