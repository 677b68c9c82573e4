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

//! Parser for `/extlinux/extlinux.conf`, the boot descriptor consulted by
//! the Boot Dispatcher after mounting a slot. Line-based and whitespace
//! tokenized, with unknown directives ignored.

use log::trace;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ExtlinuxError {
    #[error("no label selected for slot '{0}'")]
    NoMatchingLabel(char),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BootEntry {
    pub label: String,
    pub kernel: String,
    pub initrd: Option<String>,
    pub fdt: Option<String>,
    pub fdtdir: Option<String>,
    pub fdt_overlays: Vec<String>,
    pub append: String,
}

#[derive(Debug, Clone, Default)]
pub struct ExtlinuxConfig {
    pub default: Option<String>,
    pub entries: Vec<BootEntry>,
}

impl ExtlinuxConfig {
    pub fn parse(contents: &str) -> ExtlinuxConfig {
        let mut config = ExtlinuxConfig::default();
        let mut current: Option<BootEntry> = None;

        for line in contents.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                trace!("extlinux: skipping line: {}", line);
                continue;
            }

            let mut parts = line.split_whitespace();
            let directive = match parts.next() {
                Some(d) => d.to_ascii_lowercase(),
                None => continue,
            };
            let rest: Vec<&str> = parts.collect();

            match directive.as_str() {
                "default" => {
                    config.default = rest.first().map(|s| s.to_string());
                }
                "label" => {
                    if let Some(entry) = current.take() {
                        config.entries.push(entry);
                    }
                    current = Some(BootEntry {
                        label: rest.first().unwrap_or(&"").to_string(),
                        ..BootEntry::default()
                    });
                }
                "linux" | "kernel" => {
                    if let Some(entry) = current.as_mut() {
                        entry.kernel = rest.first().unwrap_or(&"").to_string();
                    }
                }
                "initrd" => {
                    if let Some(entry) = current.as_mut() {
                        entry.initrd = rest.first().map(|s| s.to_string());
                    }
                }
                "fdt" | "devicetree" => {
                    if let Some(entry) = current.as_mut() {
                        entry.fdt = rest.first().map(|s| s.to_string());
                    }
                }
                "fdtdir" | "devicetreedir" => {
                    if let Some(entry) = current.as_mut() {
                        entry.fdtdir = rest.first().map(|s| s.to_string());
                    }
                }
                "fdtoverlays" | "devicetree-overlay" => {
                    if let Some(entry) = current.as_mut() {
                        entry.fdt_overlays = rest.iter().map(|s| s.to_string()).collect();
                    }
                }
                "append" => {
                    if let Some(entry) = current.as_mut() {
                        entry.append = rest.join(" ");
                    }
                }
                other => {
                    trace!("extlinux: ignoring unknown directive '{}'", other);
                }
            }
        }

        if let Some(entry) = current.take() {
            config.entries.push(entry);
        }

        config
    }

    /// Select the entry for `slot`, per this crate's label rule: if
    /// `default <base>` is present, the selected label is `<base>_<slot>`;
    /// otherwise the first label ending with `_<slot>` wins. Returns an
    /// error rather than silently falling back, to never boot the wrong
    /// slot.
    pub fn select_entry(&self, slot: char) -> Result<&BootEntry, ExtlinuxError> {
        if let Some(base) = &self.default {
            let wanted = format!("{}_{}", base, slot);
            if let Some(entry) = self.entries.iter().find(|e| e.label == wanted) {
                return Ok(entry);
            }
            return Err(ExtlinuxError::NoMatchingLabel(slot));
        }

        let suffix = format!("_{}", slot);
        self.entries
            .iter()
            .find(|e| e.label.ends_with(&suffix))
            .ok_or(ExtlinuxError::NoMatchingLabel(slot))
    }

    /// Select the plain `default <label>` entry, with no slot suffixing.
    /// Used by the non-A/B fallback scan, where there is only one slot.
    pub fn select_default(&self) -> Option<&BootEntry> {
        match &self.default {
            Some(label) => self.entries.iter().find(|e| &e.label == label),
            None => self.entries.first(),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const SAMPLE: &str = r###"
# extlinux.conf
default linux

label linux_A
    linux /boot/Image_A
    initrd /boot/initrd_A.img
    fdt /boot/dtb_A
    fdtoverlays /boot/overlay1.dtbo /boot/overlay2.dtbo
    append root=/dev/sda1 rw console=ttyMSM0

label linux_B
    linux /boot/Image_B
    append root=/dev/sda2 rw
"###;

    #[test]
    fn parses_default_and_labeled_entries() {
        let config = ExtlinuxConfig::parse(SAMPLE);
        assert_eq!(config.default.as_deref(), Some("linux"));
        assert_eq!(config.entries.len(), 2);
        assert_eq!(config.entries[0].label, "linux_A");
        assert_eq!(config.entries[0].kernel, "/boot/Image_A");
        assert_eq!(config.entries[0].initrd.as_deref(), Some("/boot/initrd_A.img"));
        assert_eq!(
            config.entries[0].fdt_overlays,
            vec!["/boot/overlay1.dtbo".to_string(), "/boot/overlay2.dtbo".to_string()]
        );
        assert_eq!(config.entries[0].append, "root=/dev/sda1 rw console=ttyMSM0");
    }

    #[test]
    fn selects_label_matching_default_and_slot() {
        let config = ExtlinuxConfig::parse(SAMPLE);
        let entry = config.select_entry('B').unwrap();
        assert_eq!(entry.label, "linux_B");
    }

    #[test]
    fn missing_label_for_slot_is_an_error() {
        let config = ExtlinuxConfig::parse("default linux\nlabel linux_A\n  linux /boot/Image_A\n");
        assert!(config.select_entry('B').is_err());
    }

    #[test]
    fn falls_back_to_suffix_match_without_default() {
        let contents = "label recovery_A\n  linux /boot/recovery\n";
        let config = ExtlinuxConfig::parse(contents);
        assert_eq!(config.select_entry('A').unwrap().label, "recovery_A");
    }

    #[test]
    fn unknown_directives_are_ignored() {
        let contents = "label linux_A\n  linux /boot/Image_A\n  bogus-directive foo\n";
        let config = ExtlinuxConfig::parse(contents);
        assert_eq!(config.entries[0].kernel, "/boot/Image_A");
    }

    #[test]
    fn select_default_picks_matching_label() {
        let contents = "default recovery\nlabel recovery\n  linux /boot/recovery\nlabel linux\n  linux /boot/Image\n";
        let config = ExtlinuxConfig::parse(contents);
        assert_eq!(config.select_default().unwrap().label, "recovery");
    }

    #[test]
    fn select_default_falls_back_to_first_entry_without_a_default() {
        let contents = "label only\n  linux /boot/Image\n";
        let config = ExtlinuxConfig::parse(contents);
        assert_eq!(config.select_default().unwrap().label, "only");
    }
}
