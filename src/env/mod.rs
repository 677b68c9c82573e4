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

//! The persistent boot-counting environment.
//!
//! Layout on the base device, at `(offset, offset + size)`:
//!
//!   4 bytes   CRC32 (zlib/ISO-HDLC, little endian) of the payload
//!   1 byte    flags, always 0x01 ("active") when written by us
//!   size-5    payload: NUL-terminated "KEY=VALUE" records, ended by an
//!             empty record (two consecutive NUL bytes)
//!
//! This mirrors U-Boot's environment image format: a CRC-guarded header
//! followed by raw byte-offset reads and writes against the base device,
//! with the payload itself a plain key/value store rather than a packed
//! bitfield struct.

pub mod error;

use crc::{Crc, CRC_32_ISO_HDLC};

use abcore_pal::block::BlockDevice;

pub use error::EnvError;

const HEADER_LEN: usize = 5;

const DEFAULTS: &[(&str, &str)] = &[
    ("BOOT_ORDER", "A B"),
    ("BOOT_A_LEFT", "3"),
    ("BOOT_B_LEFT", "3"),
];

/// A parsed, in-memory view of the env image. Holds a `dirty` flag so that
/// [`EnvStore::save`] is a no-op when nothing has changed.
pub struct EnvStore {
    entries: Vec<(String, String)>,
    capacity: usize,
    dirty: bool,
}

impl EnvStore {
    /// Read and parse the env image from `device` at `[offset, offset+size)`.
    /// A CRC mismatch is not fatal: the store is reset to an empty payload
    /// and marked dirty, matching the self-healing behavior of a freshly
    /// wiped env region.
    pub fn init(
        device: &mut dyn BlockDevice,
        offset: u64,
        size: usize,
    ) -> Result<EnvStore, EnvError> {
        let capacity = size
            .checked_sub(HEADER_LEN)
            .ok_or(EnvError::InvalidSize)?;

        let mut raw = vec![0u8; size];
        device.read_at(offset, &mut raw)?;

        let header_crc = u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]);
        let payload = &raw[HEADER_LEN..];

        let algo = Crc::<u32>::new(&CRC_32_ISO_HDLC);
        let computed_crc = algo.checksum(payload);

        let (entries, mut dirty) = if computed_crc == header_crc {
            (parse_payload(payload), false)
        } else {
            log::warn!("env: CRC mismatch at offset {}, resetting to empty", offset);
            (Vec::new(), true)
        };

        let mut store = EnvStore {
            entries,
            capacity,
            dirty,
        };

        for (key, default) in DEFAULTS {
            if store.get(key).is_none() {
                store.set(key, default)?;
                dirty = true;
            }
        }
        store.dirty = dirty;

        Ok(store)
    }

    /// Look up `key`. Linear scan, matching the small-table expectations of
    /// this format.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// Set `key` to `value`, overwriting it if present. Fails without
    /// mutating the store if the new payload would not fit.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), EnvError> {
        let mut candidate = self.entries.clone();
        if let Some(entry) = candidate.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value.to_string();
        } else {
            candidate.push((key.to_string(), value.to_string()));
        }
        // validate before committing: a too-large payload must leave the
        // store untouched.
        serialize(&candidate, self.capacity)?;
        self.entries = candidate;
        self.dirty = true;
        Ok(())
    }

    /// Write the image back if (and only if) it is dirty.
    pub fn save(&mut self, device: &mut dyn BlockDevice, offset: u64) -> Result<(), EnvError> {
        if !self.dirty {
            return Ok(());
        }

        let payload = serialize(&self.entries, self.capacity)?;
        let algo = Crc::<u32>::new(&CRC_32_ISO_HDLC);
        let crc = algo.checksum(&payload);

        let mut buf = Vec::with_capacity(HEADER_LEN + self.capacity);
        buf.extend_from_slice(&crc.to_le_bytes());
        buf.push(0x01); // flags: active
        buf.extend_from_slice(&payload);

        device.write_at(offset, &buf)?;
        self.dirty = false;
        Ok(())
    }

    /// Release the cached payload. A later call must go through `init`
    /// again.
    pub fn free(&mut self) {
        self.entries.clear();
        self.dirty = false;
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }
}

fn parse_payload(buf: &[u8]) -> Vec<(String, String)> {
    let mut entries = Vec::new();
    let mut start = 0;
    for (i, &b) in buf.iter().enumerate() {
        if b != 0 {
            continue;
        }
        let record = &buf[start..i];
        start = i + 1;
        if record.is_empty() {
            break; // terminating empty record
        }
        if let Some(eq) = record.iter().position(|&b| b == b'=') {
            let key = String::from_utf8_lossy(&record[..eq]).into_owned();
            let value = String::from_utf8_lossy(&record[eq + 1..]).into_owned();
            entries.push((key, value));
        }
    }
    entries
}

fn serialize(entries: &[(String, String)], capacity: usize) -> Result<Vec<u8>, EnvError> {
    let mut buf = Vec::new();
    for (key, value) in entries {
        buf.extend_from_slice(key.as_bytes());
        buf.push(b'=');
        buf.extend_from_slice(value.as_bytes());
        buf.push(0);
    }
    buf.push(0); // terminating empty record
    if buf.len() > capacity {
        return Err(EnvError::OutOfSpace);
    }
    buf.resize(capacity, 0);
    Ok(buf)
}
