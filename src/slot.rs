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

//! Pure slot-selection logic over an [`EnvStore`]. No I/O happens here; the
//! caller persists any mutation with `EnvStore::save`.

use thiserror::Error;

use crate::env::EnvStore;

#[derive(Error, Debug)]
pub enum SlotError {
    #[error("no slot letter found in BOOT_ORDER")]
    NoSlotConfigured,
}

fn boot_order(env: &EnvStore) -> Vec<char> {
    env.get("BOOT_ORDER")
        .unwrap_or("A B")
        .split_whitespace()
        .filter_map(|tok| {
            let c = tok.chars().next()?;
            if tok.len() == 1 && (c == 'A' || c == 'B') {
                Some(c)
            } else {
                log::debug!("slot: ignoring unrecognized BOOT_ORDER token '{}'", tok);
                None
            }
        })
        .collect()
}

fn attempts_left(env: &EnvStore, slot: char) -> u32 {
    let key = match slot {
        'A' => "BOOT_A_LEFT",
        'B' => "BOOT_B_LEFT",
        _ => return 0,
    };
    env.get(key).and_then(|v| v.parse().ok()).unwrap_or(0)
}

fn attempts_key(slot: char) -> Result<&'static str, SlotError> {
    match slot {
        'A' => Ok("BOOT_A_LEFT"),
        'B' => Ok("BOOT_B_LEFT"),
        _ => Err(SlotError::NoSlotConfigured),
    }
}

/// The slot to try next: the first slot in `BOOT_ORDER` with attempts
/// remaining, or, if every configured slot is exhausted, the first slot in
/// `BOOT_ORDER` as a last resort.
pub fn current_slot(env: &EnvStore) -> Result<char, SlotError> {
    let order = boot_order(env);
    let first = *order.first().ok_or(SlotError::NoSlotConfigured)?;

    for &slot in &order {
        if attempts_left(env, slot) > 0 {
            return Ok(slot);
        }
    }
    log::warn!("slot: all slots exhausted, retrying '{}' as last resort", first);
    Ok(first)
}

/// The slot after `current` in `BOOT_ORDER` with attempts remaining, if
/// any.
pub fn next_slot(env: &EnvStore, current: char) -> Option<char> {
    let order = boot_order(env);
    let pos = order.iter().position(|&s| s == current)?;
    order[pos + 1..].iter().copied().find(|&s| attempts_left(env, s) > 0)
}

/// Outcome of [`decrement`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DecrementOutcome {
    Ok,
    Exhausted,
}

/// Decrement `slot`'s remaining-attempts counter by one and stage the
/// mutation into `env` (the caller still has to call `EnvStore::save`).
/// Returns `Exhausted` without mutating anything if the counter was
/// already zero.
pub fn decrement(env: &mut EnvStore, slot: char) -> Result<DecrementOutcome, SlotError> {
    let key = attempts_key(slot)?;
    let remaining = attempts_left(env, slot);
    if remaining == 0 {
        return Ok(DecrementOutcome::Exhausted);
    }
    env.set(key, &(remaining - 1).to_string())
        .map_err(|_| SlotError::NoSlotConfigured)?;
    Ok(DecrementOutcome::Ok)
}

#[cfg(test)]
mod test {
    use super::*;
    use abcore_pal::block::BlockDevice;

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
        fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> std::io::Result<()> {
            let offset = offset as usize;
            buf.copy_from_slice(&self.bytes[offset..offset + buf.len()]);
            Ok(())
        }
        fn write_at(&mut self, offset: u64, buf: &[u8]) -> std::io::Result<()> {
            let offset = offset as usize;
            self.bytes[offset..offset + buf.len()].copy_from_slice(buf);
            Ok(())
        }
    }

    fn fresh_env() -> EnvStore {
        let mut device = FakeDevice {
            bytes: vec![0xFFu8; 0x2_0000],
        };
        EnvStore::init(&mut device, 0, 0x2_0000).unwrap()
    }

    #[test]
    fn normal_alternation_across_three_attempts_then_fallover() {
        let mut env = fresh_env();
        assert_eq!(current_slot(&env).unwrap(), 'A');

        for expected_left in [2, 1, 0] {
            assert_eq!(decrement(&mut env, 'A').unwrap(), DecrementOutcome::Ok);
            assert_eq!(env.get("BOOT_A_LEFT"), Some(expected_left.to_string().as_str()));
        }

        // A is now exhausted.
        assert_eq!(current_slot(&env).unwrap(), 'A');
        assert_eq!(decrement(&mut env, 'A').unwrap(), DecrementOutcome::Exhausted);
        assert_eq!(next_slot(&env, 'A'), Some('B'));
        assert_eq!(decrement(&mut env, 'B').unwrap(), DecrementOutcome::Ok);
        assert_eq!(env.get("BOOT_B_LEFT"), Some("2"));
    }

    #[test]
    fn all_exhausted_returns_first_order_slot_as_last_resort() {
        let mut env = fresh_env();
        for slot in ['A', 'B'] {
            for _ in 0..3 {
                decrement(&mut env, slot).unwrap();
            }
        }
        assert_eq!(current_slot(&env).unwrap(), 'A');
        assert_eq!(next_slot(&env, 'A'), None);
    }

    #[test]
    fn unknown_letters_in_boot_order_are_skipped() {
        let mut env = fresh_env();
        env.set("BOOT_ORDER", "Z A B").unwrap();
        assert_eq!(current_slot(&env).unwrap(), 'A');
    }
}
