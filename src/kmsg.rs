use std::io::Read;

// The serial console read loop the boot menu and UMS target's "press 'q'
// to quit" step reuse.

/// Block until a byte matching `stop` (case-insensitively, for letters)
/// arrives on `console`. Used by the UMS target's `enter_mode` to wait for
/// 'q'/'Q' and by the boot countdown to detect "any key".
pub fn wait_for_keypress(console: &mut dyn Read, stop: Option<u8>) -> std::io::Result<u8> {
    let mut byte = [0u8; 1];
    loop {
        let n = console.read(&mut byte)?;
        if n == 0 {
            continue;
        }
        match stop {
            Some(want) if byte[0].to_ascii_lowercase() != want.to_ascii_lowercase() => continue,
            _ => return Ok(byte[0]),
        }
    }
}
