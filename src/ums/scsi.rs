//! SCSI command parsing and dispatch for the single-LUN subset this target
//! supports, using safe big-endian CDB field extraction. This dispatcher
//! doesn't drive a USB transport directly: it classifies a command block
//! into an [`Outcome`] that [`super::UmsTarget`]'s main loop then executes
//! against the injected block device and controller, since those are the
//! transport-shaped parts of the response (chunked reads/writes).

const TEST_UNIT_READY: u8 = 0x00;
const REQUEST_SENSE: u8 = 0x03;
const INQUIRY: u8 = 0x12;
const MODE_SENSE_6: u8 = 0x1A;
const START_STOP: u8 = 0x1B;
const PREVENT_ALLOW: u8 = 0x1E;
const READ_FORMAT_CAPACITIES: u8 = 0x23;
const READ_CAPACITY_10: u8 = 0x25;
const READ_10: u8 = 0x28;
const WRITE_10: u8 = 0x2A;
const VERIFY_10: u8 = 0x2F;

pub const KEY_NOT_READY: u8 = 0x02;
pub const KEY_MEDIUM_ERROR: u8 = 0x03;
pub const KEY_ILLEGAL_REQUEST: u8 = 0x05;

pub const ASC_INVALID_FIELD_IN_CDB: u8 = 0x24;
pub const ASC_WRITE_PROTECTED: u8 = 0x27;
pub const ASC_INVALID_COMMAND: u8 = 0x20;
pub const ASC_MEDIUM_NOT_PRESENT: u8 = 0x3A;

/// The current SCSI sense triplet, cleared to `NO_SENSE` by a successful
/// REQUEST SENSE.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sense {
    pub key: u8,
    pub asc: u8,
    pub ascq: u8,
}

impl Sense {
    pub const NO_SENSE: Sense = Sense { key: 0, asc: 0, ascq: 0 };
}

impl Default for Sense {
    fn default() -> Self {
        Sense::NO_SENSE
    }
}

/// What the main loop should do to service a parsed command.
pub enum Outcome {
    /// Send `bytes` (already truncated to the host's requested allocation
    /// length) and report CSW status good with residue 0.
    DataIn(Vec<u8>),
    /// No data phase; CSW status good.
    StatusOnly,
    /// Read `block_count` blocks starting at `lba` and stream them to the
    /// host.
    Read { lba: u64, block_count: u32 },
    /// Receive `block_count` blocks worth of data from the host and write
    /// them starting at `lba`.
    Write { lba: u64, block_count: u32 },
    /// The command failed; `sense` has already been recorded on the
    /// device's context. CSW status failed, residue = requested length.
    Fail,
}

fn byte(cb: &[u8], i: usize) -> u8 {
    cb.get(i).copied().unwrap_or(0)
}

fn be16(cb: &[u8], i: usize) -> u16 {
    u16::from_be_bytes([byte(cb, i), byte(cb, i + 1)])
}

fn be32(cb: &[u8], i: usize) -> u32 {
    u32::from_be_bytes([byte(cb, i), byte(cb, i + 1), byte(cb, i + 2), byte(cb, i + 3)])
}

/// Whatever the dispatcher needs to know about target state to answer a
/// command; owned by [`super::UmsTarget`].
pub struct Context {
    pub mounted: bool,
    pub read_only: bool,
    pub block_count: u64,
    pub block_size: u32,
}

fn inquiry_response() -> Vec<u8> {
    let mut buf = vec![0u8; 36];
    buf[0] = 0x00; // direct-access block device
    buf[1] = 0x80; // removable
    buf[2] = 0x04; // SPC-2
    buf[3] = 0x02; // response data format
    buf[4] = 31; // additional length
    buf[8..16].copy_from_slice(b"ABCOREBL");
    buf[16..32].copy_from_slice(b"AB Boot UMS     ");
    buf[32..36].copy_from_slice(b"1.0 ");
    buf
}

/// Parse and classify a command block (`cb[0]` is the opcode). `sense` is
/// written on failure; REQUEST SENSE also clears it on success.
pub fn dispatch(cb: &[u8], ctx: &Context, sense: &mut Sense) -> Outcome {
    match byte(cb, 0) {
        TEST_UNIT_READY => {
            if ctx.mounted {
                Outcome::StatusOnly
            } else {
                *sense = Sense {
                    key: KEY_NOT_READY,
                    asc: ASC_MEDIUM_NOT_PRESENT,
                    ascq: 0,
                };
                Outcome::Fail
            }
        }
        REQUEST_SENSE => {
            let alloc_len = byte(cb, 4) as usize;
            let mut buf = vec![0u8; 18];
            buf[0] = 0x70; // fixed format, current errors
            buf[2] = sense.key;
            buf[7] = 10; // additional sense length
            buf[12] = sense.asc;
            buf[13] = sense.ascq;
            *sense = Sense::NO_SENSE;
            buf.truncate(alloc_len.min(buf.len()));
            Outcome::DataIn(buf)
        }
        INQUIRY => {
            let alloc_len = be16(cb, 3) as usize;
            let mut buf = inquiry_response();
            buf.truncate(alloc_len.min(buf.len()));
            Outcome::DataIn(buf)
        }
        MODE_SENSE_6 => {
            let alloc_len = byte(cb, 4) as usize;
            let mut buf = vec![0u8; 4];
            buf[0] = 3; // mode data length (excludes this byte)
            buf[1] = 0; // medium type
            buf[2] = if ctx.read_only { 0x80 } else { 0x00 };
            buf[3] = 0; // block descriptor length
            buf.truncate(alloc_len.min(buf.len()));
            Outcome::DataIn(buf)
        }
        START_STOP | PREVENT_ALLOW | VERIFY_10 => Outcome::StatusOnly,
        READ_FORMAT_CAPACITIES => {
            *sense = Sense {
                key: KEY_ILLEGAL_REQUEST,
                asc: ASC_INVALID_COMMAND,
                ascq: 0,
            };
            Outcome::Fail
        }
        READ_CAPACITY_10 => {
            if !ctx.mounted {
                *sense = Sense {
                    key: KEY_NOT_READY,
                    asc: ASC_MEDIUM_NOT_PRESENT,
                    ascq: 0,
                };
                return Outcome::Fail;
            }
            let last_lba = ctx.block_count.saturating_sub(1) as u32;
            let mut buf = vec![0u8; 8];
            buf[0..4].copy_from_slice(&last_lba.to_be_bytes());
            buf[4..8].copy_from_slice(&ctx.block_size.to_be_bytes());
            Outcome::DataIn(buf)
        }
        READ_10 => {
            let lba = be32(cb, 2) as u64;
            let count = be16(cb, 7) as u32;
            if lba + count as u64 > ctx.block_count {
                *sense = Sense {
                    key: KEY_ILLEGAL_REQUEST,
                    asc: ASC_INVALID_FIELD_IN_CDB,
                    ascq: 0,
                };
                return Outcome::Fail;
            }
            Outcome::Read { lba, block_count: count }
        }
        WRITE_10 => {
            if ctx.read_only {
                *sense = Sense {
                    key: KEY_ILLEGAL_REQUEST,
                    asc: ASC_WRITE_PROTECTED,
                    ascq: 0,
                };
                return Outcome::Fail;
            }
            let lba = be32(cb, 2) as u64;
            let count = be16(cb, 7) as u32;
            if lba + count as u64 > ctx.block_count {
                *sense = Sense {
                    key: KEY_ILLEGAL_REQUEST,
                    asc: ASC_INVALID_FIELD_IN_CDB,
                    ascq: 0,
                };
                return Outcome::Fail;
            }
            Outcome::Write { lba, block_count: count }
        }
        _ => {
            *sense = Sense {
                key: KEY_ILLEGAL_REQUEST,
                asc: ASC_INVALID_COMMAND,
                ascq: 0,
            };
            Outcome::Fail
        }
    }
}
