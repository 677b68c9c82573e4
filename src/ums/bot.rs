//! Bulk-Only Transport wire framing: the Command/Status Wrapper pair.
//! Little-endian, fixed-size, no padding.

pub const CBW_SIGNATURE: u32 = 0x4342_5355; // "USBC"
pub const CSW_SIGNATURE: u32 = 0x5342_5355; // "USBS"

pub const CBW_LEN: usize = 31;
pub const CSW_LEN: usize = 13;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CswStatus {
    Good = 0,
    Failed = 1,
    PhaseError = 2,
}

#[derive(Debug, Clone)]
pub struct Cbw {
    pub tag: u32,
    pub data_transfer_length: u32,
    pub direction_in: bool,
    pub lun: u8,
    pub command_block: Vec<u8>,
}

impl Cbw {
    /// Parse a CBW out of exactly [`CBW_LEN`] bytes. Returns `None` on a
    /// signature mismatch or bad command-block length, which the caller
    /// treats as a malformed transfer and drops.
    pub fn parse(buf: &[u8]) -> Option<Cbw> {
        if buf.len() != CBW_LEN {
            return None;
        }
        let signature = u32::from_le_bytes([buf[0], buf[1], buf[2], buf[3]]);
        if signature != CBW_SIGNATURE {
            return None;
        }
        let tag = u32::from_le_bytes([buf[4], buf[5], buf[6], buf[7]]);
        let data_transfer_length = u32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]);
        let flags = buf[12];
        let lun = buf[13];
        let cb_len = buf[14] as usize;
        if cb_len == 0 || cb_len > 16 {
            return None;
        }
        let command_block = buf[15..15 + cb_len].to_vec();
        Some(Cbw {
            tag,
            data_transfer_length,
            direction_in: flags & 0x80 != 0,
            lun,
            command_block,
        })
    }
}

#[derive(Debug, Clone)]
pub struct Csw {
    pub tag: u32,
    pub data_residue: u32,
    pub status: CswStatus,
}

impl Csw {
    pub fn serialize(&self) -> [u8; CSW_LEN] {
        let mut buf = [0u8; CSW_LEN];
        buf[0..4].copy_from_slice(&CSW_SIGNATURE.to_le_bytes());
        buf[4..8].copy_from_slice(&self.tag.to_le_bytes());
        buf[8..12].copy_from_slice(&self.data_residue.to_le_bytes());
        buf[12] = self.status as u8;
        buf
    }
}
