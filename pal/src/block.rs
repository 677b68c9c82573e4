use std::io;

/// A named block device addressable by byte offset.
///
/// Implementations are expected to be thin wrappers over a raw device node;
/// this trait only covers the subset of behavior the env store, slot
/// selector and UMS target need.
pub trait BlockDevice {
    /// Size of one logical block, in bytes. Typically 512.
    fn block_size(&self) -> u32;

    /// Number of logical blocks on the device.
    fn block_count(&self) -> u64;

    /// Total size in bytes. Default derived from block size and count.
    fn byte_len(&self) -> u64 {
        self.block_count() * self.block_size() as u64
    }

    /// Read exactly `buf.len()` bytes starting at byte offset `offset`.
    fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Write exactly `buf` at byte offset `offset`.
    fn write_at(&mut self, offset: u64, buf: &[u8]) -> io::Result<()>;

    /// True if the device must not be written to.
    fn is_read_only(&self) -> bool {
        false
    }
}

/// Publishes a logical sub-device backed by a byte-offset window into a
/// base device. This is the collaborator the Boot Dispatcher calls to
/// expose a slot as a mountable device.
pub trait SubDevicePublisher {
    /// Publish `name` as a device spanning `[offset, end-of-base-device)`
    /// of `base_device`. Returns the device path a filesystem driver can
    /// mount.
    fn publish(&mut self, base_device: &str, offset: u64, name: &str) -> io::Result<String>;
}
