use std::io;

/// Mounts block devices and reads files back out of them. This is the
/// collaborator the Boot Dispatcher calls to get at `/extlinux/extlinux.conf`
/// without this crate knowing anything about filesystem formats.
pub trait FilesystemDriver {
    type Mount: Mount;

    /// Mount `device` read-only (or read-write, if `read_only` is false)
    /// and return a handle usable to read files out of it.
    fn mount(&mut self, device: &str, read_only: bool) -> io::Result<Self::Mount>;
}

/// A single mounted filesystem.
pub trait Mount {
    /// Read the full contents of `path`, relative to the mount root.
    fn read_file(&self, path: &str) -> io::Result<Vec<u8>>;

    /// True if `path` exists in this mount.
    fn exists(&self, path: &str) -> bool {
        self.read_file(path).is_ok()
    }

    /// Unmount. Implementations that don't need explicit teardown may no-op.
    fn unmount(self) -> io::Result<()>;
}
