use std::io;

/// Loads and hands off to a kernel image. Never returns on success.
pub trait KernelLoader {
    /// `fdt_overlays` and `append` are passed through verbatim; this trait
    /// does not interpret the command line itself (see the dispatcher's own
    /// `lk2nd.*` directive parsing, which happens before this call).
    fn boot(
        &mut self,
        kernel_path: &str,
        initrd_path: Option<&str>,
        fdt_path: Option<&str>,
        fdt_overlays: &[String],
        append: &str,
    ) -> io::Result<()>;
}
