//! The UMS target's DMA-visible transfer buffer. Host/test builds back it
//! with a plain `Vec<u8>` and [`abcore_pal::cache::NoopCache`]; a real
//! target backs it with a scratch memory region and platform
//! cache-maintenance intrinsics behind the same [`CacheOps`] trait.

use abcore_pal::cache::CacheOps;

/// Largest single transfer buffer this target will ever allocate,
/// regardless of how much scratch memory is available.
const MAX_BUFFER_BYTES: usize = 1024 * 1024;

pub struct DmaBuffer {
    data: Vec<u8>,
}

impl DmaBuffer {
    /// Size the buffer to `min(1 MiB, scratch_bytes / 2)`, aligned down to
    /// `block_size`, but never below one block.
    pub fn new(scratch_bytes: usize, block_size: u32) -> DmaBuffer {
        let block_size = block_size.max(1) as usize;
        let wanted = MAX_BUFFER_BYTES.min(scratch_bytes / 2);
        let aligned = (wanted / block_size) * block_size;
        let size = aligned.max(block_size);
        DmaBuffer { data: vec![0u8; size] }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Number of whole blocks this buffer can hold at once.
    pub fn block_capacity(&self, block_size: u32) -> u32 {
        (self.data.len() / block_size.max(1) as usize) as u32
    }

    pub fn clean_invalidate(&mut self, cache: &dyn CacheOps) {
        cache.clean_invalidate(&mut self.data);
    }

    pub fn invalidate(&mut self, cache: &dyn CacheOps) {
        cache.invalidate(&mut self.data);
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use abcore_pal::cache::NoopCache;

    #[test]
    fn caps_at_one_mebibyte_and_aligns_to_block_size() {
        let buf = DmaBuffer::new(8 * 1024 * 1024, 512);
        assert_eq!(buf.len(), 1024 * 1024);
        assert_eq!(buf.len() % 512, 0);
    }

    #[test]
    fn shrinks_to_half_of_small_scratch_regions() {
        let buf = DmaBuffer::new(4096, 512);
        assert_eq!(buf.len(), 2048);
    }

    #[test]
    fn never_goes_below_one_block() {
        let buf = DmaBuffer::new(100, 512);
        assert_eq!(buf.len(), 512);
    }

    #[test]
    fn block_capacity_matches_buffer_size_over_block_size() {
        let buf = DmaBuffer::new(8 * 1024 * 1024, 512);
        assert_eq!(buf.block_capacity(512), 2048);
    }

    #[test]
    fn cache_ops_are_forwarded() {
        let mut buf = DmaBuffer::new(4096, 512);
        buf.clean_invalidate(&NoopCache);
        buf.invalidate(&NoopCache);
    }
}
