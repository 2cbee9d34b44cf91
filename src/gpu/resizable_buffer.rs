//! GPU buffers that grow to fit their CPU-side record arrays.
//!
//! The buffer never shrinks. When a write would overflow it, the old
//! allocation is released and a larger one created; the contents are *not*
//! carried over, so the caller re-uploads every element after a `true`
//! return from [`ResizableGpuBuffer::resize`].

use crate::gpu::backend::{BufferDesc, BufferId, BufferUsage, RenderBackend};

/// Smallest allocation ever created.
pub const MIN_CAPACITY: u64 = 64;

/// Round `size` up to the next multiple of `alignment` (a power of two or
/// any non-zero value; zero means unaligned).
#[must_use]
pub const fn aligned_stride(size: u64, alignment: u64) -> u64 {
    if alignment == 0 {
        return size;
    }
    size.div_ceil(alignment) * alignment
}

/// A growable GPU allocation owned by the registry.
#[derive(Debug)]
pub struct ResizableGpuBuffer {
    buffer: BufferId,
    capacity: u64,
    usage: BufferUsage,
    label: String,
}

impl ResizableGpuBuffer {
    /// Buffer with at least `initial_capacity` bytes.
    pub fn new<B: RenderBackend + ?Sized>(
        backend: &mut B,
        label: &str,
        initial_capacity: u64,
        usage: BufferUsage,
    ) -> Self {
        let capacity = initial_capacity.max(MIN_CAPACITY);
        let buffer = backend.create_buffer(&BufferDesc {
            label: label.to_owned(),
            size: capacity,
            usage,
        });
        Self {
            buffer,
            capacity,
            usage,
            label: label.to_owned(),
        }
    }

    /// Grow to hold `required` bytes.
    ///
    /// Returns `false` and leaves the buffer untouched when it already fits.
    /// Otherwise the capacity becomes `max(required * 2, capacity + 1024)`
    /// and `true` is returned: the previous contents are gone.
    pub fn resize<B: RenderBackend + ?Sized>(&mut self, backend: &mut B, required: u64) -> bool {
        if required <= self.capacity {
            return false;
        }
        let new_capacity = (required * 2).max(self.capacity + 1024);
        backend.destroy_buffer(self.buffer);
        self.buffer = backend.create_buffer(&BufferDesc {
            label: self.label.clone(),
            size: new_capacity,
            usage: self.usage,
        });
        log::debug!(
            "{}: grew {} -> {} bytes",
            self.label,
            self.capacity,
            new_capacity
        );
        self.capacity = new_capacity;
        true
    }

    /// Write `data` at `offset`. The range must already fit.
    pub fn write<B: RenderBackend + ?Sized>(&self, backend: &mut B, offset: u64, data: &[u8]) {
        debug_assert!(
            offset + data.len() as u64 <= self.capacity,
            "{} write past capacity",
            self.label
        );
        if !data.is_empty() {
            backend.write_buffer(self.buffer, offset, data);
        }
    }

    /// Current backend buffer. Changes after a growing `resize`.
    #[must_use]
    pub const fn id(&self) -> BufferId {
        self.buffer
    }

    /// Allocated size in bytes.
    #[must_use]
    pub const fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Debug label.
    #[must_use]
    pub fn label(&self) -> &str {
        &self.label
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gpu::headless::HeadlessBackend;

    #[test]
    fn stride_rounds_up_to_alignment() {
        assert_eq!(aligned_stride(128, 256), 256);
        assert_eq!(aligned_stride(256, 256), 256);
        assert_eq!(aligned_stride(257, 256), 512);
        assert_eq!(aligned_stride(64, 0), 64);
    }

    #[test]
    fn resize_within_capacity_is_noop() {
        let mut backend = HeadlessBackend::new();
        let mut buf = ResizableGpuBuffer::new(&mut backend, "t", 100, BufferUsage::Storage);
        let id = buf.id();
        for n in [0, 1, 64, 100] {
            assert!(!buf.resize(&mut backend, n));
            assert_eq!(buf.id(), id);
            assert_eq!(buf.capacity(), 100);
        }
    }

    #[test]
    fn resize_grows_by_rule() {
        let mut backend = HeadlessBackend::new();
        let mut buf = ResizableGpuBuffer::new(&mut backend, "t", 0, BufferUsage::Uniform);
        assert_eq!(buf.capacity(), MIN_CAPACITY);

        // capacity + 1024 wins for small overflows
        assert!(buf.resize(&mut backend, 65));
        assert_eq!(buf.capacity(), 64 + 1024);

        // doubling wins for large ones
        assert!(buf.resize(&mut backend, 10_000));
        assert_eq!(buf.capacity(), 20_000);
        assert!(backend.buffer_contents(buf.id()).is_some());
    }

    #[test]
    fn grown_buffer_replaces_old_allocation() {
        let mut backend = HeadlessBackend::new();
        let mut buf = ResizableGpuBuffer::new(&mut backend, "t", 64, BufferUsage::Storage);
        let old = buf.id();
        assert!(buf.resize(&mut backend, 4096));
        assert_ne!(buf.id(), old);
        assert!(backend.buffer_contents(old).is_none());
    }
}
