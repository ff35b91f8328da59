//! wgpu upload backend for decoded grid payloads
//!
//! Turns the opaque grid bytes of a `Ready` frame into a storage buffer
//! the volume raymarch shaders can bind. The pool drives this through the
//! [`GpuUploader`] trait so its logic (and tests) never need a device.

use std::sync::Arc;

use crate::core::error::Error;
use crate::core::Result;
use crate::streaming::buffer::{GpuResource, GpuUploader};

/// A grid payload resident in GPU memory
pub struct GpuGridBuffer {
    buffer: wgpu::Buffer,
    size: usize,
}

impl GpuGridBuffer {
    /// The underlying storage buffer, for bind group construction
    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

impl GpuResource for GpuGridBuffer {
    fn byte_size(&self) -> usize {
        self.size
    }
}

/// Uploads grid payloads into storage buffers on a wgpu queue
pub struct WgpuUploader {
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl WgpuUploader {
    pub fn new(device: Arc<wgpu::Device>, queue: Arc<wgpu::Queue>) -> Self {
        Self { device, queue }
    }
}

impl GpuUploader for WgpuUploader {
    fn upload(&self, label: &str, bytes: &[u8]) -> Result<Arc<dyn GpuResource>> {
        // wgpu requires copy sizes in COPY_BUFFER_ALIGNMENT multiples
        let padded = bytes
            .len()
            .next_multiple_of(wgpu::COPY_BUFFER_ALIGNMENT as usize);

        let max_buffer_size = self.device.limits().max_buffer_size;
        if padded as u64 > max_buffer_size {
            return Err(Error::Gpu(format!(
                "grid payload of {} bytes exceeds device buffer limit {}",
                padded, max_buffer_size
            )));
        }

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: padded as u64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        if bytes.len() == padded {
            self.queue.write_buffer(&buffer, 0, bytes);
        } else {
            let mut data = bytes.to_vec();
            data.resize(padded, 0);
            self.queue.write_buffer(&buffer, 0, &data);
        }

        log::trace!("uploaded {} ({} bytes)", label, padded);

        Ok(Arc::new(GpuGridBuffer {
            buffer,
            size: padded,
        }))
    }
}
