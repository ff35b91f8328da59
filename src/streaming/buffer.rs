//! Grid buffers: decoded frame payloads and their GPU residency
//!
//! A [`GridBuffer`] owns the decoded bytes of one grid role for one frame.
//! Payload bytes are immutable once published; the buffer itself is a cheap
//! handle (reference-counted slices) so render-side snapshots clone it
//! instead of borrowing from the pool.

use std::sync::Arc;

use glam::{IVec3, Mat4};
use serde::{Deserialize, Serialize};

use crate::asset::descriptor::SequenceId;
use crate::asset::source::DecodedGrid;

/// Cache key for one frame of one sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameKey {
    pub sequence: SequenceId,
    pub frame: u32,
}

impl FrameKey {
    pub fn new(sequence: SequenceId, frame: u32) -> Self {
        Self { sequence, frame }
    }
}

/// Parallel data channels of the same animated volume
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum GridRole {
    Density,
    Temperature,
    Velocity,
    Color,
}

impl GridRole {
    pub const ALL: [GridRole; 4] = [
        GridRole::Density,
        GridRole::Temperature,
        GridRole::Velocity,
        GridRole::Color,
    ];

    pub const COUNT: usize = 4;

    pub fn index(self) -> usize {
        match self {
            GridRole::Density => 0,
            GridRole::Temperature => 1,
            GridRole::Velocity => 2,
            GridRole::Color => 3,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            GridRole::Density => "density",
            GridRole::Temperature => "temperature",
            GridRole::Velocity => "velocity",
            GridRole::Color => "color",
        }
    }
}

/// GPU-visible residency of a grid payload
///
/// Implemented by the wgpu upload backend; kept behind a trait so the pool
/// and its tests never need a device.
pub trait GpuResource: Send + Sync {
    /// Size of the GPU allocation in bytes
    fn byte_size(&self) -> usize;
}

/// Turns decoded grid bytes into a GPU-visible resource
///
/// Implemented by the wgpu backend; the pool calls it when promoting
/// `Ready` CPU buffers to GPU residency.
pub trait GpuUploader: Send + Sync {
    fn upload(&self, label: &str, bytes: &[u8]) -> crate::core::Result<Arc<dyn GpuResource>>;
}

/// Decoded payload of one grid role for one frame
///
/// Holds the raw index-space bounds, the index-to-local transform and the
/// decoded grid bytes, plus the GPU handle once the upload backend has
/// promoted it. Clones share the underlying payload.
#[derive(Clone)]
pub struct GridBuffer {
    pub role: GridRole,
    pub index_min: IVec3,
    pub index_size: IVec3,
    pub index_to_local: Mat4,
    cpu: Arc<[u8]>,
    gpu: Option<Arc<dyn GpuResource>>,
}

impl GridBuffer {
    /// Wrap a completed decode result
    pub fn from_decoded(decoded: DecodedGrid) -> Self {
        Self {
            role: decoded.role,
            index_min: decoded.index_min,
            index_size: decoded.index_size,
            index_to_local: decoded.index_to_local,
            cpu: decoded.bytes.into(),
            gpu: None,
        }
    }

    /// Decoded grid bytes
    pub fn cpu_bytes(&self) -> &[u8] {
        &self.cpu
    }

    pub fn cpu_size(&self) -> usize {
        self.cpu.len()
    }

    pub fn gpu_size(&self) -> usize {
        self.gpu.as_ref().map_or(0, |gpu| gpu.byte_size())
    }

    /// Total bytes this buffer accounts against the pool budget
    pub fn total_size(&self) -> usize {
        self.cpu_size() + self.gpu_size()
    }

    pub fn has_gpu(&self) -> bool {
        self.gpu.is_some()
    }

    pub fn gpu(&self) -> Option<&Arc<dyn GpuResource>> {
        self.gpu.as_ref()
    }

    /// Install the GPU handle after upload. Called by the pool under its
    /// state lock; existing clones keep seeing the CPU-only payload.
    pub fn set_gpu(&mut self, gpu: Arc<dyn GpuResource>) {
        self.gpu = Some(gpu);
    }
}

impl std::fmt::Debug for GridBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GridBuffer")
            .field("role", &self.role)
            .field("index_min", &self.index_min)
            .field("index_size", &self.index_size)
            .field("cpu_size", &self.cpu.len())
            .field("has_gpu", &self.gpu.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::IVec3;

    fn decoded(role: GridRole, bytes: usize) -> DecodedGrid {
        DecodedGrid {
            role,
            index_min: IVec3::new(-8, 0, -8),
            index_size: IVec3::new(16, 32, 16),
            index_to_local: Mat4::IDENTITY,
            bytes: vec![0u8; bytes],
        }
    }

    struct FakeGpu(usize);
    impl GpuResource for FakeGpu {
        fn byte_size(&self) -> usize {
            self.0
        }
    }

    #[test]
    fn test_from_decoded() {
        let buffer = GridBuffer::from_decoded(decoded(GridRole::Density, 256));
        assert_eq!(buffer.role, GridRole::Density);
        assert_eq!(buffer.cpu_size(), 256);
        assert_eq!(buffer.gpu_size(), 0);
        assert_eq!(buffer.total_size(), 256);
        assert!(!buffer.has_gpu());
    }

    #[test]
    fn test_gpu_accounting() {
        let mut buffer = GridBuffer::from_decoded(decoded(GridRole::Velocity, 128));
        buffer.set_gpu(Arc::new(FakeGpu(512)));
        assert!(buffer.has_gpu());
        assert_eq!(buffer.total_size(), 128 + 512);
    }

    #[test]
    fn test_clones_share_payload() {
        let buffer = GridBuffer::from_decoded(decoded(GridRole::Color, 64));
        let clone = buffer.clone();
        assert_eq!(buffer.cpu_bytes().as_ptr(), clone.cpu_bytes().as_ptr());
    }

    #[test]
    fn test_clone_does_not_see_later_upload() {
        let mut buffer = GridBuffer::from_decoded(decoded(GridRole::Density, 64));
        let clone = buffer.clone();
        buffer.set_gpu(Arc::new(FakeGpu(64)));
        assert!(buffer.has_gpu());
        assert!(!clone.has_gpu());
    }

    #[test]
    fn test_role_round_trip() {
        for role in GridRole::ALL {
            assert_eq!(GridRole::ALL[role.index()], role);
        }
    }
}
