//! Static sequence metadata computed at import time
//!
//! A [`SequenceDescriptor`] is created once when a volume asset is imported
//! or loaded and never mutated afterwards. Everything the streaming pool and
//! the playback clock need to know about a sequence without touching the
//! payload bytes lives here: frame count and rate, per-frame index bounds
//! and transforms, and the byte ranges of each frame chunk in the source.

use std::sync::atomic::{AtomicU64, Ordering};

use glam::{IVec3, Mat4, Vec3};
use serde::{Deserialize, Serialize};

use crate::core::error::Error;
use crate::streaming::buffer::GridRole;

/// Stable identifier for a loaded sequence, used in cache keys
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
pub struct SequenceId(pub u64);

static NEXT_SEQUENCE_ID: AtomicU64 = AtomicU64::new(1);

impl SequenceId {
    /// Allocate a fresh runtime id
    pub fn next() -> Self {
        Self(NEXT_SEQUENCE_ID.fetch_add(1, Ordering::Relaxed))
    }
}

/// Volume class of a grid, following the NanoVDB grid class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GridClass {
    FogVolume,
    SignedDistance,
    Undefined,
}

/// Quantization applied to voxel values at import time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Quantization {
    /// Keep original data type
    None,
    /// 4 bit quantization of floating point values
    Fp4,
    /// 8 bit quantization of floating point values
    Fp8,
    /// 16 bit quantization of floating point values
    Fp16,
    /// Variable bit quantization of floating point values
    FpN,
}

/// A named grid present in the source asset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridInfo {
    pub name: String,
    /// True if the grid stores vector values (velocity, color)
    pub is_vector: bool,
}

/// Which source grid index backs each render role
///
/// Mirrors how volume materials consume parallel channels of the same
/// animation: density drives opacity, temperature drives emission, velocity
/// drives motion blur, color tints scattering. `None` means the role is
/// inactive for this asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoleBindings {
    pub density: Option<u32>,
    pub temperature: Option<u32>,
    pub velocity: Option<u32>,
    pub color: Option<u32>,
}

impl Default for RoleBindings {
    fn default() -> Self {
        // First grid is the density channel unless rebound
        Self {
            density: Some(0),
            temperature: None,
            velocity: None,
            color: None,
        }
    }
}

impl RoleBindings {
    /// Resolve the grid index bound to a role
    pub fn grid_for(&self, role: GridRole) -> Option<u32> {
        match role {
            GridRole::Density => self.density,
            GridRole::Temperature => self.temperature,
            GridRole::Velocity => self.velocity,
            GridRole::Color => self.color,
        }
    }

    /// Resolve the role bound to a grid index, if any
    pub fn role_for(&self, grid_index: u32) -> Option<GridRole> {
        GridRole::ALL
            .into_iter()
            .find(|&role| self.grid_for(role) == Some(grid_index))
    }

    /// Iterate over the active (role, grid index) pairs
    pub fn active(&self) -> impl Iterator<Item = (GridRole, u32)> + '_ {
        GridRole::ALL
            .into_iter()
            .filter_map(|role| self.grid_for(role).map(|idx| (role, idx)))
    }
}

/// Per-frame volume information, immutable after import
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameInfos {
    /// Minimum active voxel coordinate in index space
    pub index_min: IVec3,
    /// Maximum active voxel coordinate in index space
    pub index_max: IVec3,
    /// Local-space bounding box
    pub bounds_min: Vec3,
    pub bounds_max: Vec3,
    /// Index space to local space transform
    pub index_to_local: Mat4,
    pub active_voxels: u64,
    /// Decoded payload size of this frame, in bytes
    pub memory_usage: u64,
}

impl FrameInfos {
    /// Active region size in voxels
    pub fn size(&self) -> IVec3 {
        self.index_max - self.index_min
    }
}

/// Byte range of one frame chunk inside the source asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameRange {
    pub offset: u64,
    pub len: u64,
}

/// Static description of an animated volume sequence
///
/// Owned by the asset, shared read-only with the streaming side. The id is
/// assigned at load time and is not part of the serialized form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SequenceDescriptor {
    #[serde(skip)]
    pub id: SequenceId,
    pub name: String,
    pub grid_class: GridClass,
    pub quantization: Quantization,
    /// Declared frames per second of the animation
    pub frame_rate: f32,
    /// Edge length of one cubic voxel in local units
    pub voxel_size: f32,
    pub grids: Vec<GridInfo>,
    pub frames: Vec<FrameInfos>,
    pub ranges: Vec<FrameRange>,
}

impl SequenceDescriptor {
    pub fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Duration of one playback pass in seconds, at unit speed
    pub fn duration(&self) -> f32 {
        if self.frame_rate > 0.0 {
            self.frames.len() as f32 / self.frame_rate
        } else {
            0.0
        }
    }

    /// Clamp an arbitrary frame index into `[0, frame_count)`
    pub fn clamp_frame(&self, frame: i64) -> u32 {
        let last = self.frames.len().saturating_sub(1) as i64;
        frame.clamp(0, last) as u32
    }

    pub fn frame_infos(&self, frame: u32) -> Option<&FrameInfos> {
        self.frames.get(frame as usize)
    }

    /// Union of all per-frame local-space bounds
    pub fn global_bounds(&self) -> (Vec3, Vec3) {
        let mut min = Vec3::splat(f32::INFINITY);
        let mut max = Vec3::splat(f32::NEG_INFINITY);
        for infos in &self.frames {
            min = min.min(infos.bounds_min);
            max = max.max(infos.bounds_max);
        }
        if self.frames.is_empty() {
            (Vec3::ZERO, Vec3::ZERO)
        } else {
            (min, max)
        }
    }

    /// Largest active region over the whole sequence, in voxels
    pub fn largest_volume(&self) -> IVec3 {
        self.frames
            .iter()
            .fold(IVec3::ZERO, |acc, infos| acc.max(infos.size()))
    }

    /// Sum of decoded frame payload sizes, in bytes
    pub fn total_memory_usage(&self) -> u64 {
        self.frames.iter().map(|infos| infos.memory_usage).sum()
    }

    /// Check internal consistency after load
    pub fn validate(&self) -> crate::core::Result<()> {
        if self.frames.is_empty() {
            return Err(Error::Sequence(format!("sequence '{}' has no frames", self.name)));
        }
        if self.frame_rate <= 0.0 {
            return Err(Error::Sequence(format!(
                "sequence '{}' has invalid frame rate {}",
                self.name, self.frame_rate
            )));
        }
        if self.ranges.len() != self.frames.len() {
            return Err(Error::Sequence(format!(
                "sequence '{}' has {} frames but {} chunk ranges",
                self.name,
                self.frames.len(),
                self.ranges.len()
            )));
        }
        if self.grids.is_empty() {
            return Err(Error::Sequence(format!("sequence '{}' has no grids", self.name)));
        }
        Ok(())
    }
}
