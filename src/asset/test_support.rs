//! Shared fixtures for asset and streaming tests

use glam::{IVec3, Mat4, Vec3};

use super::descriptor::{
    FrameInfos, FrameRange, GridClass, GridInfo, Quantization, SequenceDescriptor, SequenceId,
};
use super::source::{FrameChunkData, GridChunkData};

/// Build a descriptor with `frame_count` frames whose active region grows
/// with the frame index, so bounds/largest-volume aggregation is observable.
pub fn test_descriptor(frame_count: u32, frame_rate: f32) -> SequenceDescriptor {
    let frames = (0..frame_count)
        .map(|i| {
            let extent = 8 + i as i32;
            let radius = 1.0 + i as f32 * 0.25;
            FrameInfos {
                index_min: IVec3::splat(-extent),
                index_max: IVec3::splat(extent),
                bounds_min: Vec3::splat(-radius),
                bounds_max: Vec3::splat(radius),
                index_to_local: Mat4::IDENTITY,
                active_voxels: 1000 + i as u64,
                memory_usage: 1024,
            }
        })
        .collect::<Vec<_>>();

    let ranges = (0..frame_count)
        .map(|i| FrameRange {
            offset: i as u64 * 4096,
            len: 4096,
        })
        .collect();

    SequenceDescriptor {
        id: SequenceId::default(),
        name: "test_sequence".into(),
        grid_class: GridClass::FogVolume,
        quantization: Quantization::None,
        frame_rate,
        voxel_size: 0.1,
        grids: vec![GridInfo {
            name: "density".into(),
            is_vector: false,
        }],
        frames,
        ranges,
    }
}

/// Build a frame chunk with `grid_count` grids of `payload_len` bytes each
pub fn test_chunk(frame: u32, grid_count: u32, payload_len: usize) -> FrameChunkData {
    let grids = (0..grid_count)
        .map(|g| GridChunkData {
            grid_index: g,
            index_min: [-8, -8, -8],
            index_size: [16, 16, 16],
            index_to_local: Mat4::IDENTITY.to_cols_array(),
            data: vec![(frame + g) as u8; payload_len],
        })
        .collect();

    FrameChunkData { frame, grids }
}
