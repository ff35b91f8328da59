//! Volseq - Streaming playback for animated sparse voxel volumes
//!
//! The crate turns a multi-gigabyte NanoVDB-style volume sequence into a
//! small set of frame-resident grid buffers. A bounded streaming pool loads
//! frames asynchronously ahead of the playhead and evicts stale frames under
//! memory pressure; the renderer consumes an immutable per-submission view
//! of the current frame's buffers.

pub mod core;
pub mod asset;
pub mod streaming;
pub mod playback;
pub mod render;
pub mod sequence;

pub use crate::core::{Error, Result};
pub use asset::{DecodedGrid, FrameInfos, SequenceDescriptor, SequenceId, VolumeSource};
pub use playback::{PlayState, PlaybackEvent};
pub use render::ResidentView;
pub use sequence::SequencePlayer;
pub use streaming::{FrameKey, GridRole, StreamingConfig, StreamingPool};
