//! Sequence assets: import-time metadata and frame chunk decoding

pub mod descriptor;
pub mod manifest;
pub mod source;

#[cfg(test)]
pub(crate) mod test_support;

pub use descriptor::{
    FrameInfos, FrameRange, GridClass, GridInfo, Quantization, RoleBindings,
    SequenceDescriptor, SequenceId,
};
pub use manifest::{load_descriptor, save_descriptor};
pub use source::{
    DecodedGrid, FileSource, MemorySource, VolumeSource,
    compress_frame_chunk, decompress_frame_chunk, write_frame_chunks,
    FrameChunkData, GridChunkData,
};
