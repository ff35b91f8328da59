//! Frame chunk decoding and the volume source abstraction
//!
//! The streaming loader pulls decoded frame payloads through the
//! [`VolumeSource`] trait. The file-backed implementation reads the byte
//! range recorded in the descriptor, LZ4-decompresses it and validates the
//! chunk container; the grid payload itself stays opaque bytes for the
//! renderer to interpret.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use glam::{IVec3, Mat4};
use rkyv::{Archive, Deserialize, Serialize};

use crate::asset::descriptor::{FrameRange, RoleBindings, SequenceDescriptor};
use crate::core::error::Error;
use crate::core::Result;
use crate::streaming::buffer::{FrameKey, GridRole};

/// Decoded payload of one grid for one frame, as produced by a source
#[derive(Clone, Debug)]
pub struct DecodedGrid {
    pub role: GridRole,
    pub index_min: IVec3,
    pub index_size: IVec3,
    pub index_to_local: Mat4,
    pub bytes: Vec<u8>,
}

/// Serializable payload of one grid inside a frame chunk
#[derive(Archive, Deserialize, Serialize)]
pub struct GridChunkData {
    pub grid_index: u32,
    pub index_min: [i32; 3],
    pub index_size: [i32; 3],
    pub index_to_local: [f32; 16],
    pub data: Vec<u8>,
}

/// Serializable container for all grids of one frame
#[derive(Archive, Deserialize, Serialize)]
pub struct FrameChunkData {
    pub frame: u32,
    pub grids: Vec<GridChunkData>,
}

/// Serialize and compress a frame chunk (LZ4, size-prepended)
pub fn compress_frame_chunk(chunk: &FrameChunkData) -> std::result::Result<Vec<u8>, io::Error> {
    let bytes = rkyv::to_bytes::<rkyv::rancor::Error>(chunk)
        .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))?;
    Ok(lz4_flex::compress_prepend_size(&bytes))
}

/// Decompress and deserialize a frame chunk
pub fn decompress_frame_chunk(data: &[u8]) -> std::result::Result<FrameChunkData, io::Error> {
    let decompressed = lz4_flex::decompress_size_prepended(data)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, format!("LZ4 decompression failed: {}", e)))?;

    let archived = rkyv::access::<ArchivedFrameChunkData, rkyv::rancor::Error>(&decompressed)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))?;

    rkyv::deserialize::<FrameChunkData, rkyv::rancor::Error>(archived)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e.to_string()))
}

/// Append compressed frame chunks to an asset file, returning the byte
/// range of each frame for the descriptor
pub fn write_frame_chunks(path: &Path, chunks: &[FrameChunkData]) -> Result<Vec<FrameRange>> {
    let mut file = File::create(path)?;
    let mut ranges = Vec::with_capacity(chunks.len());
    let mut offset = 0u64;

    for chunk in chunks {
        let compressed = compress_frame_chunk(chunk)?;
        file.write_all(&compressed)?;
        ranges.push(FrameRange {
            offset,
            len: compressed.len() as u64,
        });
        offset += compressed.len() as u64;
    }

    Ok(ranges)
}

/// Supplies decoded frame payloads to the streaming loader
///
/// `decode_chunk` is synchronous per call and runs on a loader worker
/// thread; implementations must be safe to call from several workers at
/// once. Errors are retryable: the pool flags the frame as failed and
/// re-enqueues it on the next request.
pub trait VolumeSource: Send + Sync + 'static {
    /// Decode all bound grids of one frame
    fn decode_chunk(&self, key: FrameKey) -> Result<Vec<DecodedGrid>>;
}

/// File-backed volume source reading frame chunks by byte range
pub struct FileSource {
    descriptor: Arc<SequenceDescriptor>,
    bindings: RoleBindings,
    path: PathBuf,
}

impl FileSource {
    pub fn new(descriptor: Arc<SequenceDescriptor>, bindings: RoleBindings, path: impl Into<PathBuf>) -> Self {
        Self {
            descriptor,
            bindings,
            path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_range(&self, range: FrameRange) -> std::result::Result<Vec<u8>, io::Error> {
        let mut file = File::open(&self.path)?;
        file.seek(SeekFrom::Start(range.offset))?;
        let mut data = vec![0u8; range.len as usize];
        file.read_exact(&mut data)?;
        Ok(data)
    }
}

impl VolumeSource for FileSource {
    fn decode_chunk(&self, key: FrameKey) -> Result<Vec<DecodedGrid>> {
        if key.sequence != self.descriptor.id {
            return Err(Error::Decode {
                frame: key.frame,
                reason: format!("unknown sequence {:?}", key.sequence),
            });
        }

        let range = *self
            .descriptor
            .ranges
            .get(key.frame as usize)
            .ok_or_else(|| Error::Decode {
                frame: key.frame,
                reason: "frame index out of range".into(),
            })?;

        let compressed = self.read_range(range).map_err(|e| Error::Decode {
            frame: key.frame,
            reason: e.to_string(),
        })?;

        let chunk = decompress_frame_chunk(&compressed).map_err(|e| Error::Decode {
            frame: key.frame,
            reason: e.to_string(),
        })?;

        if chunk.frame != key.frame {
            return Err(Error::Decode {
                frame: key.frame,
                reason: format!("chunk contains frame {}", chunk.frame),
            });
        }

        let mut grids = Vec::new();
        for grid in chunk.grids {
            // Grids without a bound role are skipped, not decoded
            let Some(role) = self.bindings.role_for(grid.grid_index) else {
                continue;
            };
            grids.push(DecodedGrid {
                role,
                index_min: IVec3::from_array(grid.index_min),
                index_size: IVec3::from_array(grid.index_size),
                index_to_local: Mat4::from_cols_array(&grid.index_to_local),
                bytes: grid.data,
            });
        }

        if grids.is_empty() {
            return Err(Error::Decode {
                frame: key.frame,
                reason: "no bound grids in chunk".into(),
            });
        }

        Ok(grids)
    }
}

/// In-memory volume source for tests and procedural content
///
/// Supports failure injection and artificial decode latency, and counts
/// decode calls so callers can assert on request coalescing.
pub struct MemorySource {
    frames: HashMap<u32, Vec<DecodedGrid>>,
    fail_frames: std::collections::HashSet<u32>,
    delay: Option<Duration>,
    decode_calls: AtomicU32,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            frames: HashMap::new(),
            fail_frames: std::collections::HashSet::new(),
            delay: None,
            decode_calls: AtomicU32::new(0),
        }
    }

    pub fn with_frame(mut self, frame: u32, grids: Vec<DecodedGrid>) -> Self {
        self.frames.insert(frame, grids);
        self
    }

    /// Make decodes of the given frame fail
    pub fn with_failure(mut self, frame: u32) -> Self {
        self.fail_frames.insert(frame);
        self
    }

    /// Add artificial latency to every decode
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Total number of decode calls served so far
    pub fn decode_calls(&self) -> u32 {
        self.decode_calls.load(Ordering::SeqCst)
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumeSource for MemorySource {
    fn decode_chunk(&self, key: FrameKey) -> Result<Vec<DecodedGrid>> {
        self.decode_calls.fetch_add(1, Ordering::SeqCst);

        if let Some(delay) = self.delay {
            std::thread::sleep(delay);
        }

        if self.fail_frames.contains(&key.frame) {
            return Err(Error::Decode {
                frame: key.frame,
                reason: "injected failure".into(),
            });
        }

        self.frames.get(&key.frame).cloned().ok_or_else(|| Error::Decode {
            frame: key.frame,
            reason: "frame not present".into(),
        })
    }
}
