//! Frame selection: elapsed time to target frame plus prefetch window
//!
//! The selector maps the clock's elapsed time to a frame index and a
//! sub-frame interpolation fraction, and decides which frames to request
//! from the pool ahead of the playhead so decode latency stays hidden.

use std::sync::Arc;

use crate::asset::descriptor::SequenceDescriptor;
use crate::streaming::buffer::FrameKey;
use crate::streaming::priority::LoadPriority;

/// Result of mapping elapsed time to a frame
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameChoice {
    /// Target frame index, always within `[0, frame_count)`
    pub frame: u32,
    /// Sub-frame interpolation fraction in `[0, 1)`, for temporal blending
    pub fraction: f32,
    /// True when a non-looping playhead ran past the last frame
    pub past_end: bool,
}

/// Maps playback time to frames and schedules the prefetch window
pub struct FrameSelector {
    descriptor: Arc<SequenceDescriptor>,
    /// Frames requested ahead of the playhead each update
    prefetch_frames: u32,
}

impl FrameSelector {
    pub fn new(descriptor: Arc<SequenceDescriptor>, prefetch_frames: u32) -> Self {
        Self {
            descriptor,
            prefetch_frames,
        }
    }

    pub fn descriptor(&self) -> &Arc<SequenceDescriptor> {
        &self.descriptor
    }

    /// Map elapsed seconds to a frame index and sub-frame fraction
    ///
    /// Looping wraps with modulo; otherwise the index clamps to the last
    /// frame and `past_end` tells the caller to finish playback.
    pub fn select(&self, elapsed: f32, looping: bool) -> FrameChoice {
        let frame_count = self.descriptor.frame_count();
        if frame_count == 0 {
            return FrameChoice {
                frame: 0,
                fraction: 0.0,
                past_end: false,
            };
        }

        let frame_float = (elapsed.max(0.0) * self.descriptor.frame_rate).max(0.0);
        let raw_index = frame_float.floor() as i64;
        let fraction = frame_float.fract();

        if looping {
            FrameChoice {
                frame: (raw_index % frame_count as i64) as u32,
                fraction,
                past_end: false,
            }
        } else {
            let past_end = raw_index >= frame_count as i64;
            FrameChoice {
                frame: self.descriptor.clamp_frame(raw_index),
                fraction: if past_end { 0.0 } else { fraction },
                past_end,
            }
        }
    }

    /// Frame index as a float, for callers blending between frames
    pub fn frame_index_float(&self, elapsed: f32, looping: bool) -> f32 {
        let choice = self.select(elapsed, looping);
        choice.frame as f32 + choice.fraction
    }

    /// Frames to request this update: the target at top priority, then the
    /// forward window at decaying priority. Wraps when looping, clamps at
    /// the sequence end otherwise (shorter window, no duplicates).
    pub fn window(&self, target: u32, looping: bool) -> Vec<(FrameKey, LoadPriority)> {
        let frame_count = self.descriptor.frame_count();
        if frame_count == 0 {
            return Vec::new();
        }

        let mut requests = Vec::with_capacity(self.prefetch_frames as usize + 1);
        for ahead in 0..=self.prefetch_frames {
            let unwrapped = target as u64 + ahead as u64;
            let frame = if looping {
                (unwrapped % frame_count as u64) as u32
            } else if unwrapped >= frame_count as u64 {
                break;
            } else {
                unwrapped as u32
            };

            // A tiny looping sequence can wrap onto the target itself
            if requests
                .iter()
                .any(|(key, _): &(FrameKey, LoadPriority)| key.frame == frame)
            {
                break;
            }

            requests.push((
                FrameKey::new(self.descriptor.id, frame),
                LoadPriority::from_lookahead(ahead),
            ));
        }

        requests
    }
}
