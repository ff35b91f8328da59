//! Playback notifications as an explicitly drained queue
//!
//! Dependent systems (material parameter updates, dynamic mesh
//! regeneration) react to frame changes. Instead of broadcast delegates
//! firing re-entrantly from inside the tick, events accumulate here and
//! the owner drains them at a point of its choosing.

/// A playback notification
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlaybackEvent {
    /// The resolved target frame index changed
    FrameChanged(u32),
    /// Sub-frame interpolation fraction for the current tick
    SubFrame(f32),
}

/// Accumulates playback events between drains
#[derive(Debug, Default)]
pub struct PlaybackEvents {
    queue: Vec<PlaybackEvent>,
    last_frame: Option<u32>,
}

impl PlaybackEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the frame resolved this tick; emits `FrameChanged` only on
    /// an actual change
    pub fn frame_resolved(&mut self, frame: u32) {
        if self.last_frame != Some(frame) {
            self.last_frame = Some(frame);
            self.queue.push(PlaybackEvent::FrameChanged(frame));
        }
    }

    /// Emit `FrameChanged` even if the index did not change (asset swap,
    /// forced refresh)
    pub fn force_frame_changed(&mut self, frame: u32) {
        self.last_frame = Some(frame);
        self.queue.push(PlaybackEvent::FrameChanged(frame));
    }

    /// Record the sub-frame fraction; emitted every tick
    pub fn sub_frame(&mut self, fraction: f32) {
        self.queue.push(PlaybackEvent::SubFrame(fraction));
    }

    /// Take all pending events, leaving the queue empty
    pub fn drain(&mut self) -> Vec<PlaybackEvent> {
        std::mem::take(&mut self.queue)
    }

    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    /// Frame index last reported through `frame_resolved`
    pub fn last_frame(&self) -> Option<u32> {
        self.last_frame
    }
}
