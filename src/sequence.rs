//! Sequence player: wires clock, selector, loader and pool together
//!
//! The game-thread owner of one animated volume. Each tick it advances
//! playback time, resolves the target frame, asks the pool for the frame
//! and its prefetch window, pumps decode results, and queues notifications
//! for dependent systems. The render thread talks to the same pool through
//! a [`ViewBuilder`](crate::render::ViewBuilder).

use std::sync::Arc;

use glam::Vec3;

use crate::asset::descriptor::{RoleBindings, SequenceDescriptor};
use crate::asset::source::VolumeSource;
use crate::playback::clock::{EndBehavior, PlayState, PlaybackClock};
use crate::playback::events::{PlaybackEvent, PlaybackEvents};
use crate::playback::selector::FrameSelector;
use crate::render::view::ViewBuilder;
use crate::streaming::buffer::FrameKey;
use crate::streaming::loader::{FrameLoader, LoadOutcome, LoaderConfig};
use crate::streaming::pool::{EntryState, ResidentFrame, StreamingConfig, StreamingPool};

/// Game-thread playback component for one volume sequence
pub struct SequencePlayer {
    descriptor: Arc<SequenceDescriptor>,
    bindings: RoleBindings,
    pool: Arc<StreamingPool>,
    loader: FrameLoader,
    clock: PlaybackClock,
    selector: FrameSelector,
    events: PlaybackEvents,
    /// Last resolved target frame
    current_frame: u32,
    /// Start playback on `begin`
    autoplay: bool,
}

impl SequencePlayer {
    pub fn new(
        descriptor: Arc<SequenceDescriptor>,
        bindings: RoleBindings,
        source: Arc<dyn VolumeSource>,
        config: StreamingConfig,
    ) -> Self {
        let pool = Arc::new(StreamingPool::new(config.budget_bytes));
        let loader = FrameLoader::new(
            source,
            LoaderConfig {
                max_concurrent: config.max_concurrent_loads,
            },
        );
        let clock = PlaybackClock::new(descriptor.duration());
        let selector = FrameSelector::new(descriptor.clone(), config.prefetch_frames);

        Self {
            descriptor,
            bindings,
            pool,
            loader,
            clock,
            selector,
            events: PlaybackEvents::new(),
            current_frame: 0,
            autoplay: true,
        }
    }

    // --- Playback controls (UI / scripting surface) ---

    pub fn play(&mut self) {
        self.clock.play();
    }

    pub fn pause(&mut self) {
        self.clock.pause();
    }

    pub fn stop(&mut self) {
        self.clock.stop();
    }

    pub fn seek(&mut self, seconds: f32) {
        self.clock.seek(seconds);
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.clock.set_speed(speed);
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.clock.set_looping(looping);
    }

    pub fn set_start_offset(&mut self, offset: f32) {
        self.clock.set_start_offset(offset);
    }

    pub fn set_end_behavior(&mut self, behavior: EndBehavior) {
        self.clock.set_end_behavior(behavior);
    }

    pub fn set_autoplay(&mut self, autoplay: bool) {
        self.autoplay = autoplay;
    }

    pub fn set_manual(&mut self, manual: bool) {
        self.clock.set_manual(manual);
    }

    /// Sequencer-driven time update (manual mode)
    pub fn manual_tick(&mut self, time: f32, running: bool, backwards: bool, looping: bool) {
        self.clock.manual_tick(time, running, backwards, looping);
    }

    /// Called when the owning actor enters play; honors autoplay
    pub fn begin(&mut self) {
        if self.autoplay {
            self.clock.play();
        } else {
            // Still resolve and buffer the start frame for display
            self.clock.stop();
        }
    }

    // --- Per-frame update ---

    /// Advance playback and keep the pool fed
    ///
    /// Never blocks on loads: a frame that is not resident yet simply is
    /// not resolved this tick, and the render side keeps its previous
    /// view.
    pub fn tick(&mut self, delta: f32) {
        self.clock.tick(delta);
        self.pump_loader();

        let choice = self
            .selector
            .select(self.clock.elapsed(), self.clock.looping());

        // In manual mode the sequencer owns the timeline; never auto-finish
        if choice.past_end && !self.clock.manual() && self.clock.state() == PlayState::Playing {
            self.clock.finish();
        }

        for (key, priority) in self.selector.window(choice.frame, self.clock.looping()) {
            if self.pool.request_frame(key) {
                self.loader.request(key, priority);
            }
        }

        self.current_frame = choice.frame;
        self.events.frame_resolved(choice.frame);
        self.events.sub_frame(choice.fraction);
    }

    /// Drain decode outcomes into the pool
    fn pump_loader(&mut self) {
        for outcome in self.loader.poll_results() {
            match outcome {
                LoadOutcome::Loaded {
                    key,
                    grids,
                    load_time_ms,
                } => {
                    log::debug!(
                        "frame {} decoded in {:.1} ms ({} grids)",
                        key.frame,
                        load_time_ms,
                        grids.len()
                    );
                    self.pool.on_load_completed(key, grids);
                }
                LoadOutcome::Failed { key, error } => {
                    self.pool.on_load_failed(key, &error);
                }
            }
        }
    }

    // --- Queries ---

    pub fn state(&self) -> PlayState {
        self.clock.state()
    }

    pub fn elapsed(&self) -> f32 {
        self.clock.elapsed()
    }

    pub fn loop_count(&self) -> u32 {
        self.clock.loop_count()
    }

    /// Duration of one pass at the current speed, in seconds
    pub fn duration(&self) -> f32 {
        self.clock.effective_duration()
    }

    pub fn current_frame(&self) -> u32 {
        self.current_frame
    }

    /// Frame index as a float, for temporal blending
    pub fn frame_index_float(&self) -> f32 {
        self.selector
            .frame_index_float(self.clock.elapsed(), self.clock.looping())
    }

    pub fn target_key(&self) -> FrameKey {
        FrameKey::new(self.descriptor.id, self.current_frame)
    }

    /// Snapshot of the current frame's buffers, if resident
    pub fn try_get_current(&self) -> Option<ResidentFrame> {
        self.pool.try_get(self.target_key())
    }

    /// True once the current target frame is resident
    pub fn is_buffered(&self) -> bool {
        self.pool.state(self.target_key()) == EntryState::Ready
    }

    /// Take the notifications queued since the last drain
    pub fn drain_events(&mut self) -> Vec<PlaybackEvent> {
        self.events.drain()
    }

    pub fn descriptor(&self) -> &Arc<SequenceDescriptor> {
        &self.descriptor
    }

    pub fn bindings(&self) -> RoleBindings {
        self.bindings
    }

    pub fn pool(&self) -> &Arc<StreamingPool> {
        &self.pool
    }

    /// Create the render-side view builder sharing this player's pool
    pub fn view_builder(&self) -> ViewBuilder {
        ViewBuilder::new(self.pool.clone())
    }

    // --- Volume placement queries ---

    /// Extent of the sequence's global bounding box
    pub fn volume_size(&self) -> Vec3 {
        let (min, max) = self.descriptor.global_bounds();
        max - min
    }

    /// Minimum corner of the global bounding box
    pub fn volume_offset(&self) -> Vec3 {
        self.descriptor.global_bounds().0
    }

    /// Current frame's extent relative to the largest frame, for UV
    /// remapping of volume textures
    pub fn volume_uv_scale(&self) -> Vec3 {
        let largest = self.descriptor.largest_volume().as_vec3();
        let Some(infos) = self.descriptor.frame_infos(self.current_frame) else {
            return Vec3::ONE;
        };
        if largest.cmple(Vec3::ZERO).any() {
            return Vec3::ONE;
        }
        infos.size().as_vec3() / largest
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::descriptor::SequenceId;
    use crate::asset::source::{DecodedGrid, MemorySource};
    use crate::asset::test_support::test_descriptor;
    use crate::streaming::buffer::GridRole;
    use glam::{IVec3, Mat4};
    use std::time::Duration;

    fn grids_for(frame: u32) -> Vec<DecodedGrid> {
        vec![DecodedGrid {
            role: GridRole::Density,
            index_min: IVec3::splat(-4),
            index_size: IVec3::splat(8),
            index_to_local: Mat4::IDENTITY,
            bytes: vec![frame as u8; 64],
        }]
    }

    fn player(frame_count: u32, frame_rate: f32) -> SequencePlayer {
        let mut descriptor = test_descriptor(frame_count, frame_rate);
        descriptor.id = SequenceId::next();

        let mut source = MemorySource::new();
        for frame in 0..frame_count {
            source = source.with_frame(frame, grids_for(frame));
        }

        SequencePlayer::new(
            Arc::new(descriptor),
            RoleBindings::default(),
            Arc::new(source),
            StreamingConfig {
                budget_bytes: 1024 * 1024,
                prefetch_frames: 2,
                max_concurrent_loads: 2,
            },
        )
    }

    /// Pump ticks until the current frame is resident (decodes are async)
    fn settle(player: &mut SequencePlayer) {
        for _ in 0..500 {
            player.tick(0.0);
            if player.is_buffered() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("frame never became resident");
    }

    #[test]
    fn test_tick_buffers_current_frame() {
        let mut player = player(8, 30.0);
        player.play();
        settle(&mut player);

        assert_eq!(player.current_frame(), 0);
        let frame = player.try_get_current().expect("frame should be resident");
        assert!(frame.buffer(GridRole::Density).is_some());
    }

    #[test]
    fn test_prefetch_window_requested() {
        let mut player = player(8, 30.0);
        player.play();
        player.tick(0.0);

        // Current frame plus two lookahead frames are at least requested
        let id = player.descriptor().id;
        for frame in 0..3 {
            let state = player.pool().state(FrameKey::new(id, frame));
            assert_ne!(
                state,
                EntryState::Empty { failed: false },
                "frame {} was never requested",
                frame
            );
        }
    }

    #[test]
    fn test_playback_advances_frames() {
        let mut player = player(8, 10.0);
        player.play();
        settle(&mut player);

        // 0.25s at 10 fps lands on frame 2
        player.tick(0.25);
        assert_eq!(player.current_frame(), 2);
    }

    #[test]
    fn test_non_looping_playback_finishes() {
        let mut player = player(4, 10.0);
        player.set_looping(false);
        player.play();
        settle(&mut player);

        // Run well past the 0.4s duration
        player.tick(1.0);
        assert_eq!(player.current_frame(), 3);
        assert_eq!(player.state(), PlayState::Stopped);
    }

    #[test]
    fn test_looping_playback_wraps() {
        let mut player = player(4, 10.0);
        player.set_looping(true);
        player.play();
        settle(&mut player);

        player.tick(0.45);
        // 0.45s of a 0.4s sequence wraps to 0.05s = frame 0
        assert_eq!(player.current_frame(), 0);
        assert_eq!(player.loop_count(), 1);
    }

    #[test]
    fn test_frame_changed_events() {
        let mut player = player(8, 10.0);
        player.play();
        settle(&mut player);
        player.drain_events();

        // Stay within frame 0: no FrameChanged, one SubFrame per tick
        player.tick(0.01);
        let events = player.drain_events();
        assert!(events.iter().all(|e| matches!(e, PlaybackEvent::SubFrame(_))));

        // Cross into frame 1
        player.tick(0.1);
        let events = player.drain_events();
        assert!(events.contains(&PlaybackEvent::FrameChanged(1)));
    }

    #[test]
    fn test_failed_frame_keeps_player_running() {
        let mut descriptor = test_descriptor(4, 10.0);
        descriptor.id = SequenceId::next();

        // Frame 1 always fails to decode
        let source = MemorySource::new()
            .with_frame(0, grids_for(0))
            .with_frame(2, grids_for(2))
            .with_frame(3, grids_for(3))
            .with_failure(1);

        let mut player = SequencePlayer::new(
            Arc::new(descriptor),
            RoleBindings::default(),
            Arc::new(source),
            StreamingConfig::default(),
        );
        player.play();
        settle(&mut player);

        // Advance onto the broken frame and let the failure land
        player.tick(0.1);
        for _ in 0..100 {
            player.tick(0.0);
            if player.pool().stats().loads_failed >= 1 {
                break;
            }
            std::thread::sleep(Duration::from_millis(2));
        }

        assert!(player.pool().stats().loads_failed >= 1);
        assert_eq!(player.current_frame(), 1);
        assert!(!player.is_buffered());
        // Render side falls back to the last good frame via its stale view;
        // playback itself keeps going
        assert_eq!(player.state(), PlayState::Playing);
    }

    #[test]
    fn test_stale_view_across_missing_frame() {
        let mut player = player(8, 10.0);
        player.play();
        settle(&mut player);

        let mut builder = player.view_builder();
        let view = builder.build(player.target_key());
        assert!(view.has_data());
        assert_eq!(view.frame, 0);

        // Jump far ahead of the prefetch window; frame 7 is not resident
        player.seek(0.7);
        player.tick(0.0);
        assert_eq!(player.current_frame(), 7);

        let stale = builder.build(player.target_key());
        assert_eq!(stale.frame, 0);
        assert!(stale.has_data());
    }

    #[test]
    fn test_volume_queries() {
        let player = player(4, 10.0);

        let size = player.volume_size();
        assert!(size.x > 0.0 && size.y > 0.0 && size.z > 0.0);

        let uv_scale = player.volume_uv_scale();
        // Frame 0 is the smallest frame of the test sequence
        assert!(uv_scale.x <= 1.0 && uv_scale.x > 0.0);
    }

    #[test]
    fn test_begin_honors_autoplay() {
        let mut player = player(4, 10.0);
        player.begin();
        assert_eq!(player.state(), PlayState::Playing);

        let mut player = self::player(4, 10.0);
        player.set_autoplay(false);
        player.begin();
        assert_eq!(player.state(), PlayState::Stopped);
    }
}
