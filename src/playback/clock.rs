//! Playback clock: elapsed time and the play state machine
//!
//! The clock is mutated only by the game-thread tick. It knows the
//! sequence duration but nothing about frames; mapping elapsed time to a
//! frame index is the selector's job.

/// Play mode of an animated volume
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayState {
    Stopped,
    Playing,
    Paused,
}

/// What happens when a non-looping sequence reaches its last frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndBehavior {
    /// Transition to `Stopped`
    Stop,
    /// Hold the last frame in `Paused`
    PauseAtEnd,
}

/// Minimum playback speed multiplier
pub const MIN_SPEED: f32 = 1e-4;

/// Advances logical playback time for one sequence
pub struct PlaybackClock {
    state: PlayState,
    /// Elapsed seconds. Monotonic while playing except on seek/loop-wrap;
    /// undefined (ignored) while stopped.
    elapsed: f32,
    /// Speed multiplier applied to tick deltas
    speed: f32,
    looping: bool,
    /// Relative start offset in `[0, 1]` of the sequence duration
    start_offset: f32,
    end_behavior: EndBehavior,
    /// Duration of one pass in seconds, at unit speed
    duration: f32,
    loop_count: u32,
    /// When set, `tick` is a no-op and time comes from `manual_tick`
    /// (sequencer-driven playback)
    manual: bool,
}

impl PlaybackClock {
    pub fn new(duration: f32) -> Self {
        Self {
            state: PlayState::Stopped,
            elapsed: 0.0,
            speed: 1.0,
            looping: true,
            start_offset: 0.0,
            end_behavior: EndBehavior::Stop,
            duration: duration.max(0.0),
            loop_count: 0,
            manual: false,
        }
    }

    /// Start or resume playback
    ///
    /// From `Stopped` the clock restarts at the start offset; from
    /// `Paused` it resumes where it was.
    pub fn play(&mut self) {
        match self.state {
            PlayState::Stopped => {
                self.elapsed = self.start_time();
                self.loop_count = 0;
                self.state = PlayState::Playing;
            }
            PlayState::Paused => self.state = PlayState::Playing,
            PlayState::Playing => {}
        }
    }

    pub fn pause(&mut self) {
        if self.state == PlayState::Playing {
            self.state = PlayState::Paused;
        }
    }

    /// Stop playback and reset elapsed time to the start offset
    pub fn stop(&mut self) {
        self.state = PlayState::Stopped;
        self.elapsed = self.start_time();
        self.loop_count = 0;
    }

    /// Set elapsed time directly, in any state
    pub fn seek(&mut self, seconds: f32) {
        self.elapsed = seconds.max(0.0);
    }

    /// Advance time; only has an effect while `Playing`
    pub fn tick(&mut self, delta: f32) {
        if self.manual || self.state != PlayState::Playing {
            return;
        }

        self.elapsed += delta * self.speed;

        if self.looping && self.duration > 0.0 {
            while self.elapsed >= self.duration {
                self.elapsed -= self.duration;
                self.loop_count += 1;
            }
        }
    }

    /// Sequencer-driven time update, bypassing the internal tick
    ///
    /// `time` is absolute within the sequence; `backwards` plays the
    /// sequence mirrored from the end.
    pub fn manual_tick(&mut self, time: f32, running: bool, backwards: bool, looping: bool) {
        self.looping = looping;

        let mut elapsed = if backwards {
            self.duration - time
        } else {
            time
        };
        if looping && self.duration > 0.0 {
            elapsed = elapsed.rem_euclid(self.duration);
        }
        self.elapsed = elapsed.clamp(0.0, self.duration.max(0.0));
        self.state = if running {
            PlayState::Playing
        } else {
            PlayState::Paused
        };
    }

    /// Apply the configured end behavior when a non-looping sequence has
    /// passed its last frame. Driven by the playback owner once the
    /// selector reports past-end.
    pub fn finish(&mut self) {
        match self.end_behavior {
            EndBehavior::Stop => {
                self.state = PlayState::Stopped;
                self.elapsed = self.duration;
            }
            EndBehavior::PauseAtEnd => {
                self.state = PlayState::Paused;
                self.elapsed = self.duration;
            }
        }
    }

    pub fn set_speed(&mut self, speed: f32) {
        self.speed = speed.max(MIN_SPEED);
    }

    pub fn set_looping(&mut self, looping: bool) {
        self.looping = looping;
    }

    /// Set the relative start offset; takes effect immediately when
    /// stopped so scrubbing the offset previews the right frame
    pub fn set_start_offset(&mut self, offset: f32) {
        self.start_offset = offset.clamp(0.0, 1.0);
        if self.state == PlayState::Stopped {
            self.elapsed = self.start_time();
        }
    }

    pub fn set_end_behavior(&mut self, behavior: EndBehavior) {
        self.end_behavior = behavior;
    }

    pub fn set_manual(&mut self, manual: bool) {
        self.manual = manual;
    }

    pub fn state(&self) -> PlayState {
        self.state
    }

    pub fn elapsed(&self) -> f32 {
        self.elapsed
    }

    pub fn speed(&self) -> f32 {
        self.speed
    }

    pub fn looping(&self) -> bool {
        self.looping
    }

    pub fn loop_count(&self) -> u32 {
        self.loop_count
    }

    pub fn manual(&self) -> bool {
        self.manual
    }

    /// Duration of one pass scaled by the current speed
    pub fn effective_duration(&self) -> f32 {
        self.duration / self.speed
    }

    fn start_time(&self) -> f32 {
        self.start_offset * self.duration
    }
}
