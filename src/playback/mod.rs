//! Playback clock, frame selection and notifications

pub mod clock;
pub mod selector;
pub mod events;

pub use clock::{EndBehavior, PlayState, PlaybackClock};
pub use events::{PlaybackEvent, PlaybackEvents};
pub use selector::{FrameChoice, FrameSelector};
