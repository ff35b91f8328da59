//! Load priority derived from distance to the playhead

use std::cmp::Ordering;

/// Priority of a frame load request. Higher is more urgent.
#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub struct LoadPriority(pub f32);

impl LoadPriority {
    /// The frame the playhead is on right now
    pub const CURRENT: LoadPriority = LoadPriority(1000.0);
    /// Frames inside the prefetch window
    pub const PREFETCH: LoadPriority = LoadPriority(100.0);
    /// Speculative loads (seek targets, replay warm-up)
    pub const BACKGROUND: LoadPriority = LoadPriority(1.0);

    /// Priority for a frame `frames_ahead` of the playhead: the current
    /// frame is critical, the prefetch window decays with distance.
    pub fn from_lookahead(frames_ahead: u32) -> Self {
        if frames_ahead == 0 {
            Self::CURRENT
        } else {
            LoadPriority(Self::PREFETCH.0 / frames_ahead as f32)
        }
    }

    /// Total ordering for request queues. Uses `total_cmp` so NaN cannot
    /// poison the sort.
    pub fn cmp_desc(a: &Self, b: &Self) -> Ordering {
        b.0.total_cmp(&a.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookahead_ordering() {
        let current = LoadPriority::from_lookahead(0);
        let next = LoadPriority::from_lookahead(1);
        let later = LoadPriority::from_lookahead(2);

        assert!(current.0 > next.0);
        assert!(next.0 > later.0);
        assert!(later.0 > LoadPriority::BACKGROUND.0);
    }

    #[test]
    fn test_sort_descending() {
        let mut priorities = vec![
            LoadPriority::BACKGROUND,
            LoadPriority::CURRENT,
            LoadPriority::PREFETCH,
        ];
        priorities.sort_by(LoadPriority::cmp_desc);

        assert_eq!(priorities[0], LoadPriority::CURRENT);
        assert_eq!(priorities[1], LoadPriority::PREFETCH);
        assert_eq!(priorities[2], LoadPriority::BACKGROUND);
    }
}
