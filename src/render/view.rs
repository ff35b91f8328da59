//! Render-resident view: per-submission snapshot of frame buffers
//!
//! Once per render submission the builder resolves the target frame
//! against the pool. A hit pins the entry and snapshots its buffer
//! handles; a miss keeps the previous snapshot (stale but valid, instead
//! of a visible pop to empty). Pins release only after the submission
//! that referenced them has been consumed by the GPU, reported through
//! fence epochs, so a buffer never disappears mid-draw.

use std::collections::VecDeque;
use std::sync::Arc;

use glam::{Mat4, Vec3};

use crate::streaming::buffer::{FrameKey, GridBuffer, GridRole};
use crate::streaming::pool::{ResidentFrame, StreamingPool};

/// Immutable per-submission snapshot of resolved grid buffers
///
/// Roles absent from the asset (or not yet loaded) are `None`; the
/// renderer binds a null descriptor for them. Never mutated after
/// construction; superseded by the next snapshot.
#[derive(Clone)]
pub struct ResidentView {
    pub density: Option<GridBuffer>,
    pub temperature: Option<GridBuffer>,
    pub velocity: Option<GridBuffer>,
    pub color: Option<GridBuffer>,
    /// Index-space minimum of the principal (density) grid
    pub index_min: Vec3,
    /// Index-space extent of the principal grid
    pub index_size: Vec3,
    pub index_to_local: Mat4,
    /// Frame the snapshot was resolved from
    pub frame: u32,
}

impl ResidentView {
    /// A view with no resident data (sequence not yet buffered)
    pub fn empty() -> Self {
        Self {
            density: None,
            temperature: None,
            velocity: None,
            color: None,
            index_min: Vec3::ZERO,
            index_size: Vec3::ZERO,
            index_to_local: Mat4::IDENTITY,
            frame: 0,
        }
    }

    /// Snapshot a `Ready` pool entry
    pub fn from_frame(frame: &ResidentFrame) -> Self {
        let principal = GridRole::ALL
            .into_iter()
            .find_map(|role| frame.buffer(role));

        let (index_min, index_size, index_to_local) = principal.map_or(
            (Vec3::ZERO, Vec3::ZERO, Mat4::IDENTITY),
            |buffer| {
                (
                    buffer.index_min.as_vec3(),
                    buffer.index_size.as_vec3(),
                    buffer.index_to_local,
                )
            },
        );

        Self {
            density: frame.buffer(GridRole::Density).cloned(),
            temperature: frame.buffer(GridRole::Temperature).cloned(),
            velocity: frame.buffer(GridRole::Velocity).cloned(),
            color: frame.buffer(GridRole::Color).cloned(),
            index_min,
            index_size,
            index_to_local,
            frame: frame.key.frame,
        }
    }

    pub fn buffer(&self, role: GridRole) -> Option<&GridBuffer> {
        match role {
            GridRole::Density => self.density.as_ref(),
            GridRole::Temperature => self.temperature.as_ref(),
            GridRole::Velocity => self.velocity.as_ref(),
            GridRole::Color => self.color.as_ref(),
        }
    }

    /// True when at least one role resolved to a buffer
    pub fn has_data(&self) -> bool {
        self.density.is_some()
            || self.temperature.is_some()
            || self.velocity.is_some()
            || self.color.is_some()
    }
}

/// Builds one [`ResidentView`] per render submission
///
/// Tracks which pool entry backs the current view and holds its pin.
/// Superseded pins move to a deferred list tagged with the last submission
/// epoch that referenced them; [`retire`](Self::retire) releases them once
/// the rendering backend reports that epoch's GPU work complete.
pub struct ViewBuilder {
    pool: Arc<StreamingPool>,
    current: ResidentView,
    /// Pin backing `current`, if any
    pinned: Option<FrameKey>,
    /// Submission counter; incremented per build
    epoch: u64,
    /// Superseded pins awaiting their fence: (last epoch referencing, key)
    deferred: VecDeque<(u64, FrameKey)>,
}

impl ViewBuilder {
    pub fn new(pool: Arc<StreamingPool>) -> Self {
        Self {
            pool,
            current: ResidentView::empty(),
            pinned: None,
            epoch: 0,
            deferred: VecDeque::new(),
        }
    }

    /// Resolve the view for the next submission
    ///
    /// Never blocks: a miss returns the previous view unchanged and pins
    /// nothing new.
    pub fn build(&mut self, target: FrameKey) -> ResidentView {
        self.epoch += 1;

        if self.pinned == Some(target) {
            return self.current.clone();
        }

        match self.pool.pin(target) {
            Some(frame) => {
                if let Some(previous) = self.pinned.take() {
                    // Submissions up to epoch-1 may still reference it
                    self.deferred.push_back((self.epoch - 1, previous));
                }
                self.pinned = Some(target);
                self.current = ResidentView::from_frame(&frame);
                self.current.clone()
            }
            None => self.current.clone(),
        }
    }

    /// Report that the GPU consumed all submissions up to `epoch`,
    /// releasing the pins they were holding
    pub fn retire(&mut self, epoch: u64) {
        while let Some(&(fence_epoch, key)) = self.deferred.front() {
            if fence_epoch > epoch {
                break;
            }
            self.deferred.pop_front();
            self.pool.unpin(key);
        }
    }

    /// Epoch assigned to the most recent build
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn current(&self) -> &ResidentView {
        &self.current
    }

    /// Number of superseded pins still awaiting their fence
    pub fn deferred_pins(&self) -> usize {
        self.deferred.len()
    }

    /// Drop every pin and forget the current view (sequence teardown)
    pub fn reset(&mut self) {
        for (_, key) in self.deferred.drain(..) {
            self.pool.unpin(key);
        }
        if let Some(key) = self.pinned.take() {
            self.pool.unpin(key);
        }
        self.current = ResidentView::empty();
    }
}

impl Drop for ViewBuilder {
    fn drop(&mut self) {
        self.reset();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::descriptor::SequenceId;
    use crate::asset::source::DecodedGrid;
    use glam::IVec3;

    fn grids(frame: u32, bytes: usize) -> Vec<DecodedGrid> {
        vec![DecodedGrid {
            role: GridRole::Density,
            index_min: IVec3::new(-8, 0, -8),
            index_size: IVec3::new(16, 32, 16),
            index_to_local: Mat4::from_scale(Vec3::splat(0.5)),
            bytes: vec![frame as u8; bytes],
        }]
    }

    fn pool_with_frames(budget: usize, id: SequenceId, frames: &[u32]) -> Arc<StreamingPool> {
        let pool = Arc::new(StreamingPool::new(budget));
        for &frame in frames {
            let key = FrameKey::new(id, frame);
            pool.request_frame(key);
            pool.on_load_completed(key, grids(frame, 100));
        }
        pool
    }

    #[test]
    fn test_build_hit_pins_and_snapshots() {
        let id = SequenceId::next();
        let pool = pool_with_frames(1024, id, &[0]);
        let mut builder = ViewBuilder::new(pool.clone());

        let view = builder.build(FrameKey::new(id, 0));
        assert!(view.has_data());
        assert_eq!(view.frame, 0);
        assert_eq!(view.index_min, Vec3::new(-8.0, 0.0, -8.0));
        assert_eq!(view.index_size, Vec3::new(16.0, 32.0, 16.0));
        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 1);
    }

    #[test]
    fn test_build_miss_returns_stale_view() {
        let id = SequenceId::next();
        let pool = pool_with_frames(1024, id, &[0]);
        let mut builder = ViewBuilder::new(pool.clone());

        let first = builder.build(FrameKey::new(id, 0));
        assert_eq!(first.frame, 0);

        // Frame 1 was never loaded: the previous view survives
        let stale = builder.build(FrameKey::new(id, 1));
        assert_eq!(stale.frame, 0);
        assert!(stale.has_data());
        assert_eq!(pool.pin_count(FrameKey::new(id, 1)), 0);
        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 1);
    }

    #[test]
    fn test_build_before_any_data_is_empty() {
        let id = SequenceId::next();
        let pool = Arc::new(StreamingPool::new(1024));
        let mut builder = ViewBuilder::new(pool);

        let view = builder.build(FrameKey::new(id, 0));
        assert!(!view.has_data());
        assert_eq!(view.index_to_local, Mat4::IDENTITY);
    }

    #[test]
    fn test_same_frame_rebuild_does_not_double_pin() {
        let id = SequenceId::next();
        let pool = pool_with_frames(1024, id, &[0]);
        let mut builder = ViewBuilder::new(pool.clone());

        builder.build(FrameKey::new(id, 0));
        builder.build(FrameKey::new(id, 0));
        builder.build(FrameKey::new(id, 0));

        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 1);
        assert_eq!(builder.deferred_pins(), 0);
    }

    #[test]
    fn test_superseded_pin_released_on_retire() {
        let id = SequenceId::next();
        let pool = pool_with_frames(1024, id, &[0, 1]);
        let mut builder = ViewBuilder::new(pool.clone());

        builder.build(FrameKey::new(id, 0)); // epoch 1
        builder.build(FrameKey::new(id, 1)); // epoch 2, frame 0 deferred

        // Frame 0 still pinned: epoch 1's draws may reference it
        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 1);
        assert_eq!(pool.pin_count(FrameKey::new(id, 1)), 1);
        assert_eq!(builder.deferred_pins(), 1);

        // GPU reports epoch 1 consumed
        builder.retire(1);
        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 0);
        assert_eq!(pool.pin_count(FrameKey::new(id, 1)), 1);
        assert_eq!(builder.deferred_pins(), 0);
    }

    #[test]
    fn test_retire_respects_epoch_order() {
        let id = SequenceId::next();
        let pool = pool_with_frames(1024, id, &[0, 1, 2]);
        let mut builder = ViewBuilder::new(pool.clone());

        builder.build(FrameKey::new(id, 0)); // epoch 1
        builder.build(FrameKey::new(id, 1)); // epoch 2
        builder.build(FrameKey::new(id, 2)); // epoch 3
        assert_eq!(builder.deferred_pins(), 2);

        // Epoch 0: nothing retires yet
        builder.retire(0);
        assert_eq!(builder.deferred_pins(), 2);

        builder.retire(2);
        assert_eq!(builder.deferred_pins(), 0);
        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 0);
        assert_eq!(pool.pin_count(FrameKey::new(id, 1)), 0);
        assert_eq!(pool.pin_count(FrameKey::new(id, 2)), 1);
    }

    #[test]
    fn test_reset_releases_all_pins() {
        let id = SequenceId::next();
        let pool = pool_with_frames(1024, id, &[0, 1]);
        let mut builder = ViewBuilder::new(pool.clone());

        builder.build(FrameKey::new(id, 0));
        builder.build(FrameKey::new(id, 1));
        builder.reset();

        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 0);
        assert_eq!(pool.pin_count(FrameKey::new(id, 1)), 0);
        assert!(!builder.current().has_data());
    }

    #[test]
    fn test_drop_releases_pins() {
        let id = SequenceId::next();
        let pool = pool_with_frames(1024, id, &[0]);
        {
            let mut builder = ViewBuilder::new(pool.clone());
            builder.build(FrameKey::new(id, 0));
            assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 1);
        }
        assert_eq!(pool.pin_count(FrameKey::new(id, 0)), 0);
    }
}
