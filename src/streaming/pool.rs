//! Streaming pool: bounded cache of frame-resident grid buffers
//!
//! The pool is the only owner of decoded [`GridBuffer`] payloads. The game
//! thread requests frames and loader workers publish decode results, while
//! the render thread pins entries for as long as draw commands reference
//! them. All entry state, the LRU ordering and the byte budget live behind
//! one mutex; few entries change state per frame so contention stays low.
//! Payload bytes are immutable once published, so snapshots taken under the
//! lock can be read afterwards without it.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::Mutex;

use crate::asset::descriptor::SequenceId;
use crate::asset::source::DecodedGrid;
use crate::core::error::Error;
use crate::core::Result;
use crate::streaming::budget::MemoryBudget;
use crate::streaming::buffer::{FrameKey, GpuUploader, GridBuffer, GridRole};

/// Streaming configuration shared by the pool and its owner
#[derive(Clone, Debug)]
pub struct StreamingConfig {
    /// Byte ceiling for resident frame buffers (CPU + GPU)
    pub budget_bytes: usize,
    /// How many frames past the playhead to prefetch each tick
    pub prefetch_frames: u32,
    /// Maximum concurrent decode jobs
    pub max_concurrent_loads: usize,
}

impl Default for StreamingConfig {
    fn default() -> Self {
        Self {
            budget_bytes: 512 * 1024 * 1024,
            prefetch_frames: 2,
            max_concurrent_loads: 4,
        }
    }
}

/// Load state of a pool entry
///
/// Transitions are monotonic per frame: `Empty -> Loading -> Ready`, or
/// `Loading -> Empty { failed: true }` on decode failure. A `Ready` entry
/// never regresses to `Loading`; a re-request only refreshes recency.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EntryState {
    /// No payload resident. `failed` marks the last attempt as failed so
    /// callers can tell "failed, retryable" from "never requested".
    Empty { failed: bool },
    /// A decode job is in flight
    Loading,
    /// Buffers resident and readable
    Ready,
    /// Being freed; transient within eviction
    Evicting,
}

/// One cached frame: per-role buffers plus bookkeeping
struct PoolEntry {
    state: EntryState,
    buffers: [Option<GridBuffer>; GridRole::COUNT],
    /// Monotonic touch stamp for LRU ranking
    last_touch: u64,
    /// Active render-thread reservations; never evicted while > 0
    pin_count: u32,
    /// Cached byte total across buffers
    bytes: usize,
}

impl PoolEntry {
    fn new(state: EntryState, touch: u64) -> Self {
        Self {
            state,
            buffers: Default::default(),
            last_touch: touch,
            pin_count: 0,
            bytes: 0,
        }
    }
}

/// Read-only snapshot of a `Ready` entry
///
/// Buffers are cheap clones sharing the payload; the snapshot stays valid
/// after the entry is evicted.
#[derive(Clone)]
pub struct ResidentFrame {
    pub key: FrameKey,
    buffers: [Option<GridBuffer>; GridRole::COUNT],
}

impl ResidentFrame {
    pub fn buffer(&self, role: GridRole) -> Option<&GridBuffer> {
        self.buffers[role.index()].as_ref()
    }

    pub fn total_size(&self) -> usize {
        self.buffers
            .iter()
            .flatten()
            .map(|buffer| buffer.total_size())
            .sum()
    }
}

/// Counters exposed for diagnostics overlays and tests
#[derive(Clone, Copy, Debug, Default)]
pub struct PoolStats {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub evictions: u64,
}

struct PoolInner {
    entries: HashMap<FrameKey, PoolEntry>,
    budget: MemoryBudget,
    touch_counter: u64,
    stats: PoolStats,
}

impl PoolInner {
    /// Evict least-recently-used unpinned `Ready` entries until the pool is
    /// back under budget. `Loading` entries and pinned entries are never
    /// candidates, so pinned frames can keep the pool over budget.
    fn evict_over_budget(&mut self) {
        while self.budget.over_budget() {
            let candidate = self
                .entries
                .iter()
                .filter(|(_, e)| e.state == EntryState::Ready && e.pin_count == 0)
                .min_by_key(|(_, e)| e.last_touch)
                .map(|(key, _)| *key);

            let Some(key) = candidate else {
                log::debug!(
                    "pool over budget ({} / {} bytes) with no evictable entries",
                    self.budget.used(),
                    self.budget.budget()
                );
                break;
            };

            if let Some(entry) = self.entries.get_mut(&key) {
                entry.state = EntryState::Evicting;
            }
            if let Some(entry) = self.entries.remove(&key) {
                self.budget.remove(entry.bytes);
                self.stats.evictions += 1;
                log::trace!(
                    "evicted frame {} of sequence {:?} ({} bytes)",
                    key.frame,
                    key.sequence,
                    entry.bytes
                );
            }
        }
    }
}

/// Bounded cache of decoded frames with async-load coalescing
pub struct StreamingPool {
    inner: Mutex<PoolInner>,
}

impl StreamingPool {
    pub fn new(budget_bytes: usize) -> Self {
        log::info!(
            "created streaming pool with {} MB budget",
            budget_bytes / 1024 / 1024
        );
        Self {
            inner: Mutex::new(PoolInner {
                entries: HashMap::new(),
                budget: MemoryBudget::new(budget_bytes),
                touch_counter: 0,
                stats: PoolStats::default(),
            }),
        }
    }

    /// Mark intent to use a frame
    ///
    /// Returns `true` when the caller must enqueue a decode job for the
    /// frame: the entry was absent or left over from a failed load, and
    /// has now transitioned to `Loading`. Returns `false` when the frame
    /// is already `Loading` or `Ready`; only its recency is refreshed, so
    /// at most one decode is ever in flight per frame.
    pub fn request_frame(&self, key: FrameKey) -> bool {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.stats.requests += 1;
        inner.touch_counter += 1;
        let stamp = inner.touch_counter;

        match inner.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                let entry = occupied.get_mut();
                entry.last_touch = stamp;
                match entry.state {
                    EntryState::Loading | EntryState::Ready => false,
                    // Failed entries are retried on the next request
                    EntryState::Empty { .. } | EntryState::Evicting => {
                        entry.state = EntryState::Loading;
                        true
                    }
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(PoolEntry::new(EntryState::Loading, stamp));
                true
            }
        }
    }

    /// Non-blocking lookup; returns a snapshot only when `Ready`
    ///
    /// Never blocks beyond the state lock: on a miss the caller falls back
    /// to the last good frame instead of waiting.
    pub fn try_get(&self, key: FrameKey) -> Option<ResidentFrame> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.touch_counter += 1;
        let stamp = inner.touch_counter;

        match inner.entries.get_mut(&key) {
            Some(entry) if entry.state == EntryState::Ready => {
                entry.last_touch = stamp;
                let snapshot = ResidentFrame {
                    key,
                    buffers: entry.buffers.clone(),
                };
                inner.stats.hits += 1;
                Some(snapshot)
            }
            _ => {
                inner.stats.misses += 1;
                None
            }
        }
    }

    /// Load state of a frame, `Empty { failed: false }` when never seen
    pub fn state(&self, key: FrameKey) -> EntryState {
        let inner = self.inner.lock().unwrap();
        inner
            .entries
            .get(&key)
            .map_or(EntryState::Empty { failed: false }, |entry| entry.state)
    }

    /// Publish a completed decode
    ///
    /// Safe to call from any worker thread. Transitions the entry
    /// `Loading -> Ready` exactly once, installs the buffers, accounts the
    /// bytes and runs eviction if the pool is now over budget. A
    /// completion for a frame the pool no longer tracks (seek raced the
    /// load, or the sequence was purged and re-requested) is installed
    /// anyway; the data stays useful for replay.
    pub fn on_load_completed(&self, key: FrameKey, grids: Vec<DecodedGrid>) {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        inner.touch_counter += 1;
        let stamp = inner.touch_counter;

        let entry = inner
            .entries
            .entry(key)
            .or_insert_with(|| PoolEntry::new(EntryState::Loading, stamp));

        if entry.state == EntryState::Ready {
            // Duplicate completion; the first publish wins
            log::warn!("dropping duplicate load completion for frame {}", key.frame);
            return;
        }

        let mut bytes = 0usize;
        let mut buffers: [Option<GridBuffer>; GridRole::COUNT] = Default::default();
        for decoded in grids {
            let buffer = GridBuffer::from_decoded(decoded);
            bytes += buffer.total_size();
            let role_index = buffer.role.index();
            buffers[role_index] = Some(buffer);
        }

        entry.state = EntryState::Ready;
        entry.buffers = buffers;
        entry.bytes = bytes;
        entry.last_touch = stamp;

        inner.budget.add(bytes);
        inner.stats.loads_completed += 1;
        log::trace!(
            "frame {} of sequence {:?} resident ({} bytes)",
            key.frame,
            key.sequence,
            bytes
        );

        inner.evict_over_budget();
    }

    /// Record a failed decode
    ///
    /// The entry returns to `Empty` with the failed flag set: callers can
    /// distinguish it from "not yet loaded" and keep showing the last good
    /// frame, and the next `request_frame` retries the decode.
    pub fn on_load_failed(&self, key: FrameKey, error: &Error) {
        let mut inner = self.inner.lock().unwrap();
        inner.touch_counter += 1;
        let stamp = inner.touch_counter;

        let entry = inner
            .entries
            .entry(key)
            .or_insert_with(|| PoolEntry::new(EntryState::Loading, stamp));

        if entry.state == EntryState::Ready {
            // A stale failure must not tear down resident buffers
            return;
        }

        entry.state = EntryState::Empty { failed: true };
        entry.buffers = Default::default();
        entry.bytes = 0;
        inner.stats.loads_failed += 1;
        log::warn!("load failed for frame {}: {}", key.frame, error);
    }

    /// Pin a `Ready` frame and snapshot its buffers in one step
    ///
    /// Taken by the render thread for the duration of a submission; a
    /// pinned entry is never evicted, so the returned buffers stay backed
    /// by pool-owned memory until `unpin`. Returns `None` when the frame
    /// is not `Ready` (the caller keeps its previous snapshot).
    pub fn pin(&self, key: FrameKey) -> Option<ResidentFrame> {
        let mut inner = self.inner.lock().unwrap();
        inner.touch_counter += 1;
        let stamp = inner.touch_counter;

        match inner.entries.get_mut(&key) {
            Some(entry) if entry.state == EntryState::Ready => {
                entry.pin_count += 1;
                entry.last_touch = stamp;
                Some(ResidentFrame {
                    key,
                    buffers: entry.buffers.clone(),
                })
            }
            _ => None,
        }
    }

    /// Release one pin taken with [`pin`](Self::pin)
    ///
    /// Runs eviction afterwards: an unpinned entry may be what an
    /// over-budget pool has been waiting for.
    pub fn unpin(&self, key: FrameKey) {
        let mut inner = self.inner.lock().unwrap();
        if let Some(entry) = inner.entries.get_mut(&key) {
            if entry.pin_count == 0 {
                log::warn!("unbalanced unpin for frame {}", key.frame);
                return;
            }
            entry.pin_count -= 1;
        }
        inner.evict_over_budget();
    }

    /// Current pin count of a frame (diagnostics)
    pub fn pin_count(&self, key: FrameKey) -> u32 {
        let inner = self.inner.lock().unwrap();
        inner.entries.get(&key).map_or(0, |entry| entry.pin_count)
    }

    /// Promote `Ready` CPU buffers to GPU residency
    ///
    /// Called from the render side once per frame with the upload backend.
    /// Newly uploaded bytes count against the budget, so eviction runs
    /// after a batch of uploads. Returns the number of buffers uploaded.
    pub fn schedule_uploads(&self, uploader: &dyn GpuUploader) -> Result<u32> {
        let mut guard = self.inner.lock().unwrap();
        let inner = &mut *guard;
        let mut uploaded = 0u32;

        for (key, entry) in inner.entries.iter_mut() {
            if entry.state != EntryState::Ready {
                continue;
            }
            for buffer in entry.buffers.iter_mut().flatten() {
                if buffer.has_gpu() {
                    continue;
                }
                let label = format!("volseq_{}_{}", buffer.role.name(), key.frame);
                // Account each upload as it lands so a failure partway
                // through the batch leaves the budget consistent
                let gpu = uploader.upload(&label, buffer.cpu_bytes())?;
                let size = gpu.byte_size();
                buffer.set_gpu(gpu);
                entry.bytes += size;
                inner.budget.add(size);
                uploaded += 1;
            }
        }

        if uploaded > 0 {
            inner.evict_over_budget();
        }

        Ok(uploaded)
    }

    /// Drop every unpinned entry of a sequence (asset teardown)
    ///
    /// Pinned entries survive until their pins release; in-flight loads for
    /// the sequence will re-insert on completion and age out through LRU.
    pub fn purge_sequence(&self, sequence: SequenceId) {
        let mut inner = self.inner.lock().unwrap();
        let victims: Vec<FrameKey> = inner
            .entries
            .iter()
            .filter(|(key, entry)| key.sequence == sequence && entry.pin_count == 0)
            .map(|(key, _)| *key)
            .collect();

        for key in victims {
            if let Some(entry) = inner.entries.remove(&key) {
                inner.budget.remove(entry.bytes);
            }
        }
    }

    /// Number of tracked entries (all states)
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bytes currently accounted against the budget
    pub fn resident_bytes(&self) -> usize {
        self.inner.lock().unwrap().budget.used()
    }

    pub fn stats(&self) -> PoolStats {
        self.inner.lock().unwrap().stats
    }
}
