//! Async frame loading with priority-ordered concurrent decodes
//!
//! Decode jobs run on the blocking pool of a tokio runtime; the worker loop
//! keeps at most `max_concurrent` decodes in flight and always starts the
//! highest-priority pending request first. Decode errors and panics are
//! converted to [`LoadOutcome::Failed`] at the job boundary; nothing
//! propagates across the worker/pool seam as an unhandled fault.

use std::collections::HashSet;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use tokio::runtime::Runtime;
use tokio::sync::mpsc;

use crate::asset::source::{DecodedGrid, VolumeSource};
use crate::core::error::Error;
use crate::streaming::buffer::FrameKey;
use crate::streaming::priority::LoadPriority;

/// Request to decode one frame at a given priority
#[derive(Debug, Clone, Copy)]
pub struct LoadRequest {
    pub key: FrameKey,
    pub priority: LoadPriority,
}

/// Result of a frame decode job
pub enum LoadOutcome {
    /// Decode succeeded
    Loaded {
        key: FrameKey,
        grids: Vec<DecodedGrid>,
        load_time_ms: f32,
    },
    /// Decode failed; the frame is retryable
    Failed { key: FrameKey, error: Error },
}

impl LoadOutcome {
    pub fn key(&self) -> FrameKey {
        match self {
            LoadOutcome::Loaded { key, .. } => *key,
            LoadOutcome::Failed { key, .. } => *key,
        }
    }
}

/// Configuration for the frame loader
#[derive(Clone, Debug)]
pub struct LoaderConfig {
    /// Maximum number of concurrent decode jobs
    pub max_concurrent: usize,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self { max_concurrent: 4 }
    }
}

/// Concurrent frame loader feeding the streaming pool
pub struct FrameLoader {
    /// Channel for sending load requests to the worker loop
    request_tx: mpsc::UnboundedSender<LoadRequest>,
    /// Channel for receiving decode outcomes
    result_rx: mpsc::UnboundedReceiver<LoadOutcome>,
    /// Frames currently requested but not yet drained
    pending: HashSet<FrameKey>,
    /// Dedicated runtime (None when riding the caller's runtime)
    #[allow(dead_code)]
    runtime: Option<Runtime>,
}

impl FrameLoader {
    /// Create a loader with its own tokio runtime
    pub fn new(source: Arc<dyn VolumeSource>, config: LoaderConfig) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<LoadOutcome>();

        let runtime = Runtime::new().expect("failed to create tokio runtime");
        runtime.spawn(Self::worker_loop(
            source,
            config.max_concurrent,
            request_rx,
            result_tx,
        ));

        Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            runtime: Some(runtime),
        }
    }

    /// Create a loader on the current tokio runtime
    ///
    /// Panics if called outside a runtime context.
    pub fn new_with_current_runtime(source: Arc<dyn VolumeSource>, config: LoaderConfig) -> Self {
        let (request_tx, request_rx) = mpsc::unbounded_channel::<LoadRequest>();
        let (result_tx, result_rx) = mpsc::unbounded_channel::<LoadOutcome>();

        tokio::spawn(Self::worker_loop(
            source,
            config.max_concurrent,
            request_rx,
            result_tx,
        ));

        Self {
            request_tx,
            result_rx,
            pending: HashSet::new(),
            runtime: None,
        }
    }

    /// Worker loop: pulls requests, keeps up to `max_concurrent` decodes in
    /// flight, forwards outcomes
    async fn worker_loop(
        source: Arc<dyn VolumeSource>,
        max_concurrent: usize,
        mut request_rx: mpsc::UnboundedReceiver<LoadRequest>,
        result_tx: mpsc::UnboundedSender<LoadOutcome>,
    ) {
        use tokio::task::JoinSet;

        let mut active: JoinSet<LoadOutcome> = JoinSet::new();
        let mut queued: Vec<LoadRequest> = Vec::new();
        let mut channel_open = true;

        loop {
            tokio::select! {
                request = request_rx.recv(), if channel_open => {
                    match request {
                        Some(request) => queued.push(request),
                        None => channel_open = false,
                    }
                }

                Some(result) = active.join_next(), if !active.is_empty() => {
                    match result {
                        Ok(outcome) => {
                            let _ = result_tx.send(outcome);
                        }
                        Err(e) => {
                            // catch_unwind in the job makes this unreachable
                            // short of task abort at shutdown
                            log::error!("decode task failed to join: {}", e);
                        }
                    }
                }

                else => {
                    if !channel_open && queued.is_empty() && active.is_empty() {
                        break;
                    }
                }
            }

            while active.len() < max_concurrent && !queued.is_empty() {
                queued.sort_by(|a, b| LoadPriority::cmp_desc(&a.priority, &b.priority));
                let request = queued.remove(0);
                let source = source.clone();
                active.spawn_blocking(move || Self::decode_job(&*source, request.key));
            }
        }
    }

    /// Run one decode job, converting errors and panics into outcomes
    fn decode_job(source: &dyn VolumeSource, key: FrameKey) -> LoadOutcome {
        let start = Instant::now();
        let result = std::panic::catch_unwind(AssertUnwindSafe(|| source.decode_chunk(key)));

        match result {
            Ok(Ok(grids)) => LoadOutcome::Loaded {
                key,
                grids,
                load_time_ms: start.elapsed().as_secs_f32() * 1000.0,
            },
            Ok(Err(error)) => {
                log::warn!("decode failed for frame {}: {}", key.frame, error);
                LoadOutcome::Failed { key, error }
            }
            Err(_) => {
                log::error!("decode panicked for frame {}", key.frame);
                LoadOutcome::Failed {
                    key,
                    error: Error::Decode {
                        frame: key.frame,
                        reason: "decode panicked".into(),
                    },
                }
            }
        }
    }

    /// Request a frame decode
    ///
    /// Returns `false` if the frame is already pending, `true` if the
    /// request was queued.
    pub fn request(&mut self, key: FrameKey, priority: LoadPriority) -> bool {
        if self.pending.contains(&key) {
            return false;
        }

        self.pending.insert(key);
        self.request_tx
            .send(LoadRequest { key, priority })
            .expect("loader worker died");

        true
    }

    /// Poll for completed decode outcomes (non-blocking)
    pub fn poll_results(&mut self) -> Vec<LoadOutcome> {
        let mut results = Vec::new();

        while let Ok(outcome) = self.result_rx.try_recv() {
            self.pending.remove(&outcome.key());
            results.push(outcome);
        }

        results
    }

    /// Number of requests not yet drained
    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    /// Check whether a frame is currently pending
    pub fn is_pending(&self, key: FrameKey) -> bool {
        self.pending.contains(&key)
    }
}
