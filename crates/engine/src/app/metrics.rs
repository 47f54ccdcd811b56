use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use tracing::warn;

static METRICS_LOCK_POISON_WARNED: AtomicBool = AtomicBool::new(false);

fn warn_metrics_lock_poison_once(operation: &'static str) {
    if METRICS_LOCK_POISON_WARNED
        .compare_exchange(false, true, Ordering::Relaxed, Ordering::Relaxed)
        .is_ok()
    {
        warn!(operation, "metrics lock poisoned; recovered inner value");
    }
}

/// Rates are averaged over the last interval; counts are from the last frame.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct LoopMetricsSnapshot {
    pub fps: f32,
    pub tps: f32,
    pub frame_time_ms: f32,
    pub worst_frame_time_ms: f32,
    /// Sprites and primitives submitted for the last frame.
    pub draw_calls: u32,
    /// Graphics updates taken from simulation snapshots per rendered frame.
    pub updates_per_frame: f32,
    pub rendered_entities: usize,
    pub total_ticks: u64,
}

/// What the renderer knows about one finished frame.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct FrameSample {
    pub(crate) frame_dt: Duration,
    pub(crate) draw_calls: u32,
    pub(crate) updates: usize,
    pub(crate) rendered_entities: usize,
}

/// Shared between the simulation thread, which counts ticks, and the
/// render thread, which folds them into periodic snapshots.
#[derive(Clone, Debug, Default)]
pub struct MetricsHandle {
    snapshot: Arc<RwLock<LoopMetricsSnapshot>>,
    ticks: Arc<AtomicU64>,
}

impl MetricsHandle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_tick(&self) {
        self.ticks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn tick_count(&self) -> u64 {
        self.ticks.load(Ordering::Relaxed)
    }

    pub fn snapshot(&self) -> LoopMetricsSnapshot {
        match self.snapshot.read() {
            Ok(guard) => *guard,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("read");
                *poisoned.into_inner()
            }
        }
    }

    pub(crate) fn publish(&self, snapshot: LoopMetricsSnapshot) {
        match self.snapshot.write() {
            Ok(mut guard) => *guard = snapshot,
            Err(poisoned) => {
                warn_metrics_lock_poison_once("write");
                *poisoned.into_inner() = snapshot;
            }
        }
    }
}

#[derive(Debug)]
pub(crate) struct MetricsAccumulator {
    interval_start: Instant,
    interval: Duration,
    interval_start_ticks: u64,
    frames: u32,
    frame_time_sum: Duration,
    worst_frame_time: Duration,
    updates_sum: usize,
    last: FrameSample,
}

impl MetricsAccumulator {
    pub(crate) fn new(interval: Duration) -> Self {
        Self::starting_at(Instant::now(), interval)
    }

    fn starting_at(interval_start: Instant, interval: Duration) -> Self {
        Self {
            interval_start,
            interval,
            interval_start_ticks: 0,
            frames: 0,
            frame_time_sum: Duration::ZERO,
            worst_frame_time: Duration::ZERO,
            updates_sum: 0,
            last: FrameSample::default(),
        }
    }

    pub(crate) fn record_frame(&mut self, sample: FrameSample) {
        self.frames = self.frames.saturating_add(1);
        self.frame_time_sum = self.frame_time_sum.saturating_add(sample.frame_dt);
        self.worst_frame_time = self.worst_frame_time.max(sample.frame_dt);
        self.updates_sum = self.updates_sum.saturating_add(sample.updates);
        self.last = sample;
    }

    /// `total_ticks` is the simulation's running tick counter.
    pub(crate) fn maybe_snapshot(
        &mut self,
        now: Instant,
        total_ticks: u64,
    ) -> Option<LoopMetricsSnapshot> {
        let elapsed = now.saturating_duration_since(self.interval_start);
        if elapsed < self.interval {
            return None;
        }

        let elapsed_seconds = elapsed.as_secs_f32().max(f32::EPSILON);
        let per_frame = |total: f32| {
            if self.frames == 0 {
                0.0
            } else {
                total / self.frames as f32
            }
        };
        let ticks = total_ticks.saturating_sub(self.interval_start_ticks);
        let snapshot = LoopMetricsSnapshot {
            fps: self.frames as f32 / elapsed_seconds,
            tps: ticks as f32 / elapsed_seconds,
            frame_time_ms: per_frame(self.frame_time_sum.as_secs_f32() * 1000.0),
            worst_frame_time_ms: self.worst_frame_time.as_secs_f32() * 1000.0,
            draw_calls: self.last.draw_calls,
            updates_per_frame: per_frame(self.updates_sum as f32),
            rendered_entities: self.last.rendered_entities,
            total_ticks,
        };

        *self = Self {
            interval_start_ticks: total_ticks,
            last: self.last,
            ..Self::starting_at(now, self.interval)
        };
        Some(snapshot)
    }
}
