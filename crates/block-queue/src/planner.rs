//! Turns observations of block sizes into a ring-capacity recommendation
//! that keeps `capacity * ema ~= max_queue_bytes`, while resisting thrash
//! via thresholds and a cooldown (spec §4.1).

use crate::invariants::debug_assert_ema_clamped;
use ingest_types::PlannerConfig;
use std::time::Instant;

/// Inputs to [`CapacityPlanner::should_resize`], gathered from the queue's
/// current state.
#[derive(Debug, Clone, Copy)]
pub struct ResizeInputs {
    pub max_queue_bytes: u64,
    pub current_capacity: usize,
    pub current_count: usize,
}

/// The planner's recommendation: whether to resize, and to what size.
/// `target_slots` is only meaningful when `need` is `true`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResizeDecision {
    pub need: bool,
    pub target_slots: usize,
}

/// A single EMA of observed block sizes, plus resize-thrash resistance.
///
/// `observe` and `desired_slots` are pure; `should_resize`/`mark_resized`
/// take an explicit `now: Instant` so the cooldown logic is deterministic
/// under test without depending on a real clock.
#[derive(Debug, Clone)]
pub struct CapacityPlanner {
    config: PlannerConfig,
    ema: f64,
    last_resize_at: Option<Instant>,
}

impl CapacityPlanner {
    /// Creates a planner seeded with an initial average block size.
    pub fn new(config: PlannerConfig, initial_avg_bytes: u64) -> Self {
        let ema = (initial_avg_bytes as f64).clamp(config.min_avg_bytes as f64, config.max_avg_bytes as f64);
        Self {
            config,
            ema,
            last_resize_at: None,
        }
    }

    /// The current smoothed average block size, in bytes.
    pub fn ema(&self) -> f64 {
        self.ema
    }

    /// Folds one more sample into the EMA.
    ///
    /// The sample is clamped to `[1, 4 * max_avg_bytes]` before blending, so
    /// a single pathological block can't blow the average out in one step;
    /// the result is then clamped to `[min_avg_bytes, max_avg_bytes]`.
    pub fn observe(&mut self, sample_bytes: u64) {
        let clamped_sample = (sample_bytes as f64).clamp(1.0, 4.0 * self.config.max_avg_bytes as f64);
        self.ema = self.config.alpha * clamped_sample + (1.0 - self.config.alpha) * self.ema;
        self.ema = self.ema.clamp(self.config.min_avg_bytes as f64, self.config.max_avg_bytes as f64);

        debug_assert_ema_clamped!(self.ema, self.config.min_avg_bytes as f64, self.config.max_avg_bytes as f64);
    }

    /// The ring capacity that would keep `capacity * ema ~= max_queue_bytes`.
    pub fn desired_slots(&self, max_queue_bytes: u64) -> usize {
        let raw = (max_queue_bytes as f64 / self.ema.max(1.0)).floor() as i64;
        raw.clamp(self.config.min_slots as i64, self.config.max_slots as i64) as usize
    }

    /// Whether the ring should be resized, and to what size.
    ///
    /// Returns `need = false` inside the cooldown window. Outside it, grows
    /// when `desired` overshoots `current_capacity` by more than
    /// `grow_threshold`, shrinks when it undershoots by more than
    /// `shrink_threshold` (but never below current occupancy), and otherwise
    /// leaves capacity alone.
    pub fn should_resize(&self, now: Instant, inputs: ResizeInputs) -> ResizeDecision {
        if let Some(last) = self.last_resize_at {
            let elapsed_ms = now.saturating_duration_since(last).as_millis() as u64;
            if elapsed_ms < self.config.resize_cooldown_ms {
                return ResizeDecision {
                    need: false,
                    target_slots: inputs.current_capacity,
                };
            }
        }

        let desired = self.desired_slots(inputs.max_queue_bytes);
        let current = inputs.current_capacity;

        let grow_ceiling = (current as f64 * (1.0 + self.config.grow_threshold)).floor() as usize;
        let needs_grow = desired > grow_ceiling;

        let shrink_floor = (current as f64 * (1.0 - self.config.shrink_threshold)).ceil() as usize;
        let needs_shrink = desired < shrink_floor && desired >= inputs.current_count;

        if !needs_grow && !needs_shrink {
            return ResizeDecision {
                need: false,
                target_slots: current,
            };
        }

        ResizeDecision {
            need: true,
            target_slots: desired.max(inputs.current_count),
        }
    }

    /// Records that a resize just happened, resetting the cooldown clock.
    pub fn mark_resized(&mut self, now: Instant) {
        self.last_resize_at = Some(now);
    }
}
