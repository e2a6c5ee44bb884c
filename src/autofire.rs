//! Accelerating autofire
//!
//! While a press is held the scheduler fires shots at an interval that shrinks
//! linearly (in `ramp_step_ms` steps) from `initial_interval_ms` to
//! `final_interval_ms` over `ramp_duration_ms`, then stays at the final rate.
//! Only one shot timer is ever armed. A shot popped slightly late still fires at
//! its scheduled deadline and arms the next one from there, so frame jitter
//! does not bend the schedule. A shot popped more than `max_catch_up_ms` late
//! fires once at the pump time and the schedule restarts from now.

use serde::{Deserialize, Serialize};

use crate::consts::*;
use crate::stage::HookError;
use crate::timing::{DueTimer, TimerId, TimerKind, TimerQueue};

/// Fire-rate tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutofireConfig {
    pub initial_interval_ms: u64,
    pub final_interval_ms: u64,
    pub ramp_duration_ms: u64,
    pub ramp_step_ms: u64,
    pub face_pulse_ms: u64,
    /// Lag past which missed shots are dropped instead of replayed
    pub max_catch_up_ms: u64,
    /// Bullet speed gain per ramp step (0.005 = +0.5%)
    pub speed_gain_per_step: f32,
    pub symbols: Vec<char>,
}

impl Default for AutofireConfig {
    fn default() -> Self {
        Self {
            initial_interval_ms: INITIAL_AUTOFIRE_INTERVAL_MS,
            final_interval_ms: FINAL_AUTOFIRE_INTERVAL_MS,
            ramp_duration_ms: ACCELERATION_DURATION_MS,
            ramp_step_ms: ACCELERATION_STEP_MS,
            face_pulse_ms: FACE_PULSE_MS,
            max_catch_up_ms: MAX_AUTOFIRE_CATCH_UP_MS,
            speed_gain_per_step: BULLET_SPEED_GAIN_PER_STEP,
            symbols: AUTOFIRE_SEQUENCE.to_vec(),
        }
    }
}

impl AutofireConfig {
    /// Elapsed time rounded down to a whole ramp step, capped at the ramp end
    fn ramp_progress(&self, elapsed_ms: u64) -> u64 {
        let elapsed = elapsed_ms.min(self.ramp_duration_ms);
        let step = self.ramp_step_ms.max(1);
        elapsed - elapsed % step
    }

    /// Delay until the next shot, `elapsed_ms` into a press
    pub fn interval_at(&self, elapsed_ms: u64) -> u64 {
        let initial = self.initial_interval_ms.max(self.final_interval_ms);
        let last = self.final_interval_ms.max(1);
        if elapsed_ms >= self.ramp_duration_ms {
            return last;
        }
        let progress = self.ramp_progress(elapsed_ms);
        let drop = (initial - self.final_interval_ms) * progress / self.ramp_duration_ms.max(1);
        (initial - drop).max(last)
    }

    /// Bullet speed multiplier, `elapsed_ms` into a press
    pub fn speed_multiplier_at(&self, elapsed_ms: u64) -> f32 {
        let step = self.ramp_step_ms.max(1);
        let steps = self.ramp_progress(elapsed_ms) / step;
        1.0 + steps as f32 * self.speed_gain_per_step
    }

    /// Symbol for the n-th shot of the page
    pub fn symbol_at(&self, sequence_index: u64) -> char {
        if self.symbols.is_empty() {
            return AUTOFIRE_SEQUENCE[0];
        }
        self.symbols[(sequence_index % self.symbols.len() as u64) as usize]
    }
}

/// One shot
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FireEvent {
    /// Page-wide shot counter, drives the symbol cycle
    pub sequence_index: u64,
    pub emitted_at_ms: u64,
    /// Time since the press started
    pub elapsed_ms: u64,
    pub symbol: char,
    pub speed_multiplier: f32,
}

/// Side effects of a shot, injected by the page
///
/// Each effect fails independently; the scheduler logs failures and moves on.
/// Effects that need a follow-up (face revert, bullet expiry, counter flush)
/// arm it on the queue they are handed.
pub trait FireSink {
    fn face_pulse(
        &mut self,
        now_ms: u64,
        pulse_ms: u64,
        timers: &mut TimerQueue,
    ) -> Result<(), HookError>;
    fn play_sound(&mut self) -> Result<(), HookError>;
    fn spawn_bullet(&mut self, shot: &FireEvent, timers: &mut TimerQueue) -> Result<(), HookError>;
    fn record_increment(
        &mut self,
        now_ms: u64,
        amount: i64,
        timers: &mut TimerQueue,
    ) -> Result<(), HookError>;
}

#[derive(Debug, Clone, Copy)]
struct ActiveFire {
    started_at_ms: u64,
    shots: u64,
}

#[derive(Debug)]
pub struct AutofireScheduler {
    config: AutofireConfig,
    active: Option<ActiveFire>,
    next_shot: Option<TimerId>,
    next_sequence: u64,
}

impl AutofireScheduler {
    pub fn new(config: AutofireConfig) -> Self {
        Self {
            config,
            active: None,
            next_shot: None,
            next_sequence: 0,
        }
    }

    pub fn config(&self) -> &AutofireConfig {
        &self.config
    }

    pub fn is_firing(&self) -> bool {
        self.active.is_some()
    }

    /// Begin firing: one shot right away, next one armed. No-op while firing.
    pub fn start(
        &mut self,
        now_ms: u64,
        timers: &mut TimerQueue,
        sink: &mut dyn FireSink,
    ) -> Option<FireEvent> {
        if self.active.is_some() {
            return None;
        }
        log::info!("Starting accelerated autofire");
        self.active = Some(ActiveFire {
            started_at_ms: now_ms,
            shots: 0,
        });
        self.fire(now_ms, timers, sink)
    }

    /// Stop firing and forget the ramp. In-flight effects are left alone.
    pub fn stop(&mut self, timers: &mut TimerQueue) -> bool {
        if let Some(id) = self.next_shot.take() {
            timers.cancel(id);
        }
        match self.active.take() {
            Some(active) => {
                log::info!("Stopping autofire after {} shots", active.shots);
                true
            }
            None => false,
        }
    }

    /// Handle an `AutofireShot` timer popped at `now_ms`. Stale timers are ignored.
    pub fn on_timer(
        &mut self,
        due: DueTimer,
        now_ms: u64,
        timers: &mut TimerQueue,
        sink: &mut dyn FireSink,
    ) -> Option<FireEvent> {
        if self.next_shot != Some(due.id) {
            return None;
        }
        self.next_shot = None;
        let lag_ms = now_ms.saturating_sub(due.deadline_ms);
        let at_ms = if lag_ms > self.config.max_catch_up_ms {
            log::info!("Autofire resumed {lag_ms}ms late, dropping missed shots");
            now_ms
        } else {
            due.deadline_ms
        };
        self.fire(at_ms, timers, sink)
    }

    fn fire(
        &mut self,
        at_ms: u64,
        timers: &mut TimerQueue,
        sink: &mut dyn FireSink,
    ) -> Option<FireEvent> {
        let active = self.active.as_mut()?;
        let elapsed_ms = at_ms.saturating_sub(active.started_at_ms);
        active.shots += 1;

        let shot = FireEvent {
            sequence_index: self.next_sequence,
            emitted_at_ms: at_ms,
            elapsed_ms,
            symbol: self.config.symbol_at(self.next_sequence),
            speed_multiplier: self.config.speed_multiplier_at(elapsed_ms),
        };
        self.next_sequence += 1;
        log::debug!("Autofire shot {} ({}) at +{}ms", shot.sequence_index, shot.symbol, elapsed_ms);

        if let Err(e) = sink.face_pulse(at_ms, self.config.face_pulse_ms, timers) {
            log::warn!("Face pulse failed: {e}");
        }
        if let Err(e) = sink.play_sound() {
            log::warn!("Sound failed: {e}");
        }
        if let Err(e) = sink.spawn_bullet(&shot, timers) {
            log::warn!("Bullet spawn failed: {e}");
        }
        if let Err(e) = sink.record_increment(at_ms, 1, timers) {
            log::warn!("Counter increment failed: {e}");
        }

        let next_at = at_ms + self.config.interval_at(elapsed_ms);
        self.next_shot = Some(timers.schedule(next_at, TimerKind::AutofireShot));
        Some(shot)
    }
}
