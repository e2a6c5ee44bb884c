//! Optimistic counter reconciliation
//!
//! The local value moves immediately on every shot. Increments are queued and
//! flushed as one batch per debounce window, the remote value is polled on a
//! short period, and every remote answer is merged with `max` so the shown
//! value never goes backward no matter what order the answers arrive in.
//!
//! The reconciler does no I/O itself. Requests pile up in an outbox the driver
//! drains with [`CounterReconciler::take_requests`]; results come back through
//! [`CounterReconciler::complete`].

use std::collections::VecDeque;

use super::CounterConfig;
use super::store::StoreError;
use crate::stage::{CounterDisplay, CounterView};
use crate::timing::{DueTimer, TimerId, TimerKind, TimerQueue};

/// Sync lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    /// Not mounted yet
    #[default]
    Uninitialized,
    /// A remote answer is pending
    Syncing,
    /// Last remote answer was a success
    Synced,
    /// Last remote answer was a failure, or there is no store
    Offline,
}

/// Work the reconciler wants done against the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteRequest {
    /// Initial read on mount
    Load,
    /// Periodic read
    Poll,
    Increment,
    IncrementBy(i64),
}

impl RemoteRequest {
    pub fn is_read(&self) -> bool {
        matches!(self, RemoteRequest::Load | RemoteRequest::Poll)
    }
}

/// Outcome of a `RemoteRequest`
#[derive(Debug)]
pub struct RemoteCompletion {
    pub request: RemoteRequest,
    /// Counter value the store reported
    pub result: Result<i64, StoreError>,
}

/// Combine two observations of the counter
pub fn merge_counts(a: i64, b: i64) -> i64 {
    a.max(b)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CounterState {
    /// Optimistic value, never below `last_known_remote`
    pub local_value: i64,
    pub last_known_remote: Option<i64>,
    /// Increments not flushed yet
    pub pending: VecDeque<i64>,
    pub offline: bool,
    pub phase: SyncPhase,
}

#[derive(Debug)]
pub struct CounterReconciler {
    config: CounterConfig,
    remote_enabled: bool,
    state: CounterState,
    /// Set once the first load resolved either way
    loaded: bool,
    read_in_flight: bool,
    flush_in_flight: bool,
    last_read_at_ms: Option<u64>,
    flush_timer: Option<TimerId>,
    poll_timer: Option<TimerId>,
    pulse_timer: Option<TimerId>,
    outbox: Vec<RemoteRequest>,
    shown: Option<CounterDisplay>,
}

impl CounterReconciler {
    pub fn new(config: CounterConfig, remote_enabled: bool) -> Self {
        Self {
            state: CounterState {
                local_value: config.offline_floor,
                last_known_remote: None,
                pending: VecDeque::new(),
                offline: false,
                phase: SyncPhase::Uninitialized,
            },
            config,
            remote_enabled,
            loaded: false,
            read_in_flight: false,
            flush_in_flight: false,
            last_read_at_ms: None,
            flush_timer: None,
            poll_timer: None,
            pulse_timer: None,
            outbox: Vec::new(),
            shown: None,
        }
    }

    pub fn config(&self) -> &CounterConfig {
        &self.config
    }

    pub fn state(&self) -> &CounterState {
        &self.state
    }

    pub fn phase(&self) -> SyncPhase {
        self.state.phase
    }

    pub fn is_offline(&self) -> bool {
        self.state.offline
    }

    pub fn is_loaded(&self) -> bool {
        self.loaded
    }

    pub fn remote_enabled(&self) -> bool {
        self.remote_enabled
    }

    /// Value the widget should show, `None` while loading
    pub fn displayed(&self) -> Option<i64> {
        self.loaded.then_some(self.state.local_value)
    }

    pub fn display(&self) -> CounterDisplay {
        CounterDisplay {
            value: self.displayed(),
            offline: self.state.offline,
        }
    }

    /// Requests queued since the last call
    pub fn take_requests(&mut self) -> Vec<RemoteRequest> {
        std::mem::take(&mut self.outbox)
    }

    /// Start syncing. Without a store the counter goes straight to offline mode.
    pub fn mount(&mut self, now_ms: u64, timers: &mut TimerQueue, view: &mut dyn CounterView) {
        if self.state.phase != SyncPhase::Uninitialized {
            return;
        }
        if self.remote_enabled {
            log::info!("Loading counter");
            self.state.phase = SyncPhase::Syncing;
            self.read_in_flight = true;
            self.last_read_at_ms = Some(now_ms);
            self.outbox.push(RemoteRequest::Load);
            let next_poll = now_ms + self.config.poll_interval_ms.max(1);
            self.poll_timer = Some(timers.schedule(next_poll, TimerKind::CounterPoll));
        } else {
            log::warn!("Counter store not configured, counting locally");
            self.state.phase = SyncPhase::Offline;
            self.state.offline = true;
            self.state.local_value = merge_counts(self.state.local_value, self.config.offline_floor);
            self.loaded = true;
        }
        self.notify(view);
    }

    /// Count `amount` shots. Dropped until the first load resolved.
    pub fn record_increment(
        &mut self,
        now_ms: u64,
        amount: i64,
        timers: &mut TimerQueue,
        view: &mut dyn CounterView,
    ) -> bool {
        if !self.loaded {
            log::debug!("Counter not loaded yet, dropping increment");
            return false;
        }
        if amount <= 0 {
            return false;
        }

        self.state.local_value = self.state.local_value.saturating_add(amount);
        self.state.pending.push_back(amount);

        match self.pulse_timer.take() {
            Some(id) => {
                timers.cancel(id);
            }
            None => {
                if let Err(e) = view.counter_pulse(true) {
                    log::warn!("Counter pulse failed: {e}");
                }
            }
        }
        let pulse_end = now_ms + self.config.pulse_ms;
        self.pulse_timer = Some(timers.schedule(pulse_end, TimerKind::CounterPulseEnd));

        if self.flush_timer.is_none() {
            let flush_at = now_ms + self.config.flush_debounce_ms;
            self.flush_timer = Some(timers.schedule(flush_at, TimerKind::CounterFlush));
        }

        self.notify(view);
        true
    }

    /// Handle a counter timer. Returns false for timers it does not own.
    pub fn on_timer(
        &mut self,
        due: DueTimer,
        timers: &mut TimerQueue,
        view: &mut dyn CounterView,
    ) -> bool {
        match due.kind {
            TimerKind::CounterFlush if self.flush_timer == Some(due.id) => {
                self.flush_timer = None;
                self.flush(due.deadline_ms, timers);
                true
            }
            TimerKind::CounterPoll if self.poll_timer == Some(due.id) => {
                let next_poll = due.deadline_ms + self.config.poll_interval_ms.max(1);
                self.poll_timer = Some(timers.schedule(next_poll, TimerKind::CounterPoll));
                self.request_read(due.deadline_ms, false);
                true
            }
            TimerKind::CounterPulseEnd if self.pulse_timer == Some(due.id) => {
                self.pulse_timer = None;
                if let Err(e) = view.counter_pulse(false) {
                    log::warn!("Counter pulse failed: {e}");
                }
                true
            }
            _ => false,
        }
    }

    /// Send the queued batch as one request
    fn flush(&mut self, now_ms: u64, timers: &mut TimerQueue) {
        if self.flush_in_flight {
            log::debug!("Previous flush still in flight, deferring");
            let retry_at = now_ms + self.config.flush_debounce_ms;
            self.flush_timer = Some(timers.schedule(retry_at, TimerKind::CounterFlush));
            return;
        }

        let sum = self.state.pending.drain(..).fold(0i64, i64::saturating_add);
        if sum <= 0 {
            return;
        }
        if !self.remote_enabled {
            log::debug!("No counter store, keeping {sum} increments local");
            return;
        }

        log::debug!("Flushing {sum} increments");
        self.flush_in_flight = true;
        if self.state.phase == SyncPhase::Offline {
            self.state.phase = SyncPhase::Syncing;
        }
        self.outbox.push(if sum == 1 {
            RemoteRequest::Increment
        } else {
            RemoteRequest::IncrementBy(sum)
        });
    }

    fn request_read(&mut self, now_ms: u64, force: bool) -> bool {
        if !self.remote_enabled || self.read_in_flight {
            return false;
        }
        if !force
            && let Some(last) = self.last_read_at_ms
            && now_ms.saturating_sub(last) < self.config.poll_throttle_ms
        {
            return false;
        }
        self.last_read_at_ms = Some(now_ms);
        self.read_in_flight = true;
        if self.state.phase == SyncPhase::Offline {
            self.state.phase = SyncPhase::Syncing;
        }
        self.outbox.push(RemoteRequest::Poll);
        true
    }

    /// Apply the result of a request taken from the outbox
    pub fn complete(&mut self, completion: RemoteCompletion, view: &mut dyn CounterView) {
        let RemoteCompletion { request, result } = completion;
        if request.is_read() {
            self.read_in_flight = false;
        } else {
            self.flush_in_flight = false;
        }

        match result {
            Ok(remote) => {
                self.state.last_known_remote = Some(remote);
                let mut merged = merge_counts(self.state.local_value, remote);
                if request.is_read() {
                    merged = merge_counts(merged, self.config.display_floor);
                }
                self.state.local_value = merged;
                if self.state.phase != SyncPhase::Synced {
                    log::info!("Counter synced at {merged}");
                }
                self.state.phase = SyncPhase::Synced;
                self.state.offline = false;
                self.loaded = true;
            }
            Err(StoreError::Unparseable(raw)) => {
                // The store answered, so this is not an outage
                log::warn!(
                    "Counter {request:?} returned unparseable value {raw}, keeping {}",
                    self.state.local_value
                );
                if !self.loaded {
                    self.state.local_value =
                        merge_counts(self.state.local_value, self.config.store_floor);
                    self.loaded = true;
                }
            }
            Err(e) => {
                if !self.state.offline {
                    log::warn!("Counter {request:?} failed, going offline: {e}");
                }
                self.go_offline();
                self.loaded = true;
            }
        }
        self.notify(view);
    }

    /// Browser came back online: read right away, skipping the throttle
    pub fn network_online(&mut self, now_ms: u64, view: &mut dyn CounterView) {
        if !self.remote_enabled || self.state.phase == SyncPhase::Uninitialized {
            return;
        }
        log::info!("Network back, reconciling counter");
        self.state.offline = false;
        if self.state.phase == SyncPhase::Offline {
            self.state.phase = SyncPhase::Syncing;
        }
        self.request_read(now_ms, true);
        self.notify(view);
    }

    pub fn network_offline(&mut self, view: &mut dyn CounterView) {
        if self.state.phase == SyncPhase::Uninitialized {
            return;
        }
        log::info!("Network lost, counter offline");
        self.go_offline();
        self.notify(view);
    }

    fn go_offline(&mut self) {
        self.state.phase = SyncPhase::Offline;
        self.state.offline = true;
        self.state.local_value = merge_counts(self.state.local_value, self.config.offline_floor);
    }

    fn notify(&mut self, view: &mut dyn CounterView) {
        let display = self.display();
        if self.shown == Some(display) {
            return;
        }
        self.shown = Some(display);
        if let Err(e) = view.counter_changed(display) {
            log::warn!("Counter display failed: {e}");
        }
    }
}
