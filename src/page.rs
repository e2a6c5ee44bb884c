//! Page composition root
//!
//! `Page` owns the detector, the autofire scheduler, the bullet field, the
//! counter reconciler and the one timer queue they share. It is driven from
//! outside by raw input, the current time and remote completions; it never
//! blocks and never talks to the network itself.

use crate::autofire::{AutofireScheduler, FireEvent, FireSink};
use crate::bullets::BulletField;
use crate::counter::{CounterReconciler, RemoteCompletion, RemoteRequest};
use crate::input::{HitTester, InteractionDetector, PointerInput, PressTransition};
use crate::settings::Settings;
use crate::stage::{FaceState, HookError, Stage};
use crate::timing::{TimerKind, TimerQueue};

/// Shot side effects, routed to the stage and the counter
struct ShotEffects<'a, S> {
    stage: &'a mut S,
    bullets: &'a mut BulletField,
    counter: &'a mut CounterReconciler,
    face: &'a mut FaceState,
}

impl<S: Stage> FireSink for ShotEffects<'_, S> {
    fn face_pulse(
        &mut self,
        now_ms: u64,
        pulse_ms: u64,
        timers: &mut TimerQueue,
    ) -> Result<(), HookError> {
        timers.schedule(now_ms + pulse_ms, TimerKind::FaceRevert);
        *self.face = FaceState::Shouting;
        self.stage.set_face(FaceState::Shouting)
    }

    fn play_sound(&mut self) -> Result<(), HookError> {
        self.stage.play_sound()
    }

    fn spawn_bullet(&mut self, shot: &FireEvent, timers: &mut TimerQueue) -> Result<(), HookError> {
        let spawned = self.bullets.spawn(
            shot.emitted_at_ms,
            shot.symbol,
            shot.speed_multiplier,
            self.stage.face_origin(),
            self.stage.viewport(),
        );
        if let Some(evicted) = spawned.evicted
            && let Err(e) = self.stage.remove_bullet(evicted)
        {
            log::warn!("Failed to unmount bullet {evicted}: {e}");
        }
        let bullet = spawned.bullet;
        timers.schedule(bullet.expires_at_ms, TimerKind::BulletExpiry(bullet.id));
        self.stage.spawn_bullet(&bullet)
    }

    fn record_increment(
        &mut self,
        now_ms: u64,
        amount: i64,
        timers: &mut TimerQueue,
    ) -> Result<(), HookError> {
        self.counter
            .record_increment(now_ms, amount, timers, &mut *self.stage);
        Ok(())
    }
}

pub struct Page<S: Stage> {
    settings: Settings,
    stage: S,
    timers: TimerQueue,
    detector: InteractionDetector,
    autofire: AutofireScheduler,
    bullets: BulletField,
    counter: CounterReconciler,
    face: FaceState,
}

impl<S: Stage> Page<S> {
    /// `remote_enabled` is false when no store credentials are configured
    pub fn new(settings: Settings, stage: S, remote_enabled: bool) -> Self {
        Self {
            detector: InteractionDetector::new(),
            autofire: AutofireScheduler::new(settings.autofire.clone()),
            bullets: BulletField::new(settings.bullets.clone()),
            counter: CounterReconciler::new(settings.counter.clone(), remote_enabled),
            timers: TimerQueue::new(),
            face: FaceState::Resting,
            settings,
            stage,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    pub fn stage(&self) -> &S {
        &self.stage
    }

    pub fn stage_mut(&mut self) -> &mut S {
        &mut self.stage
    }

    pub fn counter(&self) -> &CounterReconciler {
        &self.counter
    }

    pub fn bullets(&self) -> &BulletField {
        &self.bullets
    }

    pub fn autofire(&self) -> &AutofireScheduler {
        &self.autofire
    }

    pub fn detector(&self) -> &InteractionDetector {
        &self.detector
    }

    pub fn timers(&self) -> &TimerQueue {
        &self.timers
    }

    pub fn face(&self) -> FaceState {
        self.face
    }

    /// Earliest time `advance` has work to do
    pub fn next_deadline(&self) -> Option<u64> {
        self.timers.next_deadline()
    }

    fn split(&mut self) -> (&mut AutofireScheduler, &mut TimerQueue, ShotEffects<'_, S>) {
        (
            &mut self.autofire,
            &mut self.timers,
            ShotEffects {
                stage: &mut self.stage,
                bullets: &mut self.bullets,
                counter: &mut self.counter,
                face: &mut self.face,
            },
        )
    }

    /// Start the counter sync
    pub fn mount(&mut self, now_ms: u64) {
        log::info!("Mounting page");
        self.counter.mount(now_ms, &mut self.timers, &mut self.stage);
    }

    /// Feed a raw pointer event
    pub fn input(
        &mut self,
        now_ms: u64,
        input: PointerInput,
        hits: &dyn HitTester,
    ) -> Option<PressTransition> {
        // Shots due before the event happened fire first
        self.advance(now_ms);

        let transition = self.detector.handle(now_ms, input, hits)?;
        match transition {
            PressTransition::Started(_) => {
                let (autofire, timers, mut effects) = self.split();
                autofire.start(now_ms, timers, &mut effects);
            }
            PressTransition::Ended(_) => {
                self.autofire.stop(&mut self.timers);
                self.set_face(FaceState::Resting);
            }
        }
        Some(transition)
    }

    /// Run every timer due at or before `now_ms`. Returns how many fired.
    pub fn advance(&mut self, now_ms: u64) -> usize {
        let mut fired = 0;
        while let Some(due) = self.timers.pop_due(now_ms) {
            fired += 1;
            match due.kind {
                TimerKind::AutofireShot => {
                    let (autofire, timers, mut effects) = self.split();
                    autofire.on_timer(due, now_ms, timers, &mut effects);
                }
                TimerKind::FaceRevert => self.set_face(FaceState::Resting),
                TimerKind::BulletExpiry(id) => {
                    if self.bullets.remove(id).is_some()
                        && let Err(e) = self.stage.remove_bullet(id)
                    {
                        log::warn!("Failed to unmount bullet {id}: {e}");
                    }
                }
                TimerKind::CounterFlush | TimerKind::CounterPoll | TimerKind::CounterPulseEnd => {
                    self.counter.on_timer(due, &mut self.timers, &mut self.stage);
                }
            }
        }
        fired
    }

    fn set_face(&mut self, face: FaceState) {
        self.face = face;
        if let Err(e) = self.stage.set_face(face) {
            log::warn!("Failed to set face: {e}");
        }
    }

    /// Remote work queued since the last call
    pub fn take_requests(&mut self) -> Vec<RemoteRequest> {
        self.counter.take_requests()
    }

    /// Apply the result of a request taken from `take_requests`
    pub fn complete(&mut self, now_ms: u64, completion: RemoteCompletion) {
        self.advance(now_ms);
        self.counter.complete(completion, &mut self.stage);
    }

    pub fn network_online(&mut self, now_ms: u64) {
        self.advance(now_ms);
        self.counter.network_online(now_ms, &mut self.stage);
    }

    pub fn network_offline(&mut self, now_ms: u64) {
        self.advance(now_ms);
        self.counter.network_offline(&mut self.stage);
    }

    /// Perform queued requests on the current thread until none are left
    #[cfg(not(target_arch = "wasm32"))]
    pub fn settle_blocking<St, Z>(
        &mut self,
        now_ms: u64,
        service: &crate::counter::CounterService<St, Z>,
    ) -> usize
    where
        St: crate::counter::CounterStore,
        Z: crate::counter::Sleeper,
    {
        let mut performed = 0;
        loop {
            let requests = self.take_requests();
            if requests.is_empty() {
                return performed;
            }
            for request in requests {
                let completion = pollster::block_on(service.perform(request));
                self.complete(now_ms, completion);
                performed += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::consts::*;
    use crate::counter::{CounterService, MemoryStore, NoSleep, RetryPolicy, SyncPhase};
    use crate::input::HitTarget;
    use crate::stage::HeadlessStage;
    use glam::Vec2;

    type Service = CounterService<MemoryStore, NoSleep>;

    fn on_face(_: Vec2) -> HitTarget {
        HitTarget::Face
    }

    fn on_button(_: Vec2) -> HitTarget {
        HitTarget::Control
    }

    fn service(store: MemoryStore) -> Service {
        CounterService::new(Some(store), Default::default(), RetryPolicy::default(), NoSleep)
    }

    fn page(settings: Settings, stage: HeadlessStage, remote: bool) -> Page<HeadlessStage> {
        let mut page = Page::new(settings, stage, remote);
        page.mount(0);
        page
    }

    /// Run the page from `from_ms` to `to_ms` in animation-frame steps
    fn run(page: &mut Page<HeadlessStage>, svc: &Service, from_ms: u64, to_ms: u64) {
        let mut now = from_ms;
        while now < to_ms {
            now = (now + 16).min(to_ms);
            page.advance(now);
            page.settle_blocking(now, svc);
        }
    }

    /// Pump the page from `from_ms` to `to_ms` in animation-frame steps, no store
    fn frames(page: &mut Page<HeadlessStage>, from_ms: u64, to_ms: u64) {
        let mut now = from_ms;
        while now < to_ms {
            now = (now + 16).min(to_ms);
            page.advance(now);
        }
    }

    fn press(page: &mut Page<HeadlessStage>, now_ms: u64) -> Option<PressTransition> {
        page.input(now_ms, PointerInput::MouseDown(Vec2::new(640.0, 360.0)), &on_face)
    }

    #[test]
    fn test_six_second_hold_reaches_the_store() {
        let svc = service(MemoryStore::with_value(COUNTER_KEY, 250_000));
        let mut page = page(Settings::default(), HeadlessStage::new(), true);
        page.settle_blocking(0, &svc);
        assert_eq!(page.stage().shown_value(), Some(250_000));

        assert!(matches!(press(&mut page, 1000), Some(PressTransition::Started(_))));
        run(&mut page, &svc, 1000, 7000);
        assert!(matches!(
            page.input(7000, PointerInput::MouseUp, &on_face),
            Some(PressTransition::Ended(_))
        ));
        assert_eq!(page.stage().bullets_spawned.len(), 112);

        run(&mut page, &svc, 7000, 9000);
        assert_eq!(page.counter().displayed(), Some(250_112));
        assert_eq!(
            svc.store().and_then(|s| s.raw(COUNTER_KEY)),
            Some(serde_json::Value::from(250_112))
        );
        let history = &page.stage().counter_history;
        assert!(history.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(page.face(), FaceState::Resting);
    }

    #[test]
    fn test_empty_store_is_seeded_and_floored() {
        let svc = service(MemoryStore::new());
        let mut page = page(Settings::default(), HeadlessStage::new(), true);
        page.settle_blocking(0, &svc);
        assert_eq!(
            svc.store().and_then(|s| s.raw(COUNTER_KEY)),
            Some(serde_json::Value::from(170_000))
        );
        assert_eq!(page.counter().displayed(), Some(200_057));

        let mut settings = Settings::default();
        settings.counter.display_floor = 0;
        let mut unfloored = Page::new(settings, HeadlessStage::new(), true);
        unfloored.mount(0);
        unfloored.settle_blocking(0, &svc);
        assert_eq!(unfloored.counter().displayed(), Some(170_000));
    }

    #[test]
    fn test_touch_suppresses_synthetic_mouse() {
        let svc = service(MemoryStore::with_value(COUNTER_KEY, 250_000));
        let mut page = page(Settings::default(), HeadlessStage::new(), true);
        page.settle_blocking(0, &svc);

        let at = Some(Vec2::new(640.0, 360.0));
        assert!(page.input(100, PointerInput::TouchStart(at), &on_face).is_some());
        assert!(press(&mut page, 101).is_none());
        assert_eq!(page.timers().count_of(TimerKind::AutofireShot), 1);
        assert_eq!(page.stage().bullets_spawned.len(), 1);

        assert!(page.input(150, PointerInput::MouseUp, &on_face).is_none());
        assert!(page.autofire().is_firing());
        assert!(page.input(150, PointerInput::TouchEnd, &on_face).is_some());
        assert!(press(&mut page, 400).is_none());
        assert!(!page.autofire().is_firing());
    }

    #[test]
    fn test_press_on_control_is_ignored() {
        let mut page = page(Settings::default(), HeadlessStage::new(), false);
        let hit = page.input(10, PointerInput::MouseDown(Vec2::ZERO), &on_button);
        assert!(hit.is_none());
        assert!(page.stage().bullets_spawned.is_empty());
    }

    #[test]
    fn test_double_press_keeps_one_timer_chain() {
        let mut page = page(Settings::default(), HeadlessStage::new(), false);
        press(&mut page, 0);
        press(&mut page, 5);
        assert_eq!(page.timers().count_of(TimerKind::AutofireShot), 1);
        assert_eq!(page.stage().bullets_spawned.len(), 1);
    }

    #[test]
    fn test_release_forces_face_to_rest() {
        let mut page = page(Settings::default(), HeadlessStage::new(), false);
        press(&mut page, 0);
        assert_eq!(page.stage().face, FaceState::Shouting);
        page.input(50, PointerInput::MouseLeave, &on_face);
        assert_eq!(page.stage().face, FaceState::Resting);

        page.advance(2000);
        assert_eq!(page.stage().bullets_spawned.len(), 1);
        assert_eq!(page.stage().face, FaceState::Resting);
    }

    #[test]
    fn test_face_shouts_between_shots() {
        let mut page = page(Settings::default(), HeadlessStage::new(), false);
        press(&mut page, 0);
        // Shot 2 lands at 100, the revert of shot 1 at 100 as well
        page.advance(100);
        assert_eq!(page.face(), FaceState::Shouting);
        page.advance(150);
        assert_eq!(page.face(), FaceState::Shouting);
        page.input(150, PointerInput::MouseUp, &on_face);
        page.advance(400);
        assert_eq!(page.face(), FaceState::Resting);
    }

    #[test]
    fn test_without_store_counts_locally() {
        let mut page = page(Settings::default(), HeadlessStage::new(), false);
        assert_eq!(page.counter().phase(), SyncPhase::Offline);
        press(&mut page, 0);
        frames(&mut page, 0, 1000);
        page.input(1000, PointerInput::MouseUp, &on_face);
        page.advance(3000);

        assert_eq!(page.counter().displayed(), Some(170_011));
        assert!(page.stage().counter.is_some_and(|c| c.offline));
        assert!(page.take_requests().is_empty());
    }

    #[test]
    fn test_bullets_are_capped_and_expire() {
        let mut settings = Settings::default();
        settings.bullets.max_live = 5;
        let mut page = page(settings, HeadlessStage::new(), false);
        press(&mut page, 0);
        frames(&mut page, 0, 1000);
        page.input(1000, PointerInput::MouseUp, &on_face);

        assert_eq!(page.stage().bullets_spawned.len(), 11);
        assert_eq!(page.bullets().len(), 5);
        assert_eq!(page.stage().bullets_removed, vec![0, 1, 2, 3, 4, 5]);

        page.advance(10_000);
        assert!(page.bullets().is_empty());
        assert_eq!(page.stage().bullets_removed.len(), 11);
    }

    #[test]
    fn test_broken_audio_does_not_stop_shots() {
        let stage = HeadlessStage {
            audio_broken: true,
            ..HeadlessStage::new()
        };
        let mut page = page(Settings::default(), stage, false);
        press(&mut page, 0);
        frames(&mut page, 0, 1000);
        assert_eq!(page.stage().sounds_played, 0);
        assert_eq!(page.stage().bullets_spawned.len(), 11);
        assert_eq!(page.counter().displayed(), Some(170_011));
    }

    #[test]
    fn test_store_outage_mid_session_keeps_counting() {
        let svc = service(MemoryStore::with_value(COUNTER_KEY, 250_000));
        let mut page = page(Settings::default(), HeadlessStage::new(), true);
        page.settle_blocking(0, &svc);

        press(&mut page, 0);
        run(&mut page, &svc, 0, 400);
        if let Some(store) = svc.store() {
            store.set_unreachable(true);
        }
        run(&mut page, &svc, 400, 1000);
        page.input(1000, PointerInput::MouseUp, &on_face);
        run(&mut page, &svc, 1000, 1500);

        assert!(page.counter().is_offline());
        assert_eq!(page.counter().displayed(), Some(250_011));
        let history = &page.stage().counter_history;
        assert!(history.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_network_events_reach_the_counter() {
        let svc = service(MemoryStore::with_value(COUNTER_KEY, 250_000));
        let mut page = page(Settings::default(), HeadlessStage::new(), true);
        page.settle_blocking(0, &svc);

        page.network_offline(10);
        assert_eq!(page.counter().phase(), SyncPhase::Offline);
        page.network_online(20);
        page.settle_blocking(20, &svc);
        assert_eq!(page.counter().phase(), SyncPhase::Synced);
        assert!(!page.stage().counter.is_some_and(|c| c.offline));
    }

    #[test]
    fn test_suspended_frame_loop_does_not_replay_backlog() {
        let mut page = page(Settings::default(), HeadlessStage::new(), false);
        press(&mut page, 0);
        frames(&mut page, 0, 1000);
        assert_eq!(page.stage().bullets_spawned.len(), 11);

        // Tab hidden for a minute: one catch-up shot, not thousands
        page.advance(61_000);
        assert_eq!(page.stage().bullets_spawned.len(), 12);
        assert_eq!(page.counter().displayed(), Some(170_012));
        assert_eq!(page.timers().count_of(TimerKind::AutofireShot), 1);

        // Release after another stall fires at most one more shot
        page.input(120_000, PointerInput::MouseUp, &on_face);
        assert_eq!(page.stage().bullets_spawned.len(), 13);
        assert!(!page.autofire().is_firing());
    }
}
