//! LOL Guy entry point
//!
//! The web build wires the page to the DOM, the counter store and a
//! requestAnimationFrame pump. The native build runs a headless hold against
//! an in-memory store.

#[cfg(target_arch = "wasm32")]
use wasm_bindgen::prelude::*;

#[cfg(target_arch = "wasm32")]
mod web_page {
    use std::cell::RefCell;
    use std::rc::Rc;

    use glam::Vec2;
    use wasm_bindgen::prelude::*;
    use web_sys::{MouseEvent, TouchEvent};

    use lol_guy::audio::AudioManager;
    use lol_guy::counter::{CounterService, UpstashStore};
    use lol_guy::input::PointerInput;
    use lol_guy::platform::{DomHitTester, DomStage, FetchTransport, PerformanceClock, TimeoutSleeper};
    use lol_guy::timing::Clock;
    use lol_guy::{Page, RemoteCredentials, Settings};

    type Service = CounterService<UpstashStore<FetchTransport>, TimeoutSleeper>;

    /// Everything the event listeners share
    struct App {
        page: RefCell<Page<DomStage>>,
        service: Service,
        hits: DomHitTester,
        clock: PerformanceClock,
    }

    impl App {
        fn input(self: &Rc<Self>, input: PointerInput) {
            let now = self.clock.now_ms();
            self.page.borrow_mut().input(now, input, &self.hits);
            self.dispatch();
        }

        /// Start every queued store request; results come back through `complete`
        fn dispatch(self: &Rc<Self>) {
            let requests = self.page.borrow_mut().take_requests();
            for request in requests {
                let app = self.clone();
                wasm_bindgen_futures::spawn_local(async move {
                    let completion = app.service.perform(request).await;
                    let now = app.clock.now_ms();
                    app.page.borrow_mut().complete(now, completion);
                    app.dispatch();
                });
            }
        }
    }

    pub async fn run() {
        console_error_panic_hook::set_once();
        let _ = console_log::init_with_level(log::Level::Info);

        log::info!("LOL Guy starting...");

        let Some(window) = web_sys::window() else {
            log::error!("No window - not running in a browser");
            return;
        };
        let Some(document) = window.document() else {
            log::error!("No document");
            return;
        };

        let settings = Settings::default();
        let store = RemoteCredentials::from_env().map(|c| UpstashStore::new(c, FetchTransport));
        let remote_enabled = store.is_some();
        let service = CounterService::new(
            store,
            settings.counter.clone(),
            settings.retry.clone(),
            TimeoutSleeper,
        );

        let stage = match DomStage::new(AudioManager::new(settings.audio.clone())) {
            Ok(stage) => stage,
            Err(e) => {
                log::error!("Failed to set up the page: {e}");
                return;
            }
        };

        let clock = PerformanceClock::new();
        let mut page = Page::new(settings, stage, remote_enabled);
        page.mount(clock.now_ms());

        let app = Rc::new(App {
            page: RefCell::new(page),
            service,
            hits: DomHitTester::new(document),
            clock,
        });

        if remote_enabled {
            let health = app.clone();
            wasm_bindgen_futures::spawn_local(async move {
                if !health.service.health().await {
                    log::warn!("Counter store did not answer ping");
                }
            });
        }

        setup_input_handlers(&window, &app);
        setup_network_handlers(&window, &app);
        app.dispatch();
        request_animation_frame(app);

        log::info!("LOL Guy running!");
    }

    fn listen<E, F>(target: &web_sys::EventTarget, name: &str, handler: F)
    where
        E: wasm_bindgen::convert::FromWasmAbi + 'static,
        F: FnMut(E) + 'static,
    {
        let closure = Closure::<dyn FnMut(E)>::new(handler);
        if let Err(e) = target.add_event_listener_with_callback(name, closure.as_ref().unchecked_ref())
        {
            log::warn!("Failed to listen for {name}: {e:?}");
        }
        closure.forget();
    }

    fn setup_input_handlers(window: &web_sys::Window, app: &Rc<App>) {
        {
            let app = app.clone();
            listen(window, "mousedown", move |e: MouseEvent| {
                let at = Vec2::new(e.client_x() as f32, e.client_y() as f32);
                app.input(PointerInput::MouseDown(at));
            });
        }
        {
            let app = app.clone();
            listen(window, "mouseup", move |_: MouseEvent| app.input(PointerInput::MouseUp));
        }
        if let Some(root) = window.document().and_then(|d| d.document_element()) {
            let app = app.clone();
            listen(&root, "mouseleave", move |_: MouseEvent| {
                app.input(PointerInput::MouseLeave)
            });
        }
        {
            let app = app.clone();
            listen(window, "touchstart", move |e: TouchEvent| {
                let at = e
                    .touches()
                    .get(0)
                    .map(|t| Vec2::new(t.client_x() as f32, t.client_y() as f32));
                app.input(PointerInput::TouchStart(at));
            });
        }
        {
            let app = app.clone();
            listen(window, "touchend", move |_: TouchEvent| app.input(PointerInput::TouchEnd));
        }
        {
            let app = app.clone();
            listen(window, "touchcancel", move |_: TouchEvent| {
                app.input(PointerInput::TouchCancel)
            });
        }
    }

    fn setup_network_handlers(window: &web_sys::Window, app: &Rc<App>) {
        {
            let app = app.clone();
            listen(window, "online", move |_: web_sys::Event| {
                let now = app.clock.now_ms();
                app.page.borrow_mut().network_online(now);
                app.dispatch();
            });
        }
        {
            let app = app.clone();
            listen(window, "offline", move |_: web_sys::Event| {
                let now = app.clock.now_ms();
                app.page.borrow_mut().network_offline(now);
            });
        }
    }

    fn request_animation_frame(app: Rc<App>) {
        let Some(window) = web_sys::window() else {
            return;
        };
        let closure = Closure::once(move |_time: f64| frame(app));
        let _ = window.request_animation_frame(closure.as_ref().unchecked_ref());
        closure.forget();
    }

    fn frame(app: Rc<App>) {
        let now = app.clock.now_ms();
        app.page.borrow_mut().advance(now);
        app.dispatch();
        request_animation_frame(app);
    }
}

#[cfg(target_arch = "wasm32")]
#[wasm_bindgen(start)]
pub async fn wasm_main() {
    web_page::run().await;
}

#[cfg(target_arch = "wasm32")]
fn main() {
    // WASM entry point is wasm_main, this is just to satisfy the compiler
}

/// Hold the button for six seconds against an in-memory store
#[cfg(not(target_arch = "wasm32"))]
fn main() {
    use glam::Vec2;
    use lol_guy::consts::COUNTER_KEY;
    use lol_guy::counter::{CounterService, MemoryStore, NoSleep};
    use lol_guy::input::{HitTarget, PointerInput};
    use lol_guy::timing::{Clock, ManualClock};
    use lol_guy::{HeadlessStage, Page, RemoteCredentials, Settings};

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    log::info!("LOL Guy (native) starting...");
    if RemoteCredentials::from_env().is_some() {
        log::info!("Store credentials found; the native demo still uses an in-memory store");
    }

    let settings = Settings::default();
    let service = CounterService::new(
        Some(MemoryStore::new()),
        settings.counter.clone(),
        settings.retry.clone(),
        NoSleep,
    );
    let clock = ManualClock::new(0);
    let hits = |_: Vec2| HitTarget::Face;

    let mut page = Page::new(settings, HeadlessStage::new(), true);
    page.mount(clock.now_ms());
    page.settle_blocking(clock.now_ms(), &service);

    page.input(clock.now_ms(), PointerInput::MouseDown(Vec2::new(640.0, 360.0)), &hits);
    while clock.now_ms() < 6000 {
        let now = clock.advance(16).min(6000);
        page.advance(now);
        page.settle_blocking(now, &service);
    }
    page.input(clock.now_ms(), PointerInput::MouseUp, &hits);

    // Let the last batch flush
    while clock.now_ms() < 7000 {
        let now = clock.advance(16);
        page.advance(now);
        page.settle_blocking(now, &service);
    }

    let stored = service
        .store()
        .and_then(|s| s.raw(COUNTER_KEY))
        .unwrap_or_default();
    println!("Shots fired:     {}", page.stage().bullets_spawned.len());
    println!("Counter shown:   {}", page.counter().display().label());
    println!("Store value:     {stored}");
}
