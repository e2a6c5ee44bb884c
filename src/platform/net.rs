//! Fetch, timers and clock for the browser

use wasm_bindgen::{JsCast, JsValue};
use wasm_bindgen_futures::JsFuture;
use web_sys::{Request, RequestInit, RequestMode, Response};

use crate::counter::{Sleeper, StoreError, Transport};
use crate::timing::Clock;

fn transport_err(e: JsValue) -> StoreError {
    StoreError::Transport(format!("{e:?}"))
}

/// POSTs store commands with `window.fetch`
#[derive(Debug, Default, Clone, Copy)]
pub struct FetchTransport;

impl Transport for FetchTransport {
    async fn post(&self, url: &str, token: &str, body: String) -> Result<String, StoreError> {
        let window =
            web_sys::window().ok_or_else(|| StoreError::Transport("no window".into()))?;

        let opts = RequestInit::new();
        opts.set_method("POST");
        opts.set_mode(RequestMode::Cors);
        opts.set_body(&JsValue::from_str(&body));

        let request = Request::new_with_str_and_init(url, &opts).map_err(transport_err)?;
        let headers = request.headers();
        headers
            .set("Authorization", &format!("Bearer {token}"))
            .map_err(transport_err)?;
        headers
            .set("Content-Type", "application/json")
            .map_err(transport_err)?;

        let response: Response = JsFuture::from(window.fetch_with_request(&request))
            .await
            .map_err(transport_err)?
            .dyn_into()
            .map_err(transport_err)?;
        let text = JsFuture::from(response.text().map_err(transport_err)?)
            .await
            .map_err(transport_err)?;
        text.as_string()
            .ok_or_else(|| StoreError::Transport(format!("HTTP {} without a body", response.status())))
    }
}

/// Waits with `setTimeout`
#[derive(Debug, Default, Clone, Copy)]
pub struct TimeoutSleeper;

impl Sleeper for TimeoutSleeper {
    async fn sleep_ms(&self, ms: u64) {
        let promise = js_sys::Promise::new(&mut |resolve, _reject| {
            let scheduled = web_sys::window().and_then(|w| {
                w.set_timeout_with_callback_and_timeout_and_arguments_0(&resolve, ms as i32)
                    .ok()
            });
            if scheduled.is_none() {
                let _ = resolve.call0(&JsValue::NULL);
            }
        });
        let _ = JsFuture::from(promise).await;
    }
}

/// `performance.now()` in whole milliseconds
#[derive(Debug, Clone)]
pub struct PerformanceClock {
    performance: Option<web_sys::Performance>,
}

impl PerformanceClock {
    pub fn new() -> Self {
        Self {
            performance: web_sys::window().and_then(|w| w.performance()),
        }
    }
}

impl Default for PerformanceClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for PerformanceClock {
    fn now_ms(&self) -> u64 {
        match &self.performance {
            Some(p) => p.now().max(0.0) as u64,
            None => js_sys::Date::now() as u64,
        }
    }
}
