//! LOL Guy - press-and-hold autofire with a shared global click counter
//!
//! Core modules:
//! - `input`: Press-and-hold detection (mouse/touch, hit-test filtering)
//! - `autofire`: Accelerating self-rescheduling fire loop
//! - `bullets`: Live bullet bookkeeping with a FIFO cap
//! - `counter`: Optimistic counter, remote store client, reconciliation
//! - `page`: Composition root driven by input, timers and remote completions
//! - `timing`: Clock and timer queue shared by everything above
//! - `stage`: Presentation hooks the page talks to
//! - `audio`: Shot sound with voice cap and ducking
//! - `platform`: Browser bindings (DOM, fetch, timers)
//!
//! The web build talks to the counter store straight from the browser with a
//! token compiled into the bundle. Use an ACL-restricted token limited to the
//! counter key (see [`settings::RemoteCredentials`]).

pub mod audio;
pub mod autofire;
pub mod bullets;
pub mod counter;
pub mod input;
pub mod page;
pub mod settings;
pub mod stage;
pub mod timing;

#[cfg(target_arch = "wasm32")]
pub mod platform;

pub use page::Page;
pub use settings::{RemoteCredentials, Settings};
pub use stage::{FaceState, HeadlessStage, Stage};

/// Default tuning constants
pub mod consts {
    /// Delay before the second shot of a press (ms)
    pub const INITIAL_AUTOFIRE_INTERVAL_MS: u64 = 100;
    /// Delay between shots once fully accelerated (ms)
    pub const FINAL_AUTOFIRE_INTERVAL_MS: u64 = 33;
    /// Time to reach full fire rate (ms)
    pub const ACCELERATION_DURATION_MS: u64 = 5000;
    /// Granularity of the acceleration ramp (ms)
    pub const ACCELERATION_STEP_MS: u64 = 50;
    /// How long the face stays in its shouting state per shot (ms)
    pub const FACE_PULSE_MS: u64 = 100;
    /// Lag past which a late shot fires once at the pump time instead of replaying (ms)
    pub const MAX_AUTOFIRE_CATCH_UP_MS: u64 = 250;
    /// Repeating bullet symbol cycle
    pub const AUTOFIRE_SEQUENCE: [char; 4] = ['L', 'O', 'L', 'O'];

    /// Live bullets before the oldest is evicted
    pub const MAX_BULLETS: usize = 100;
    /// Bullet speed at the start of a press (px/s)
    pub const BULLET_BASE_SPEED: f32 = 440.0;
    /// Bullet speed gain per acceleration step (0.5%)
    pub const BULLET_SPEED_GAIN_PER_STEP: f32 = 0.005;
    /// Extra time a bullet stays mounted after its flight ends (ms)
    pub const BULLET_LINGER_MS: u64 = 100;

    /// Remote counter key
    pub const COUNTER_KEY: &str = "lol_guy_counter";
    /// Value the remote counter is seeded with when absent
    pub const STORE_FLOOR: i64 = 170_000;
    /// Minimum displayed value after a successful sync
    pub const DISPLAY_FLOOR: i64 = 200_057;
    /// Minimum displayed value when the store is unreachable
    pub const OFFLINE_FLOOR: i64 = 170_000;
    /// Debounce window for batched increments (ms)
    pub const FLUSH_DEBOUNCE_MS: u64 = 300;
    /// Remote poll period (ms)
    pub const POLL_INTERVAL_MS: u64 = 100;
    /// Minimum gap between two issued polls (ms)
    pub const POLL_THROTTLE_MS: u64 = 150;
    /// Counter "pop" animation length (ms)
    pub const COUNTER_PULSE_MS: u64 = 150;

    /// Remote store retries after the first attempt
    pub const STORE_RETRIES: u32 = 3;
    /// Backoff scale: delay = exp(retry) * this (ms)
    pub const STORE_BACKOFF_BASE_MS: f64 = 50.0;

    /// Concurrent sound voices before the oldest is cut
    pub const MAX_CONCURRENT_SOUNDS: usize = 15;
}
