//! Browser bindings
//!
//! - `dom`: the page `Stage` and hit testing on top of the DOM
//! - `net`: fetch transport for the counter store, timers and clock

pub mod dom;
pub mod net;

pub use dom::{DomHitTester, DomStage};
pub use net::{FetchTransport, PerformanceClock, TimeoutSleeper};
