//! Pocket Core - lock-intent engine for pocket mode
//!
//! Derives `Idle` / `BeforeLockScreen` / `OnLockScreen` events from four
//! device signals: screen, keyguard, phone call and proximity. It has no
//! platform knowledge; the adapter that reads sensors and the layer that
//! actually locks the screen sit on either side of it.
//!
//! # Architecture
//!
//! - **Gating** ([`GatingEvaluator`]): keyguard + call state decide whether
//!   proximity matters, with a grace period after unlock.
//! - **Reactor** ([`ProximityReactor`]): debounces a covered sensor into
//!   `BeforeLockScreen` then `OnLockScreen`.
//! - **Orchestrator** ([`LockScreenMachine`]): keyed on the screen state,
//!   owns the other two and replaces them switch-latest style.
//! - **Driver** ([`LockScreenEngine`]): runs the machine on a tokio task.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//! use pocket_core::{LockScreenConfig, LockScreenEngine, Proximity, Snapshot, ports};
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = LockScreenConfig::new(Duration::from_millis(1000), Duration::from_secs(2));
//!     let (mut adapters, inputs) = ports(Snapshot::default());
//!     let mut engine = LockScreenEngine::spawn(inputs, config, 32);
//!
//!     adapters.proximity.publish(Proximity::Near).unwrap();
//!
//!     while let Some(event) = engine.recv().await {
//!         println!("{event}");
//!     }
//! }
//! ```

mod config;
mod driver;
mod error;
mod gating;
mod machine;
mod model;
mod ports;
mod reactor;
mod stats;

pub use config::LockScreenConfig;
pub use driver::{LockScreenEngine, run_lock_screen_events, spawn_lock_screen_events};
pub use error::{Defect, LockScreenError, ParseValueError, PortError};
pub use gating::{GateRule, GatingEvaluator};
pub use machine::LockScreenMachine;
pub use model::{Keyguard, LockScreenEvent, PhoneCall, Port, Proximity, Screen, Signal, Snapshot};
pub use ports::{Arrival, InputPort, LockScreenInputs, LockScreenPorts, PortValue, ports};
pub use reactor::{ProximityReactor, ReactorState};
pub use stats::EngineStats;
