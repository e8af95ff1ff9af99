//! Engine counters
//!
//! Kept by the machine as it runs and handed back when the driver stops.

use serde::{Deserialize, Serialize};

use crate::model::LockScreenEvent;

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineStats {
    /// Input changes applied
    pub signals_processed: u64,

    // Output
    pub idle_emitted: u64,
    pub before_lock_emitted: u64,
    pub on_lock_emitted: u64,

    /// Proximity reactor instances started
    pub episodes_started: u64,

    // Lock timer
    pub lock_timers_armed: u64,
    pub lock_timers_fired: u64,
    pub lock_timers_cancelled: u64,

    // Unlock grace timer
    pub grace_timers_armed: u64,
    pub grace_timers_expired: u64,
    pub grace_timers_cancelled: u64,
}

impl EngineStats {
    pub fn record_event(&mut self, event: LockScreenEvent) {
        match event {
            LockScreenEvent::Idle => self.idle_emitted += 1,
            LockScreenEvent::BeforeLockScreen => self.before_lock_emitted += 1,
            LockScreenEvent::OnLockScreen => self.on_lock_emitted += 1,
        }
    }

    pub fn events_emitted(&self) -> u64 {
        self.idle_emitted + self.before_lock_emitted + self.on_lock_emitted
    }

    /// Timers armed but neither fired nor cancelled yet. At most two: one
    /// grace timer and one lock timer.
    pub fn timers_outstanding(&self) -> u64 {
        let armed = self.lock_timers_armed + self.grace_timers_armed;
        let settled = self.lock_timers_fired
            + self.lock_timers_cancelled
            + self.grace_timers_expired
            + self.grace_timers_cancelled;
        armed.saturating_sub(settled)
    }
}
