//! Proximity Reactor
//!
//! One instance lives for one episode: from gating turning active until it
//! turns inactive or the screen goes off. Inside the episode the sensor is
//! debounced:
//!
//! ```text
//! Idle --near--> Pending --lock delay--> Locked
//!   ^               |                      |
//!   +------far------+----------far---------+
//! ```
//!
//! `OnLockScreen` is only reachable from `Pending`, which is only entered
//! while emitting `BeforeLockScreen`.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::model::{LockScreenEvent, Proximity};
use crate::stats::EngineStats;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReactorState {
    Idle,
    /// Sensor covered; the lock timer runs until `fires_at`
    Pending { fires_at: Instant },
    /// Lock issued for this cover; waits for the sensor to clear
    Locked,
}

#[derive(Debug)]
pub struct ProximityReactor {
    episode: u64,
    state: ReactorState,
    lock_delay: Duration,
}

impl ProximityReactor {
    /// Start an episode from the current reading and return its first
    /// decision
    pub fn start(
        episode: u64,
        proximity: Proximity,
        lock_delay: Duration,
        now: Instant,
        stats: &mut EngineStats,
    ) -> (Self, LockScreenEvent) {
        stats.episodes_started += 1;
        debug!(episode, %proximity, "Episode started");

        let mut reactor = Self {
            episode,
            state: ReactorState::Idle,
            lock_delay,
        };
        let event = match proximity {
            Proximity::Far => LockScreenEvent::Idle,
            Proximity::Near => reactor.arm(now, stats),
        };
        (reactor, event)
    }

    pub fn episode(&self) -> u64 {
        self.episode
    }

    pub fn state(&self) -> ReactorState {
        self.state
    }

    pub fn deadline(&self) -> Option<Instant> {
        match self.state {
            ReactorState::Pending { fires_at } => Some(fires_at),
            _ => None,
        }
    }

    /// React to a new reading. `None` means the reading changes nothing.
    pub fn on_proximity(
        &mut self,
        proximity: Proximity,
        now: Instant,
        stats: &mut EngineStats,
    ) -> Option<LockScreenEvent> {
        match (proximity, self.state) {
            (Proximity::Far, _) => {
                self.cancel(stats);
                self.state = ReactorState::Idle;
                Some(LockScreenEvent::Idle)
            }
            (Proximity::Near, ReactorState::Idle) => Some(self.arm(now, stats)),
            // Already covered; the running timer or the issued lock stands
            (Proximity::Near, ReactorState::Pending { .. } | ReactorState::Locked) => None,
        }
    }

    /// Fire the lock timer if it is due
    pub fn fire(&mut self, now: Instant, stats: &mut EngineStats) -> Option<LockScreenEvent> {
        match self.state {
            ReactorState::Pending { fires_at } if fires_at <= now => {
                self.state = ReactorState::Locked;
                stats.lock_timers_fired += 1;
                debug!(episode = self.episode, "Lock delay elapsed -> OnLockScreen");
                Some(LockScreenEvent::OnLockScreen)
            }
            _ => None,
        }
    }

    /// End the episode, releasing the lock timer
    pub fn tear_down(mut self, stats: &mut EngineStats) {
        self.cancel(stats);
        debug!(episode = self.episode, "Episode ended");
    }

    fn arm(&mut self, now: Instant, stats: &mut EngineStats) -> LockScreenEvent {
        let fires_at = now + self.lock_delay;
        self.state = ReactorState::Pending { fires_at };
        stats.lock_timers_armed += 1;
        trace!(episode = self.episode, delay = ?self.lock_delay, "Lock timer armed");
        LockScreenEvent::BeforeLockScreen
    }

    fn cancel(&mut self, stats: &mut EngineStats) {
        if let ReactorState::Pending { .. } = self.state {
            self.state = ReactorState::Idle;
            stats.lock_timers_cancelled += 1;
            trace!(episode = self.episode, "Lock timer cancelled");
        }
    }
}
