//! Lock Screen Machine
//!
//! The orchestrator: a pure, clock-injected state machine that composes the
//! gating evaluator and the proximity reactor under the screen state.
//!
//! ## Ownership
//!
//! Each level owns the level below it:
//!
//! - Screen off: no gating evaluator, no reactor.
//! - Screen on: one [`GatingEvaluator`]; while it reports active, one
//!   [`ProximityReactor`].
//!
//! Replacing or dropping a child drops the timer it owns, so a superseded
//! timer has nothing left to fire. The reactor is replaced only when the
//! active value actually changes; an unlock that keeps gating active leaves
//! the running episode (and its lock timer) alone.
//!
//! ## Time
//!
//! The machine never reads the clock. Callers pass `now` into every
//! operation, which keeps the output a pure function of the input sequence,
//! the two durations and the clock advance.

use tokio::time::Instant;
use tracing::debug;

use crate::config::LockScreenConfig;
use crate::error::Defect;
use crate::gating::GatingEvaluator;
use crate::model::{LockScreenEvent, Screen, Signal, Snapshot};
use crate::reactor::ProximityReactor;
use crate::stats::EngineStats;

#[derive(Debug)]
pub struct LockScreenMachine {
    config: LockScreenConfig,
    inputs: Snapshot,
    gating: Option<GatingEvaluator>,
    reactor: Option<ProximityReactor>,
    episodes: u64,
    current: LockScreenEvent,
    stats: EngineStats,
}

impl LockScreenMachine {
    /// Build the machine from the construction snapshot and return its first
    /// decision.
    pub fn start(
        config: LockScreenConfig,
        inputs: Snapshot,
        now: Instant,
    ) -> (Self, LockScreenEvent) {
        let mut machine = Self {
            config,
            inputs,
            gating: None,
            reactor: None,
            episodes: 0,
            current: LockScreenEvent::Idle,
            stats: EngineStats::default(),
        };

        let mut events = Vec::with_capacity(1);
        match inputs.screen {
            Screen::On => machine.screen_on(now, &mut events),
            Screen::Off => machine.emit(LockScreenEvent::Idle, &mut events),
        }
        let first = events.pop().unwrap_or(LockScreenEvent::Idle);

        debug!(?inputs, %first, "Lock screen machine started");
        (machine, first)
    }

    /// Apply one input change.
    ///
    /// Timers already due at `now` fire first, so a change that arrives
    /// after a deadline cannot retroactively cancel it.
    pub fn process(
        &mut self,
        signal: Signal,
        now: Instant,
    ) -> Result<Vec<LockScreenEvent>, Defect> {
        if self.inputs.holds(signal) {
            return Err(Defect::RepeatedInput {
                port: signal.port(),
                value: signal.value_name(),
            });
        }

        let mut events = self.fire_due(now);
        self.inputs.apply(signal);
        self.stats.signals_processed += 1;
        debug!(%signal, "Signal received");

        match signal {
            Signal::Screen(Screen::On) => self.screen_on(now, &mut events),
            Signal::Screen(Screen::Off) => self.screen_off(&mut events),
            Signal::Keyguard(_) | Signal::PhoneCall(_) => {
                if let Some(gating) = self.gating.as_mut() {
                    gating.update(
                        self.inputs.keyguard,
                        self.inputs.phone_call,
                        now,
                        &mut self.stats,
                    );
                    self.sync_reactor(now, &mut events);
                }
            }
            Signal::Proximity(proximity) => {
                if let Some(reactor) = self.reactor.as_mut() {
                    if let Some(event) = reactor.on_proximity(proximity, now, &mut self.stats) {
                        self.emit(event, &mut events);
                    }
                }
            }
        }

        Ok(events)
    }

    /// Fire every timer due at `now`, earliest first. On a tie the grace
    /// timer goes first: gating ending takes the lock timer down with it.
    pub fn fire_due(&mut self, now: Instant) -> Vec<LockScreenEvent> {
        let mut events = Vec::new();

        loop {
            let grace = self
                .gating
                .as_ref()
                .and_then(GatingEvaluator::deadline)
                .filter(|at| *at <= now);
            let lock = self
                .reactor
                .as_ref()
                .and_then(ProximityReactor::deadline)
                .filter(|at| *at <= now);

            match (grace, lock) {
                (None, None) => break,
                (Some(grace_at), Some(lock_at)) if lock_at < grace_at => {
                    self.fire_lock(now, &mut events)
                }
                (Some(_), _) => {
                    if let Some(gating) = self.gating.as_mut() {
                        gating.expire(now, &mut self.stats);
                    }
                    self.sync_reactor(now, &mut events);
                }
                (None, Some(_)) => self.fire_lock(now, &mut events),
            }
        }

        events
    }

    /// Earliest armed timer, if any
    pub fn next_deadline(&self) -> Option<Instant> {
        let grace = self.gating.as_ref().and_then(GatingEvaluator::deadline);
        let lock = self.reactor.as_ref().and_then(ProximityReactor::deadline);
        match (grace, lock) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// The most recent decision
    pub fn current(&self) -> LockScreenEvent {
        self.current
    }

    pub fn inputs(&self) -> Snapshot {
        self.inputs
    }

    /// Whether proximity readings are currently acted on
    pub fn is_active(&self) -> bool {
        self.reactor.is_some()
    }

    /// Episode number of the live reactor
    pub fn episode(&self) -> Option<u64> {
        self.reactor.as_ref().map(ProximityReactor::episode)
    }

    pub fn stats(&self) -> &EngineStats {
        &self.stats
    }

    /// Consume the machine, releasing any armed timers
    pub fn finish(mut self) -> EngineStats {
        self.release();
        self.stats
    }

    fn screen_on(&mut self, now: Instant, events: &mut Vec<LockScreenEvent>) {
        let gating = GatingEvaluator::new(
            self.inputs.keyguard,
            self.inputs.phone_call,
            self.config.unlock_grace_delay,
            now,
            &mut self.stats,
        );
        let active = gating.is_active();
        self.gating = Some(gating);

        if active {
            self.start_episode(now, events);
        } else {
            self.emit(LockScreenEvent::Idle, events);
        }
    }

    fn screen_off(&mut self, events: &mut Vec<LockScreenEvent>) {
        self.release();
        self.emit(LockScreenEvent::Idle, events);
    }

    /// Tear down reactor then gating, dropping both timers
    fn release(&mut self) {
        if let Some(reactor) = self.reactor.take() {
            reactor.tear_down(&mut self.stats);
        }
        if let Some(gating) = self.gating.take() {
            gating.tear_down(&mut self.stats);
        }
    }

    /// Bring the reactor in line with the gating output. Acts only when the
    /// active value differs from whether a reactor is live.
    fn sync_reactor(&mut self, now: Instant, events: &mut Vec<LockScreenEvent>) {
        let active = self
            .gating
            .as_ref()
            .is_some_and(GatingEvaluator::is_active);

        match (active, self.reactor.is_some()) {
            (true, false) => self.start_episode(now, events),
            (false, true) => {
                if let Some(reactor) = self.reactor.take() {
                    reactor.tear_down(&mut self.stats);
                }
                self.emit(LockScreenEvent::Idle, events);
            }
            _ => {}
        }
    }

    fn start_episode(&mut self, now: Instant, events: &mut Vec<LockScreenEvent>) {
        self.episodes += 1;
        let (reactor, event) = ProximityReactor::start(
            self.episodes,
            self.inputs.proximity,
            self.config.lock_screen_delay,
            now,
            &mut self.stats,
        );
        self.reactor = Some(reactor);
        self.emit(event, events);
    }

    fn fire_lock(&mut self, now: Instant, events: &mut Vec<LockScreenEvent>) {
        let fired = self
            .reactor
            .as_mut()
            .and_then(|reactor| reactor.fire(now, &mut self.stats));
        if let Some(event) = fired {
            self.emit(event, events);
        }
    }

    fn emit(&mut self, event: LockScreenEvent, events: &mut Vec<LockScreenEvent>) {
        self.current = event;
        self.stats.record_event(event);
        debug!(%event, episode = ?self.episode(), "Lock screen event");
        events.push(event);
    }
}
