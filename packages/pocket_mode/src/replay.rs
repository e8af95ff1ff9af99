//! Deterministic replay of a signal script on a virtual clock.
//!
//! The script drives [`LockScreenMachine`] directly: waits advance a clock
//! that is never read from the OS, and each due timer fires at its own
//! deadline so the printed offsets are exact.

use anyhow::Result;
use pocket_core::{EngineStats, LockScreenConfig, LockScreenEvent, LockScreenMachine};
use serde::Serialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::script::{Script, Step};

/// An event with its offset from the start of the script
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TimedEvent {
    pub at_ms: u64,
    pub event: LockScreenEvent,
}

impl TimedEvent {
    pub fn render(&self, json: bool) -> Result<String> {
        if json {
            Ok(serde_json::to_string(self)?)
        } else {
            Ok(format!("+{} {}", self.at_ms, self.event))
        }
    }
}

#[derive(Debug, Clone)]
pub struct Replay {
    pub events: Vec<TimedEvent>,
    pub stats: EngineStats,
}

struct VirtualClock {
    origin: Instant,
    now: Instant,
}

impl VirtualClock {
    fn new() -> Self {
        let origin = Instant::now();
        Self { origin, now: origin }
    }

    fn offset_ms(&self) -> u64 {
        millis(self.now.duration_since(self.origin))
    }
}

pub fn replay(script: &Script, config: LockScreenConfig) -> Result<Replay> {
    let mut clock = VirtualClock::new();
    let (mut machine, first) = LockScreenMachine::start(config, script.initial, clock.now);
    let mut events = vec![TimedEvent {
        at_ms: 0,
        event: first,
    }];

    for step in &script.steps {
        match *step {
            Step::Signal(signal) => {
                // The ports never forward an unchanged value
                if machine.inputs().holds(signal) {
                    debug!(%signal, at_ms = clock.offset_ms(), "Skipping unchanged signal");
                    continue;
                }
                let emitted = machine.process(signal, clock.now)?;
                push(&mut events, &clock, emitted);
            }
            Step::Wait(duration) => advance(&mut machine, &mut clock, duration, &mut events),
        }
    }

    let stats = machine.finish();
    info!(
        events = events.len(),
        duration_ms = millis(script.duration()),
        episodes = stats.episodes_started,
        "Replay finished"
    );

    Ok(Replay { events, stats })
}

/// Move the clock forward, stopping at every deadline on the way
fn advance(
    machine: &mut LockScreenMachine,
    clock: &mut VirtualClock,
    duration: Duration,
    events: &mut Vec<TimedEvent>,
) {
    let target = clock.now + duration;

    while let Some(deadline) = machine.next_deadline() {
        if deadline > target {
            break;
        }
        clock.now = clock.now.max(deadline);
        let emitted = machine.fire_due(clock.now);
        push(events, clock, emitted);
    }

    clock.now = target;
}

/// Whole milliseconds, saturating at `u64::MAX`
fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

fn push(events: &mut Vec<TimedEvent>, clock: &VirtualClock, emitted: Vec<LockScreenEvent>) {
    let at_ms = clock.offset_ms();
    events.extend(emitted.into_iter().map(|event| TimedEvent { at_ms, event }));
}
