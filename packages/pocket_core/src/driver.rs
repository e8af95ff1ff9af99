//! Async driver
//!
//! Runs a [`LockScreenMachine`] on one tokio task. A single `select!` loop
//! waits on the input ports, the earliest armed timer and the cancellation
//! token; whatever wins is applied to the machine and the resulting events
//! are forwarded in order.
//!
//! Inputs are applied at their publish stamp, not at the time the loop gets
//! to them. Queued inputs are always drained before a timer fires, so a
//! consumer that falls behind delays events but never changes them.
//!
//! Only one task ever touches the machine, so there is no shared state and
//! no locking. Timers are deadlines owned by the machine; the loop re-reads
//! `next_deadline()` on every turn, so a cancelled timer is simply never
//! waited on again.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::config::LockScreenConfig;
use crate::error::{Defect, LockScreenError};
use crate::machine::LockScreenMachine;
use crate::model::LockScreenEvent;
use crate::ports::LockScreenInputs;
use crate::stats::EngineStats;

/// Spawn the engine task. Events go to `events_tx`; the task ends when
/// `cancel` fires, when the event consumer hangs up, or on a defect.
pub fn spawn_lock_screen_events(
    inputs: LockScreenInputs,
    config: LockScreenConfig,
    events_tx: mpsc::Sender<LockScreenEvent>,
    cancel: CancellationToken,
) -> JoinHandle<Result<EngineStats, LockScreenError>> {
    tokio::spawn(run_lock_screen_events(inputs, config, events_tx, cancel))
}

pub async fn run_lock_screen_events(
    mut inputs: LockScreenInputs,
    config: LockScreenConfig,
    events_tx: mpsc::Sender<LockScreenEvent>,
    cancel: CancellationToken,
) -> Result<EngineStats, LockScreenError> {
    let started = Instant::now();
    let (mut machine, first) = LockScreenMachine::start(config, inputs.snapshot(), started);
    // Last instant handed to the machine; its clock never runs backwards
    let mut clock = started;
    info!(
        lock_screen_delay = ?config.lock_screen_delay,
        unlock_grace_delay = ?config.unlock_grace_delay,
        "Lock screen engine started"
    );

    if events_tx.send(first).await.is_err() {
        debug!("Event consumer gone before first event");
        return Ok(machine.finish());
    }

    loop {
        let deadline = machine.next_deadline();

        let arrival = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                debug!("Lock screen engine cancelled");
                break;
            }
            arrival = inputs.recv() => match arrival {
                Some(arrival) => Some(arrival),
                // The ports are infinite by contract; running dry is not a shutdown
                None => return Err(stop_on_defect(Defect::InputsClosed)),
            },
            _ = sleep_until_deadline(deadline) => None,
        };

        let events = match arrival {
            Some(arrival) => {
                clock = clock.max(arrival.at);
                match machine.process(arrival.signal, clock) {
                    Ok(events) => events,
                    Err(defect) => return Err(stop_on_defect(defect)),
                }
            }
            None => {
                clock = clock.max(Instant::now());
                machine.fire_due(clock)
            }
        };

        for event in events {
            if events_tx.send(event).await.is_err() {
                debug!("Event consumer gone, stopping lock screen engine");
                return Ok(machine.finish());
            }
        }
    }

    let stats = machine.finish();
    info!(
        events = stats.events_emitted(),
        episodes = stats.episodes_started,
        "Lock screen engine stopped"
    );
    Ok(stats)
}

fn stop_on_defect(defect: Defect) -> LockScreenError {
    error!(%defect, "Lock screen engine stopped on input contract violation");
    LockScreenError::Defect(defect)
}

async fn sleep_until_deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Handle to a running engine task
pub struct LockScreenEngine {
    events: mpsc::Receiver<LockScreenEvent>,
    cancel: CancellationToken,
    task: JoinHandle<Result<EngineStats, LockScreenError>>,
}

impl LockScreenEngine {
    /// Spawn the engine with an event buffer of `capacity`
    pub fn spawn(inputs: LockScreenInputs, config: LockScreenConfig, capacity: usize) -> Self {
        let (events_tx, events) = mpsc::channel(capacity.max(1));
        let cancel = CancellationToken::new();
        let task = spawn_lock_screen_events(inputs, config, events_tx, cancel.clone());
        Self {
            events,
            cancel,
            task,
        }
    }

    /// Next emitted event; `None` once the engine has stopped and the
    /// buffer is drained
    pub async fn recv(&mut self) -> Option<LockScreenEvent> {
        self.events.recv().await
    }

    /// Next event if one is already buffered
    pub fn try_recv(&mut self) -> Option<LockScreenEvent> {
        self.events.try_recv().ok()
    }

    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Stop the engine and collect its stats
    pub async fn shutdown(self) -> Result<EngineStats, LockScreenError> {
        self.cancel.cancel();
        self.join().await
    }

    /// Wait for the engine to stop on its own
    pub async fn join(self) -> Result<EngineStats, LockScreenError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) => Err(LockScreenError::TaskFailed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::model::{Keyguard, PhoneCall, Port, Proximity, Screen, Signal, Snapshot};
    use crate::ports::{self, Arrival, LockScreenPorts};

    use LockScreenEvent::{BeforeLockScreen, Idle, OnLockScreen};

    const LOCK: Duration = Duration::from_millis(1000);
    const GRACE: Duration = Duration::from_millis(300);

    fn config() -> LockScreenConfig {
        LockScreenConfig::new(LOCK, GRACE)
    }

    fn screen_on_locked() -> Snapshot {
        Snapshot {
            screen: Screen::On,
            keyguard: Keyguard::Locked,
            phone_call: PhoneCall::Idle,
            proximity: Proximity::Far,
        }
    }

    async fn spawn_active() -> (LockScreenPorts, LockScreenEngine) {
        let (adapters, inputs) = ports::ports(screen_on_locked());
        let mut engine = LockScreenEngine::spawn(inputs, config(), 16);
        assert_eq!(engine.recv().await, Some(Idle));
        (adapters, engine)
    }

    /// Let the engine task drain everything runnable at the current instant
    async fn settle() {
        for _ in 0..8 {
            tokio::task::yield_now().await;
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_cover_locks_after_delay() {
        let (mut adapters, mut engine) = spawn_active().await;

        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));

        tokio::time::sleep(LOCK - Duration::from_millis(1)).await;
        settle().await;
        assert_eq!(engine.try_recv(), None);

        tokio::time::sleep(Duration::from_millis(1)).await;
        assert_eq!(engine.recv().await, Some(OnLockScreen));

        let stats = engine.shutdown().await.unwrap();
        assert_eq!(stats.lock_timers_fired, 1);
        assert_eq!(stats.timers_outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncover_preempts_lock() {
        let (mut adapters, mut engine) = spawn_active().await;

        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));
        tokio::time::sleep(LOCK / 2).await;
        adapters.publish(Signal::Proximity(Proximity::Far)).unwrap();
        assert_eq!(engine.recv().await, Some(Idle));

        tokio::time::sleep(LOCK * 2).await;
        settle().await;
        assert_eq!(engine.try_recv(), None);

        let stats = engine.shutdown().await.unwrap();
        assert_eq!(stats.on_lock_emitted, 0);
        assert_eq!(stats.lock_timers_cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unlock_grace_ends_episode_before_lock() {
        let (mut adapters, mut engine) = spawn_active().await;

        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));
        tokio::time::sleep(LOCK / 2).await;
        adapters.publish(Signal::Keyguard(Keyguard::Unlocked)).unwrap();

        // Grace (300ms) runs out before the remaining lock delay (500ms)
        assert_eq!(engine.recv().await, Some(Idle));
        tokio::time::sleep(LOCK).await;
        settle().await;
        assert_eq!(engine.try_recv(), None);

        let stats = engine.shutdown().await.unwrap();
        assert_eq!(stats.grace_timers_expired, 1);
        assert_eq!(stats.on_lock_emitted, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_call_goes_idle_immediately() {
        let (mut adapters, mut engine) = spawn_active().await;

        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));
        adapters.publish(Signal::PhoneCall(PhoneCall::Ongoing)).unwrap();
        assert_eq!(engine.recv().await, Some(Idle));

        tokio::time::sleep(LOCK * 2).await;
        settle().await;
        assert_eq!(engine.try_recv(), None);
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_screen_off_mutes_until_on() {
        let (mut adapters, mut engine) = spawn_active().await;

        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));
        adapters.publish(Signal::Screen(Screen::Off)).unwrap();
        assert_eq!(engine.recv().await, Some(Idle));

        adapters.publish(Signal::Proximity(Proximity::Far)).unwrap();
        adapters.publish(Signal::Keyguard(Keyguard::Unlocked)).unwrap();
        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        tokio::time::sleep(LOCK * 2).await;
        settle().await;
        assert_eq!(engine.try_recv(), None);

        // Back on: unlocked and covered, so the grace period wins the race
        adapters.publish(Signal::Screen(Screen::On)).unwrap();
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));
        assert_eq!(engine.recv().await, Some(Idle));
        engine.shutdown().await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_consumer_hangup_stops_engine() {
        let (mut adapters, inputs) = ports::ports(screen_on_locked());
        let (events_tx, events_rx) = mpsc::channel(4);
        let task = spawn_lock_screen_events(inputs, config(), events_tx, CancellationToken::new());
        drop(events_rx);

        adapters.publish(Signal::Proximity(Proximity::Near)).ok();
        let stats = task.await.unwrap().unwrap();
        assert_eq!(stats.timers_outstanding(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_closed_ports_are_a_defect() {
        let (adapters, inputs) = ports::ports(screen_on_locked());
        let mut engine = LockScreenEngine::spawn(inputs, config(), 4);
        assert_eq!(engine.recv().await, Some(Idle));

        drop(adapters);
        let err = engine.join().await.unwrap_err();
        assert!(err.is_defect());
        assert_eq!(err, LockScreenError::Defect(Defect::InputsClosed));
    }

    #[tokio::test(start_paused = true)]
    async fn test_repeated_raw_input_is_a_defect() {
        let (raw_tx, raw_rx) = mpsc::unbounded_channel();
        let inputs = LockScreenInputs::from_channel(screen_on_locked(), raw_rx);

        let mut engine = LockScreenEngine::spawn(inputs, config(), 4);
        assert_eq!(engine.recv().await, Some(Idle));

        raw_tx.send(Arrival::now(Signal::Proximity(Proximity::Near))).unwrap();
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));
        raw_tx.send(Arrival::now(Signal::Proximity(Proximity::Near))).unwrap();

        let err = engine.join().await.unwrap_err();
        assert_eq!(
            err,
            LockScreenError::Defect(Defect::RepeatedInput {
                port: Port::Proximity,
                value: "near",
            })
        );
        // The engine released its receiver on the way out
        assert!(raw_tx.send(Arrival::now(Signal::Screen(Screen::Off))).is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_consumer_does_not_change_decisions() {
        let (mut adapters, inputs) = ports::ports(screen_on_locked());
        // Room for one event and nobody reading: the engine stalls on its
        // second send while the inputs below queue up
        let mut engine = LockScreenEngine::spawn(inputs, config(), 1);
        settle().await;

        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        tokio::time::sleep(LOCK / 2).await;
        adapters.publish(Signal::Proximity(Proximity::Far)).unwrap();
        tokio::time::sleep(LOCK / 10).await;
        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();

        // Well past every deadline armed from a stale clock
        tokio::time::sleep(LOCK * 3).await;

        let mut events = Vec::new();
        for _ in 0..4 {
            events.push(engine.recv().await.unwrap());
        }
        // Stamped order: Near@0, Far@500ms, Near@600ms; the second episode's
        // timer runs from 600ms and is long due by now
        assert_eq!(events, vec![Idle, BeforeLockScreen, Idle, BeforeLockScreen]);
        assert_eq!(engine.recv().await, Some(OnLockScreen));

        settle().await;
        assert_eq!(engine.try_recv(), None);
        let stats = engine.shutdown().await.unwrap();
        assert_eq!(stats.lock_timers_cancelled, 1);
        assert_eq!(stats.lock_timers_fired, 1);
        assert_eq!(stats.on_lock_emitted, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_uncover_queued_behind_full_buffer_cancels_lock() {
        let (mut adapters, inputs) = ports::ports(screen_on_locked());
        let mut engine = LockScreenEngine::spawn(inputs, config(), 1);
        settle().await;

        adapters.publish(Signal::Proximity(Proximity::Near)).unwrap();
        tokio::time::sleep(LOCK / 2).await;
        adapters.publish(Signal::Proximity(Proximity::Far)).unwrap();
        tokio::time::sleep(LOCK * 2).await;

        assert_eq!(engine.recv().await, Some(Idle));
        assert_eq!(engine.recv().await, Some(BeforeLockScreen));
        assert_eq!(engine.recv().await, Some(Idle));
        tokio::time::sleep(LOCK * 2).await;
        settle().await;
        assert_eq!(engine.try_recv(), None);

        let stats = engine.shutdown().await.unwrap();
        assert_eq!(stats.on_lock_emitted, 0);
        assert_eq!(stats.lock_timers_fired, 0);
        assert_eq!(stats.lock_timers_cancelled, 1);
    }
}
