//! Input Ports
//!
//! Each input category gets an [`InputPort`] held by the platform adapter.
//! A port remembers the last value it published and only forwards changes,
//! so the engine sees distinct values per category.
//!
//! All four ports feed one ordered channel, received by the engine through
//! [`LockScreenInputs`]. Changes on different ports therefore reach the
//! engine in exactly the order they were published, one at a time.
//!
//! Every change is stamped with the instant it was published. The engine
//! applies it at that instant, so a change queued behind a slow event
//! consumer still cancels a timer that was due after it.

use std::fmt;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::PortError;
use crate::model::{Keyguard, PhoneCall, Port, Proximity, Screen, Signal, Snapshot};

/// A value that travels over one of the four ports
pub trait PortValue: Copy + Eq + fmt::Debug + Send + 'static {
    const PORT: Port;

    fn into_signal(self) -> Signal;
}

impl PortValue for Screen {
    const PORT: Port = Port::Screen;

    fn into_signal(self) -> Signal {
        Signal::Screen(self)
    }
}

impl PortValue for Keyguard {
    const PORT: Port = Port::Keyguard;

    fn into_signal(self) -> Signal {
        Signal::Keyguard(self)
    }
}

impl PortValue for PhoneCall {
    const PORT: Port = Port::PhoneCall;

    fn into_signal(self) -> Signal {
        Signal::PhoneCall(self)
    }
}

impl PortValue for Proximity {
    const PORT: Port = Port::Proximity;

    fn into_signal(self) -> Signal {
        Signal::Proximity(self)
    }
}

/// One input change with its publish time
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Arrival {
    pub signal: Signal,
    pub at: Instant,
}

impl Arrival {
    pub fn new(signal: Signal, at: Instant) -> Self {
        Self { signal, at }
    }

    /// Stamp `signal` with the current time
    pub fn now(signal: Signal) -> Self {
        Self::new(signal, Instant::now())
    }
}

/// Adapter side of one input category
#[derive(Debug)]
pub struct InputPort<T> {
    tx: mpsc::UnboundedSender<Arrival>,
    last: T,
}

impl<T: PortValue> InputPort<T> {
    pub fn current(&self) -> T {
        self.last
    }

    /// Publish a new reading. Returns `Ok(false)` when the value equals the
    /// last published one and nothing was sent.
    pub fn publish(&mut self, value: T) -> Result<bool, PortError> {
        if value == self.last {
            return Ok(false);
        }
        self.tx
            .send(Arrival::now(value.into_signal()))
            .map_err(|_| PortError::Disconnected(T::PORT))?;
        self.last = value;
        Ok(true)
    }

    pub fn is_connected(&self) -> bool {
        !self.tx.is_closed()
    }
}

/// Engine side: the construction snapshot plus every later change in
/// arrival order
#[derive(Debug)]
pub struct LockScreenInputs {
    initial: Snapshot,
    rx: mpsc::UnboundedReceiver<Arrival>,
}

impl LockScreenInputs {
    /// Wrap a raw signal channel. Nothing filters repeats on this path, so
    /// a sender that repeats a value trips [`crate::Defect::RepeatedInput`].
    pub fn from_channel(initial: Snapshot, rx: mpsc::UnboundedReceiver<Arrival>) -> Self {
        Self { initial, rx }
    }

    pub fn snapshot(&self) -> Snapshot {
        self.initial
    }

    /// Next change; `None` once every port is gone
    pub async fn recv(&mut self) -> Option<Arrival> {
        self.rx.recv().await
    }
}

/// The four adapter-side ports
#[derive(Debug)]
pub struct LockScreenPorts {
    pub screen: InputPort<Screen>,
    pub keyguard: InputPort<Keyguard>,
    pub phone_call: InputPort<PhoneCall>,
    pub proximity: InputPort<Proximity>,
}

impl LockScreenPorts {
    /// Route a typed signal to its port
    pub fn publish(&mut self, signal: Signal) -> Result<bool, PortError> {
        match signal {
            Signal::Screen(v) => self.screen.publish(v),
            Signal::Keyguard(v) => self.keyguard.publish(v),
            Signal::PhoneCall(v) => self.phone_call.publish(v),
            Signal::Proximity(v) => self.proximity.publish(v),
        }
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            screen: self.screen.current(),
            keyguard: self.keyguard.current(),
            phone_call: self.phone_call.current(),
            proximity: self.proximity.current(),
        }
    }
}

/// Create the four ports and the engine-side receiver from one snapshot
pub fn ports(initial: Snapshot) -> (LockScreenPorts, LockScreenInputs) {
    let (tx, rx) = mpsc::unbounded_channel();

    (
        LockScreenPorts {
            screen: InputPort {
                tx: tx.clone(),
                last: initial.screen,
            },
            keyguard: InputPort {
                tx: tx.clone(),
                last: initial.keyguard,
            },
            phone_call: InputPort {
                tx: tx.clone(),
                last: initial.phone_call,
            },
            proximity: InputPort {
                tx,
                last: initial.proximity,
            },
        },
        LockScreenInputs::from_channel(initial, rx),
    )
}
