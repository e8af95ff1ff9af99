//! Device Signal Types
//!
//! Closed value sets for the four inputs and the lock-intent output.
//! Every type parses from and prints as the lowercase name used in
//! configuration and scripts (`near`, `before_lock_screen`, ...).

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ParseValueError;

/// Proximity sensor reading
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    Far,
    Near,
}

/// Display power state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    On,
    Off,
}

/// Telephony call state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PhoneCall {
    Idle,
    Ongoing,
}

/// Keyguard state
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyguard {
    Locked,
    Unlocked,
}

/// Lock intent emitted to the platform action layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LockScreenEvent {
    /// Nothing to do; any pending lock is off
    #[default]
    Idle,

    /// The sensor is covered and the lock delay is running
    BeforeLockScreen,

    /// The sensor stayed covered for the whole lock delay
    OnLockScreen,
}

/// Names an input category
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Port {
    Screen,
    Keyguard,
    PhoneCall,
    Proximity,
}

/// A single input change, as delivered by one of the four ports
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "port", content = "value", rename_all = "snake_case")]
pub enum Signal {
    Screen(Screen),
    Keyguard(Keyguard),
    PhoneCall(PhoneCall),
    Proximity(Proximity),
}

impl Signal {
    /// The port this signal arrives on
    pub fn port(&self) -> Port {
        match self {
            Signal::Screen(_) => Port::Screen,
            Signal::Keyguard(_) => Port::Keyguard,
            Signal::PhoneCall(_) => Port::PhoneCall,
            Signal::Proximity(_) => Port::Proximity,
        }
    }

    /// The carried value, in its lowercase form
    pub fn value_name(&self) -> &'static str {
        match self {
            Signal::Screen(v) => v.as_str(),
            Signal::Keyguard(v) => v.as_str(),
            Signal::PhoneCall(v) => v.as_str(),
            Signal::Proximity(v) => v.as_str(),
        }
    }
}

/// Current value of every input category.
///
/// There is never a moment without a value, so the orchestrator is seeded
/// with a full snapshot instead of waiting for first deliveries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub screen: Screen,
    pub keyguard: Keyguard,
    pub phone_call: PhoneCall,
    pub proximity: Proximity,
}

impl Default for Snapshot {
    fn default() -> Self {
        Self {
            screen: Screen::Off,
            keyguard: Keyguard::Locked,
            phone_call: PhoneCall::Idle,
            proximity: Proximity::Far,
        }
    }
}

impl Snapshot {
    /// Whether `signal` carries the value already held for its port
    pub fn holds(&self, signal: Signal) -> bool {
        match signal {
            Signal::Screen(v) => self.screen == v,
            Signal::Keyguard(v) => self.keyguard == v,
            Signal::PhoneCall(v) => self.phone_call == v,
            Signal::Proximity(v) => self.proximity == v,
        }
    }

    pub fn apply(&mut self, signal: Signal) {
        match signal {
            Signal::Screen(v) => self.screen = v,
            Signal::Keyguard(v) => self.keyguard = v,
            Signal::PhoneCall(v) => self.phone_call = v,
            Signal::Proximity(v) => self.proximity = v,
        }
    }
}

macro_rules! named_values {
    ($ty:ident, $kind:expr, { $($variant:ident => $name:literal),+ $(,)? }) => {
        impl $ty {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $($ty::$variant => $name,)+
                }
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl FromStr for $ty {
            type Err = ParseValueError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_ascii_lowercase().as_str() {
                    $($name => Ok($ty::$variant),)+
                    _ => Err(ParseValueError {
                        kind: $kind,
                        value: s.to_string(),
                    }),
                }
            }
        }
    };
}

named_values!(Proximity, "proximity", { Far => "far", Near => "near" });
named_values!(Screen, "screen", { On => "on", Off => "off" });
named_values!(PhoneCall, "call", { Idle => "idle", Ongoing => "ongoing" });
named_values!(Keyguard, "keyguard", { Locked => "locked", Unlocked => "unlocked" });
named_values!(LockScreenEvent, "event", {
    Idle => "idle",
    BeforeLockScreen => "before_lock_screen",
    OnLockScreen => "on_lock_screen",
});

impl fmt::Display for Port {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Port::Screen => "screen",
            Port::Keyguard => "keyguard",
            Port::PhoneCall => "phone_call",
            Port::Proximity => "proximity",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.port(), self.value_name())
    }
}
