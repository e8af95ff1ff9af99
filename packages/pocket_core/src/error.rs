//! Error types.
//!
//! Preempted timers are ordinary control flow and never show up here. What
//! does show up is an upstream contract violation: a port repeating its
//! current value or the input stream ending.

use crate::model::Port;

/// Input-contract violations. These are fatal: the engine stops instead of
/// guessing what the adapter meant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum Defect {
    #[error("{port} port repeated its current value {value:?}")]
    RepeatedInput { port: Port, value: &'static str },

    #[error("input ports closed; input streams must never end")]
    InputsClosed,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LockScreenError {
    #[error("defect: {0}")]
    Defect(#[from] Defect),

    #[error("engine task failed: {0}")]
    TaskFailed(String),
}

impl LockScreenError {
    pub fn is_defect(&self) -> bool {
        matches!(self, LockScreenError::Defect(_))
    }
}

/// Adapter-side failures when publishing into a port
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortError {
    #[error("{0} port is disconnected from the engine")]
    Disconnected(Port),
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} value: {value:?}")]
pub struct ParseValueError {
    pub kind: &'static str,
    pub value: String,
}
