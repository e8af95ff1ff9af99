use std::time::Duration;

/// Timer durations for the engine.
///
/// Both are required; picking defaults is the job of whoever embeds the
/// engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LockScreenConfig {
    /// How long the sensor must stay covered before `OnLockScreen`
    pub lock_screen_delay: Duration,
    /// How long gating stays active after the keyguard is unlocked
    pub unlock_grace_delay: Duration,
}

impl LockScreenConfig {
    pub fn new(lock_screen_delay: Duration, unlock_grace_delay: Duration) -> Self {
        Self {
            lock_screen_delay,
            unlock_grace_delay,
        }
    }
}
