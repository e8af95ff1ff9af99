//! Gating Evaluator
//!
//! Turns the live (keyguard, phone call) pair into the boolean that decides
//! whether proximity readings are acted on at all.
//!
//! | phone call | keyguard | active |
//! |---|---|---|
//! | ongoing | any | false |
//! | idle | locked | true, held |
//! | idle | unlocked | true, then false after the grace delay |
//!
//! Every change of either input re-evaluates the table from scratch. A
//! pending grace expiry belongs to the pair that armed it and is replaced on
//! re-evaluation, so it can never fire for a newer pair.

use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::model::{Keyguard, PhoneCall};
use crate::stats::EngineStats;

/// What a (keyguard, phone call) pair asks for
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateRule {
    /// Calls always win: no pocket locking during a call
    Inactive,
    /// Active for as long as the pair holds
    Held,
    /// Active now, inactive once the grace delay runs out
    Grace,
}

impl GateRule {
    pub fn for_inputs(keyguard: Keyguard, phone_call: PhoneCall) -> Self {
        match (phone_call, keyguard) {
            (PhoneCall::Ongoing, _) => GateRule::Inactive,
            (PhoneCall::Idle, Keyguard::Locked) => GateRule::Held,
            (PhoneCall::Idle, Keyguard::Unlocked) => GateRule::Grace,
        }
    }
}

#[derive(Debug)]
pub struct GatingEvaluator {
    keyguard: Keyguard,
    phone_call: PhoneCall,
    active: bool,
    grace_expires_at: Option<Instant>,
    grace_delay: Duration,
}

impl GatingEvaluator {
    pub fn new(
        keyguard: Keyguard,
        phone_call: PhoneCall,
        grace_delay: Duration,
        now: Instant,
        stats: &mut EngineStats,
    ) -> Self {
        let mut gating = Self {
            keyguard,
            phone_call,
            active: false,
            grace_expires_at: None,
            grace_delay,
        };
        gating.evaluate(now, stats);
        gating
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    /// When the unlock grace period runs out, if one is running
    pub fn deadline(&self) -> Option<Instant> {
        self.grace_expires_at
    }

    /// Apply a new pair and return the resulting active value
    pub fn update(
        &mut self,
        keyguard: Keyguard,
        phone_call: PhoneCall,
        now: Instant,
        stats: &mut EngineStats,
    ) -> bool {
        self.keyguard = keyguard;
        self.phone_call = phone_call;
        self.evaluate(now, stats);
        self.active
    }

    /// Expire the grace period if it is due. Returns true if it fired.
    pub fn expire(&mut self, now: Instant, stats: &mut EngineStats) -> bool {
        match self.grace_expires_at {
            Some(at) if at <= now => {
                self.grace_expires_at = None;
                self.active = false;
                stats.grace_timers_expired += 1;
                debug!(keyguard = %self.keyguard, "Unlock grace period over -> gating inactive");
                true
            }
            _ => false,
        }
    }

    /// Drop the evaluator, releasing its grace timer
    pub fn tear_down(mut self, stats: &mut EngineStats) {
        self.cancel_grace(stats);
    }

    fn evaluate(&mut self, now: Instant, stats: &mut EngineStats) {
        self.cancel_grace(stats);

        let rule = GateRule::for_inputs(self.keyguard, self.phone_call);
        match rule {
            GateRule::Inactive => self.active = false,
            GateRule::Held => self.active = true,
            GateRule::Grace => {
                self.active = true;
                self.grace_expires_at = Some(now + self.grace_delay);
                stats.grace_timers_armed += 1;
            }
        }

        debug!(
            keyguard = %self.keyguard,
            phone_call = %self.phone_call,
            ?rule,
            active = self.active,
            "Gating evaluated"
        );
    }

    fn cancel_grace(&mut self, stats: &mut EngineStats) {
        if self.grace_expires_at.take().is_some() {
            stats.grace_timers_cancelled += 1;
            trace!("Unlock grace timer cancelled");
        }
    }
}
