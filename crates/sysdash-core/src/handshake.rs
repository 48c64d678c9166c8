use crate::wire::InboundMsg;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub const DEFAULT_HANDSHAKE_GRACE: Duration = Duration::from_millis(1_000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Connected, nothing heard yet.
    Pending { since: DateTime<Utc> },
    /// The server asked for the password; it must be the first frame sent.
    Authenticating,
}

/// Decides when the page subscription goes out on a fresh connection.
///
/// A password-protected server rejects any first frame other than
/// `password`, and a server that asks with `requestPageChange` expects one
/// answer. Everything else the server says first (except the response cache)
/// means it is ready. A server that stays silent is subscribed once the grace
/// period runs out.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Handshake {
    grace: chrono::Duration,
    phase: Phase,
}

impl Handshake {
    pub fn new(grace: Duration) -> Self {
        let grace = chrono::Duration::from_std(grace)
            .unwrap_or_else(|_| chrono::Duration::milliseconds(1_000));
        Self {
            grace,
            phase: Phase::Idle,
        }
    }

    pub fn opened(&mut self, now: DateTime<Utc>) {
        self.phase = Phase::Pending { since: now };
    }

    pub fn closed(&mut self) {
        self.phase = Phase::Idle;
    }

    pub fn is_pending(&self) -> bool {
        self.phase != Phase::Idle
    }

    /// When the silent-server fallback fires. `None` while idle or while a
    /// password answer is outstanding.
    pub fn deadline(&self) -> Option<DateTime<Utc>> {
        match self.phase {
            Phase::Pending { since } => since.checked_add_signed(self.grace),
            Phase::Idle | Phase::Authenticating => None,
        }
    }

    /// Called before `msg` is applied. Returns `true` when the caller must
    /// send the subscription first.
    ///
    /// `requestPageChange` completes the handshake without a separate send:
    /// the store's reply to it is the subscription.
    pub fn before_inbound(&mut self, msg: &InboundMsg) -> bool {
        if self.phase == Phase::Idle {
            return false;
        }
        match msg {
            InboundMsg::PasswordRequest => {
                self.phase = Phase::Authenticating;
                false
            }
            InboundMsg::ResponseMessageCache(_) | InboundMsg::Heartbeat => false,
            InboundMsg::RequestPageChange => {
                self.phase = Phase::Idle;
                false
            }
            _ => {
                self.phase = Phase::Idle;
                true
            }
        }
    }

    /// Returns `true` once when the grace period has run out at `now`.
    pub fn poll(&mut self, now: DateTime<Utc>) -> bool {
        match self.deadline() {
            Some(deadline) if deadline <= now => {
                self.phase = Phase::Idle;
                true
            }
            _ => false,
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self::new(DEFAULT_HANDSHAKE_GRACE)
    }
}
