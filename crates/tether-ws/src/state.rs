//! Per-connection status machine.
//!
//! Every status change goes through [`ConnectionState::apply`]. It is pure:
//! it updates status and the reconnect-attempt counter and returns the
//! [`Effect`] the driver must carry out, so the whole reconnect policy is
//! testable without sockets or timers.
//!
//! ```text
//! Disconnected --Connect--> Connecting --Opened--> Connected
//! Connected    --ClosedClean--> Disconnected            (no retry)
//! Connected    --Lost--> Reconnecting | Failed
//! Connecting   --Lost--> Reconnecting | Failed
//! Reconnecting --RetryElapsed--> Connecting
//! Failed       --Connect--> Connecting                  (attempts reset)
//! any          --Close--> Disconnected
//! ```

use std::fmt;
use std::time::Duration;

use tether_core::BackoffPolicy;

/// Lifecycle status of one connection.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ConnectionStatus {
    /// Not connected and not trying to.
    #[default]
    Disconnected,
    /// An attempt is in progress.
    Connecting,
    /// Open; sends go straight to the socket.
    Connected,
    /// Waiting out a backoff delay before the next attempt.
    Reconnecting,
    /// Gave up after the maximum number of attempts.
    Failed,
}

impl ConnectionStatus {
    /// Lower-case label for logs and the CLI.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Disconnected => "disconnected",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Reconnecting => "reconnecting",
            Self::Failed => "failed",
        }
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Input to the machine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Trigger {
    /// Caller asked to connect.
    Connect,
    /// The socket opened.
    Opened,
    /// The peer closed with code 1000.
    ClosedClean,
    /// Abnormal close, transport error, or open timeout.
    Lost,
    /// The backoff timer fired.
    RetryElapsed,
    /// Caller closed the connection.
    Close,
}

/// Work the driver must do after a transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Effect {
    /// Nothing; the trigger did not apply in the current status.
    None,
    /// Start a connection attempt.
    Open,
    /// Start heartbeat and flush the outbound queue.
    StartSession,
    /// Sleep `delay`, then fire [`Trigger::RetryElapsed`].
    ScheduleRetry {
        /// Backoff delay.
        delay: Duration,
        /// One-based number of the retry about to happen.
        attempt: u32,
    },
    /// Stop retrying; terminal until the next explicit connect.
    GiveUp {
        /// Retries made before giving up.
        attempts: u32,
    },
    /// Tear down timers and the socket.
    Stop,
}

/// Result of applying one trigger.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Transition {
    /// Status before.
    pub from: ConnectionStatus,
    /// Status after.
    pub to: ConnectionStatus,
    /// Required follow-up.
    pub effect: Effect,
}

impl Transition {
    /// Whether the status actually changed.
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Status plus reconnect-attempt counter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ConnectionState {
    status: ConnectionStatus,
    attempts: u32,
}

impl ConnectionState {
    /// Current status.
    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    /// Reconnect attempts since the last successful open.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Apply a trigger.
    pub fn apply(&mut self, trigger: Trigger, policy: &BackoffPolicy) -> Transition {
        use ConnectionStatus as S;

        let from = self.status;
        let effect = match (from, trigger) {
            (S::Disconnected | S::Failed, Trigger::Connect) => {
                self.attempts = 0;
                self.status = S::Connecting;
                Effect::Open
            }
            (S::Connecting, Trigger::Opened) => {
                self.attempts = 0;
                self.status = S::Connected;
                Effect::StartSession
            }
            (S::Connecting | S::Connected, Trigger::ClosedClean) => {
                self.status = S::Disconnected;
                Effect::Stop
            }
            (S::Connecting | S::Connected, Trigger::Lost) => {
                if policy.allows(self.attempts) {
                    let delay = policy.delay_for(self.attempts);
                    self.attempts += 1;
                    self.status = S::Reconnecting;
                    Effect::ScheduleRetry {
                        delay,
                        attempt: self.attempts,
                    }
                } else {
                    self.status = S::Failed;
                    Effect::GiveUp {
                        attempts: self.attempts,
                    }
                }
            }
            (S::Reconnecting, Trigger::RetryElapsed) => {
                self.status = S::Connecting;
                Effect::Open
            }
            (S::Disconnected, Trigger::Close) => Effect::None,
            (_, Trigger::Close) => {
                self.status = S::Disconnected;
                Effect::Stop
            }
            _ => Effect::None,
        };

        Transition {
            from,
            to: self.status,
            effect,
        }
    }
}
