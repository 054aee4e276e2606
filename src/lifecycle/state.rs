//! Pure session state and retry decisions
//!
//! Every transition of the connection state machine lives here as a plain
//! method so it can be tested without a broker or a runtime. The reactor in
//! the parent module only performs the I/O these methods ask for.

use std::fmt;
use std::time::Duration;

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LifecycleState {
    #[default]
    Idle,
    Connecting,
    Connected,
    Subscribing,
    Subscribed,
    Reconnecting,
    Disconnecting,
    Terminated,
    Failed,
}

impl LifecycleState {
    /// Whether the broker currently holds an accepted session for us
    pub fn is_connected(&self) -> bool {
        matches!(
            self,
            LifecycleState::Connected | LifecycleState::Subscribing | LifecycleState::Subscribed
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LifecycleState::Idle => "idle",
            LifecycleState::Connecting => "connecting",
            LifecycleState::Connected => "connected",
            LifecycleState::Subscribing => "subscribing",
            LifecycleState::Subscribed => "subscribed",
            LifecycleState::Reconnecting => "reconnecting",
            LifecycleState::Disconnecting => "disconnecting",
            LifecycleState::Terminated => "terminated",
            LifecycleState::Failed => "failed",
        }
    }
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bounded fixed-delay reconnect policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Consecutive connect failures tolerated; one more gives up
    pub max_attempts: u32,
    /// Pause before each reconnect
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            delay: Duration::from_millis(2500),
        }
    }
}

/// What to do after a failed connect or a lost connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Reconnect after `delay`; `attempt` is the retry counter after the update
    Retry { attempt: u32, delay: Duration },
    /// Retry budget exhausted after `attempts` failed connects
    GiveUp { attempts: u32 },
}

/// State owned by the lifecycle: current state plus the retry counter
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionState {
    state: LifecycleState,
    retry_count: u32,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> LifecycleState {
        self.state
    }

    pub fn retry_count(&self) -> u32 {
        self.retry_count
    }

    /// Idle or Reconnecting → Connecting
    pub fn begin_connecting(&mut self) {
        self.state = LifecycleState::Connecting;
    }

    /// Connecting → Connected; returns false for a notification that doesn't apply
    pub fn on_connect_success(&mut self) -> bool {
        if self.state != LifecycleState::Connecting {
            return false;
        }
        self.state = LifecycleState::Connected;
        true
    }

    /// Connected → Subscribing, once the subscribe requests are going out
    pub fn begin_subscribing(&mut self) {
        if self.state == LifecycleState::Connected {
            self.state = LifecycleState::Subscribing;
        }
    }

    /// Subscribing → Subscribed; repeated grants while Subscribed are accepted
    pub fn on_subscribe_success(&mut self) -> bool {
        match self.state {
            LifecycleState::Subscribing => {
                self.state = LifecycleState::Subscribed;
                true
            }
            LifecycleState::Subscribed => true,
            _ => false,
        }
    }

    /// Connecting → Reconnecting, or → Failed once the counter passes the bound.
    ///
    /// Returns `None` when no connect attempt is pending.
    pub fn on_connect_failure(&mut self, policy: &RetryPolicy) -> Option<RetryDecision> {
        if self.state != LifecycleState::Connecting {
            return None;
        }

        self.retry_count += 1;
        if self.retry_count > policy.max_attempts {
            self.state = LifecycleState::Failed;
            return Some(RetryDecision::GiveUp {
                attempts: self.retry_count,
            });
        }

        self.state = LifecycleState::Reconnecting;
        Some(RetryDecision::Retry {
            attempt: self.retry_count,
            delay: policy.delay,
        })
    }

    /// Connected/Subscribing/Subscribed → Reconnecting with a fresh retry budget.
    ///
    /// Returns `None` when there was no established session to lose.
    pub fn on_connection_lost(&mut self, policy: &RetryPolicy) -> Option<RetryDecision> {
        if !self.state.is_connected() {
            return None;
        }

        self.retry_count = 0;
        self.state = LifecycleState::Reconnecting;
        Some(RetryDecision::Retry {
            attempt: 0,
            delay: policy.delay,
        })
    }

    pub fn begin_disconnecting(&mut self) {
        self.state = LifecycleState::Disconnecting;
    }

    pub fn terminate(&mut self) {
        self.state = LifecycleState::Terminated;
    }

    pub fn fail(&mut self) {
        self.state = LifecycleState::Failed;
    }
}
