use chrono::{DateTime, Utc};
use std::time::Duration;
use tracing::debug;

/// Rate-limit state of a discovery run
///
/// ```text
/// Idle --rate limited, short reset--> Throttled --ok--> Idle
///   |                                     |
///   +--rate limited, long/unknown reset---+--rate limited--> Stopped
/// ```
///
/// Stopped is terminal: nothing moves the run out of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleState {
    Idle,
    Throttled,
    Stopped,
}

/// What the caller should do after a rate-limit signal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleAction {
    /// Sleep this long, then retry the same request once
    Wait(Duration),
    /// Issue no further requests this run
    Stop,
}

#[derive(Debug, Clone)]
pub struct Throttle {
    state: ThrottleState,
    max_wait: Duration,
}

impl Throttle {
    /// `max_wait` is the longest reset the run is willing to sleep through
    pub fn new(max_wait: Duration) -> Self {
        Self {
            state: ThrottleState::Idle,
            max_wait,
        }
    }

    pub fn state(&self) -> ThrottleState {
        self.state
    }

    pub fn is_stopped(&self) -> bool {
        self.state == ThrottleState::Stopped
    }

    /// A request went through
    pub fn on_success(&mut self) {
        if self.state == ThrottleState::Throttled {
            debug!("Rate limit cleared, back to idle");
            self.state = ThrottleState::Idle;
        }
    }

    /// The remote side said slow down
    pub fn on_rate_limited(
        &mut self,
        reset_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> ThrottleAction {
        if self.state != ThrottleState::Idle {
            self.state = ThrottleState::Stopped;
            return ThrottleAction::Stop;
        }

        // A reset in the past means we can go again right away
        let wait = reset_at.map(|reset| (reset - now).to_std().unwrap_or(Duration::ZERO));

        match wait {
            Some(wait) if wait <= self.max_wait => {
                self.state = ThrottleState::Throttled;
                ThrottleAction::Wait(wait)
            }
            _ => {
                self.state = ThrottleState::Stopped;
                ThrottleAction::Stop
            }
        }
    }
}
