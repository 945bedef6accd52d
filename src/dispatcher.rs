/**
 * Decides when a command actually goes out. Commands are throttled to one
 * per interval, except that stopping a moving robot never waits.
 */
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::transport::Transport;


#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub min_interval_ms: u64,
}


impl Default for DispatchConfig {
    fn default() -> DispatchConfig {
        DispatchConfig { min_interval_ms: 2000 }
    }
}


/// What was last handed to the transport successfully, and when.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct DispatchState {
    pub last_sent: Option<Command>,
    pub last_send: Option<Instant>,
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Decision {
    /// Stop a robot that was last told to move, right now
    SendUrgent,
    Send,
    /// Too soon since the last send
    Throttle,
    /// The robot was already told to stop
    Suppress,
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    Sent { urgent: bool },
    Failed,
    Throttled,
    Suppressed,
}


impl DispatchOutcome {
    pub fn name(&self) -> &'static str {
        match *self {
            DispatchOutcome::Sent { urgent: true } => "sent (urgent)",
            DispatchOutcome::Sent { urgent: false } => "sent",
            DispatchOutcome::Failed => "send failed",
            DispatchOutcome::Throttled => "throttled",
            DispatchOutcome::Suppressed => "suppressed",
        }
    }
}


pub struct CommandDispatcher {
    min_interval: Duration,
    state: DispatchState,
}


impl CommandDispatcher {
    pub fn new(config: &DispatchConfig) -> CommandDispatcher {
        CommandDispatcher::with_interval(Duration::from_millis(config.min_interval_ms))
    }

    pub fn with_interval(min_interval: Duration) -> CommandDispatcher {
        CommandDispatcher {
            min_interval: min_interval,
            state: DispatchState::default(),
        }
    }

    pub fn state(&self) -> &DispatchState {
        &self.state
    }

    fn interval_elapsed(&self, now: Instant) -> bool {
        match self.state.last_send {
            Some(last_send) => now.saturating_duration_since(last_send) >= self.min_interval,
            None => true,
        }
    }

    /**
     * Works out what to do with `desired` without touching any state.
     */
    pub fn decide(&self, desired: Command, now: Instant) -> Decision {
        let last_sent = self.state.last_sent;
        if !desired.is_motion() {
            return if last_sent != Some(desired) {
                Decision::SendUrgent
            } else {
                Decision::Suppress
            };
        }
        if !self.interval_elapsed(now) {
            return Decision::Throttle;
        }
        // Changed or not, motion goes out every interval; the robot stops by
        // itself if it doesn't hear from us
        Decision::Send
    }

    /**
     * Sends `desired` if the policy says so. The state only changes when the
     * transport accepts the command, so a failure is retried next cycle.
     */
    pub fn dispatch(
        &mut self,
        desired: Command,
        now: Instant,
        transport: &mut dyn Transport,
    ) -> DispatchOutcome {
        let urgent = match self.decide(desired, now) {
            Decision::SendUrgent => true,
            Decision::Send => false,
            Decision::Throttle => return DispatchOutcome::Throttled,
            Decision::Suppress => return DispatchOutcome::Suppressed,
        };

        match transport.send(desired) {
            Ok(_) => {
                if urgent {
                    info!("Sent {} immediately", desired);
                } else {
                    debug!("Sent {}", desired);
                }
                self.state = DispatchState {
                    last_sent: Some(desired),
                    last_send: Some(now),
                };
                DispatchOutcome::Sent { urgent: urgent }
            }
            Err(e) => {
                warn!("Unable to send {}: {}", desired, e);
                DispatchOutcome::Failed
            }
        }
    }
}
