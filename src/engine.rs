/**
 * Runs drive commands on the robot. Every motion command only lasts for a
 * fixed time; if nothing new arrives before then, the wheels stop. That way a
 * dropped link can't leave the robot driving off on its own.
 */
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::driver::{MotorDriver, Wheel, WheelState};
use crate::pi_blaster_driver::PinConfig;


#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct ActuatorConfig {
    pub action_duration_ms: u64,
    pub tick_interval_ms: u64,
    pub device: String,
    pub pins: PinConfig,
}


impl Default for ActuatorConfig {
    fn default() -> ActuatorConfig {
        ActuatorConfig {
            action_duration_ms: 250,
            tick_interval_ms: 20,
            device: "/dev/pi-blaster".to_string(),
            pins: PinConfig::default(),
        }
    }
}


/**
 * A single pending stop deadline. Arming replaces whatever was pending.
 */
#[derive(Debug, Default)]
pub struct DeadManTimer {
    deadline: Option<Instant>,
}


impl DeadManTimer {
    pub fn arm(&mut self, deadline: Instant) {
        self.deadline = Some(deadline);
    }

    pub fn cancel(&mut self) {
        self.deadline = None;
    }

    pub fn is_armed(&self) -> bool {
        self.deadline.is_some()
    }

    /// Returns true exactly once, on the first check at or after the deadline.
    pub fn expired(&mut self, now: Instant) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                true
            }
            _ => false,
        }
    }
}


fn wheel_states(command: Command) -> (WheelState, WheelState) {
    // The motors are mounted so that reverse on both drives the robot forward
    match command {
        Command::MoveForward => (WheelState::Reverse, WheelState::Reverse),
        Command::TurnLeft => (WheelState::Reverse, WheelState::Forward),
        Command::TurnRight => (WheelState::Forward, WheelState::Reverse),
        Command::Stop => (WheelState::Stop, WheelState::Stop),
    }
}


pub struct Engine<D: MotorDriver> {
    driver: D,
    timer: DeadManTimer,
    action_duration: Duration,
}


impl<D: MotorDriver> Engine<D> {
    pub fn new(driver: D, action_duration: Duration) -> Engine<D> {
        Engine {
            driver: driver,
            timer: DeadManTimer::default(),
            action_duration: action_duration,
        }
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub fn is_armed(&self) -> bool {
        self.timer.is_armed()
    }

    /**
     * Parses and runs a raw payload. Garbage is logged and otherwise ignored.
     */
    pub fn handle_token(&mut self, token: &str, now: Instant) {
        match token.parse::<Command>() {
            Ok(command) => self.handle(command, now),
            Err(e) => error!("Ignoring message: {}", e),
        }
    }

    pub fn handle(&mut self, command: Command, now: Instant) {
        if command == Command::Stop {
            info!("Stop requested");
            self.stop();
            return;
        }
        info!("Running {} for {} ms", command, self.action_duration.as_millis());
        self.apply(command);
        self.timer.arm(now + self.action_duration);
    }

    /**
     * Stops the wheels if the last command has run out. Returns true if it
     * did.
     */
    pub fn tick(&mut self, now: Instant) -> bool {
        if self.timer.expired(now) {
            info!("No command for {} ms, stopping", self.action_duration.as_millis());
            self.apply(Command::Stop);
            return true;
        }
        false
    }

    pub fn stop(&mut self) {
        self.timer.cancel();
        self.apply(Command::Stop);
    }

    fn apply(&mut self, command: Command) {
        let (left, right) = wheel_states(command);
        self.driver.set_wheel(Wheel::Left, left);
        self.driver.set_wheel(Wheel::Right, right);
    }
}
