/**
 * Decides what the robot should be doing given where the target is. The
 * state persists across cycles; everything else is recomputed each frame.
 */
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::command::Command;
use crate::error::{Error, Result};
use crate::geometry::{Degrees, Pixels, TargetFix};

pub type Speed = f32;


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum NavigationState {
    Idle,
    Orienting,
    MovingForward,
    GoalReached,
}


impl fmt::Display for NavigationState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            NavigationState::Idle => "Idle",
            NavigationState::Orienting => "Orienting",
            NavigationState::MovingForward => "MovingForward",
            NavigationState::GoalReached => "GoalReached",
        };
        f.write_str(name)
    }
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub enum DriveIntent {
    Idle,
    TurnLeft(Speed),
    TurnRight(Speed),
    MoveForward(Speed),
    Stop,
}


impl DriveIntent {
    /// Idle and Stop look the same to the robot.
    pub fn command(&self) -> Command {
        match *self {
            DriveIntent::Idle | DriveIntent::Stop => Command::Stop,
            DriveIntent::TurnLeft(_) => Command::TurnLeft,
            DriveIntent::TurnRight(_) => Command::TurnRight,
            DriveIntent::MoveForward(_) => Command::MoveForward,
        }
    }

    pub fn name(&self) -> &'static str {
        match *self {
            DriveIntent::Idle => "idle",
            DriveIntent::TurnLeft(_) => "turn_left",
            DriveIntent::TurnRight(_) => "turn_right",
            DriveIntent::MoveForward(_) => "move_forward",
            DriveIntent::Stop => "stop",
        }
    }
}


#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Coarse tolerance for leaving Idle or GoalReached
    pub angle_tolerance_d: Degrees,
    /// Corridor the robot may stay in while already moving
    pub straight_angle_threshold_d: Degrees,
    pub distance_tolerance_px: Pixels,
    pub turn_speed: Speed,
    pub move_speed: Speed,
}


impl Default for NavigationConfig {
    fn default() -> NavigationConfig {
        NavigationConfig {
            angle_tolerance_d: 25.0,
            straight_angle_threshold_d: 30.0,
            distance_tolerance_px: 50.0,
            turn_speed: 0.5,
            move_speed: 1.0,
        }
    }
}


impl NavigationConfig {
    pub fn validate(&self) -> Result<()> {
        let fields = [
            ("angle_tolerance_d", self.angle_tolerance_d),
            ("straight_angle_threshold_d", self.straight_angle_threshold_d),
            ("distance_tolerance_px", self.distance_tolerance_px),
            ("turn_speed", self.turn_speed),
            ("move_speed", self.move_speed),
        ];
        for &(name, value) in fields.iter() {
            if !(value.is_finite() && value > 0.0) {
                return Err(Error::InvalidConfig(format!(
                    "navigation.{} must be positive, got {}", name, value)));
            }
        }
        if self.straight_angle_threshold_d < self.angle_tolerance_d {
            return Err(Error::InvalidConfig(format!(
                "navigation.straight_angle_threshold_d ({}) must be at least angle_tolerance_d ({})",
                self.straight_angle_threshold_d,
                self.angle_tolerance_d)));
        }
        Ok(())
    }
}


/**
 * A fix that can't be trusted is treated the same as no fix at all.
 */
fn usable(target: Option<TargetFix>) -> Option<TargetFix> {
    target.filter(|fix| {
        fix.bearing_d.is_finite() && fix.distance_px.is_finite() && fix.distance_px >= 0.0
    })
}


/**
 * One step of the state machine. Returns the new state and what to do about
 * it. States that hand off to another state evaluate that state in the same
 * step so that no cycle goes by without an intent.
 */
pub fn transition(
    state: NavigationState,
    target: Option<TargetFix>,
    config: &NavigationConfig,
) -> (NavigationState, DriveIntent) {
    let fix = match usable(target) {
        Some(fix) => fix,
        None => return (NavigationState::Idle, DriveIntent::Idle),
    };

    match state {
        NavigationState::Idle | NavigationState::GoalReached => arm(&fix, config),
        NavigationState::Orienting => orienting(&fix, config),
        NavigationState::MovingForward => moving_forward(&fix, config),
    }
}


fn arm(fix: &TargetFix, config: &NavigationConfig) -> (NavigationState, DriveIntent) {
    if fix.distance_px <= config.distance_tolerance_px {
        (NavigationState::GoalReached, DriveIntent::Stop)
    } else if fix.bearing_d.abs() <= config.straight_angle_threshold_d {
        moving_forward(fix, config)
    } else {
        // Past the corridor is past angle_tolerance_d too, since the corridor
        // is never narrower
        orienting(fix, config)
    }
}


fn orienting(fix: &TargetFix, config: &NavigationConfig) -> (NavigationState, DriveIntent) {
    if fix.bearing_d.abs() > config.straight_angle_threshold_d {
        let intent = if fix.bearing_d > 0.0 {
            DriveIntent::TurnLeft(config.turn_speed)
        } else {
            DriveIntent::TurnRight(config.turn_speed)
        };
        (NavigationState::Orienting, intent)
    } else {
        moving_forward(fix, config)
    }
}


fn moving_forward(fix: &TargetFix, config: &NavigationConfig) -> (NavigationState, DriveIntent) {
    if fix.distance_px <= config.distance_tolerance_px {
        (NavigationState::GoalReached, DriveIntent::Stop)
    } else if fix.bearing_d.abs() > config.straight_angle_threshold_d {
        orienting(fix, config)
    } else {
        (NavigationState::MovingForward, DriveIntent::MoveForward(config.move_speed))
    }
}


pub struct NavigationFsm {
    state: NavigationState,
    config: NavigationConfig,
}


impl NavigationFsm {
    pub fn new(config: NavigationConfig) -> Result<NavigationFsm> {
        config.validate()?;
        Ok(NavigationFsm {
            state: NavigationState::Idle,
            config: config,
        })
    }

    pub fn state(&self) -> NavigationState {
        self.state
    }

    /**
     * Advances the state machine by one control cycle. `None` means there is
     * no target this cycle.
     */
    pub fn update(&mut self, target: Option<TargetFix>) -> DriveIntent {
        let (next, intent) = transition(self.state, target, &self.config);
        if next != self.state {
            debug!("Navigation {} -> {}", self.state, next);
        }
        self.state = next;
        intent
    }
}
