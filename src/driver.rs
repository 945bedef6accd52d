use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Wheel {
    Left,
    Right,
}


#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WheelState {
    Forward,
    Reverse,
    Stop,
}


impl fmt::Display for WheelState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match *self {
            WheelState::Forward => "forward",
            WheelState::Reverse => "reverse",
            WheelState::Stop => "stop",
        };
        f.write_str(name)
    }
}


/// Provides an interface to drive the wheels.
pub trait MotorDriver {
    fn set_wheel(&mut self, wheel: Wheel, state: WheelState);
    fn wheel(&self, wheel: Wheel) -> WheelState;
}


/**
 * Remembers and logs wheel states without touching any hardware.
 */
pub struct LogDriver {
    left: WheelState,
    right: WheelState,
}


impl LogDriver {
    pub fn new() -> LogDriver {
        LogDriver {
            left: WheelState::Stop,
            right: WheelState::Stop,
        }
    }
}


impl MotorDriver for LogDriver {
    fn set_wheel(&mut self, wheel: Wheel, state: WheelState) {
        debug!("{:?} wheel {}", wheel, state);
        match wheel {
            Wheel::Left => self.left = state,
            Wheel::Right => self.right = state,
        }
    }

    fn wheel(&self, wheel: Wheel) -> WheelState {
        match wheel {
            Wheel::Left => self.left,
            Wheel::Right => self.right,
        }
    }
}
