use std::fs::OpenOptions;
use std::io::Write;

use serde::{Deserialize, Serialize};

use crate::driver::{MotorDriver, Wheel, WheelState};
use crate::error::Result;

pub type GpioPin = u8;


/// BCM pin numbers of the H-bridge.
#[derive(Clone, Debug, Deserialize, Serialize)]
#[serde(default)]
pub struct PinConfig {
    pub in1: GpioPin,
    pub in2: GpioPin,
    pub in3: GpioPin,
    pub in4: GpioPin,
    pub ena: GpioPin,
    pub enb: GpioPin,
}


impl Default for PinConfig {
    fn default() -> PinConfig {
        PinConfig {
            in1: 12,
            in2: 13,
            in3: 20,
            in4: 21,
            ena: 6,
            enb: 26,
        }
    }
}


/// Sends pin levels to the pi-blaster daemon.
pub struct PiBlasterDriver {
    left: WheelState,
    right: WheelState,
    pins: PinConfig,
    blaster: Box<dyn Write + Send>,
}

impl PiBlasterDriver {
    pub fn open(device: &str, pins: PinConfig) -> Result<PiBlasterDriver> {
        let blaster = OpenOptions::new().write(true).open(device)?;
        info!("Opened {}", device);
        Ok(PiBlasterDriver::new(Box::new(blaster), pins))
    }

    pub fn new(blaster: Box<dyn Write + Send>, pins: PinConfig) -> PiBlasterDriver {
        let mut driver = PiBlasterDriver {
            left: WheelState::Stop,
            right: WheelState::Stop,
            pins: pins,
            blaster: blaster,
        };
        // Both bridges stay enabled; direction pins do the work
        let (ena, enb) = (driver.pins.ena, driver.pins.enb);
        driver.write_pin(ena, true);
        driver.write_pin(enb, true);
        driver.set_wheel(Wheel::Left, WheelState::Stop);
        driver.set_wheel(Wheel::Right, WheelState::Stop);
        driver
    }
}

impl MotorDriver for PiBlasterDriver {
    fn set_wheel(&mut self, wheel: Wheel, state: WheelState) {
        // The right side is wired the other way around
        let (pin_a, pin_b) = match wheel {
            Wheel::Left => (self.pins.in1, self.pins.in2),
            Wheel::Right => (self.pins.in4, self.pins.in3),
        };
        let (level_a, level_b) = match state {
            WheelState::Forward => (true, false),
            WheelState::Reverse => (false, true),
            WheelState::Stop => (false, false),
        };
        self.write_pin(pin_a, level_a);
        self.write_pin(pin_b, level_b);
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


impl PiBlasterDriver {
    fn write_pin(&mut self, pin: GpioPin, high: bool) {
        let message = format_pin(pin, high);
        match self.blaster.write_all(message.as_bytes()).and_then(|_| self.blaster.flush()) {
            Ok(_) => (),
            Err(err) => error!("Unable to set pin {}: {}", pin, err),
        }
    }
}


fn format_pin(pin: GpioPin, high: bool) -> String {
    format!("{}={}\n", pin, if high { 1 } else { 0 })
}


#[cfg(test)]
mod tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};

    use super::{PiBlasterDriver, PinConfig, format_pin};
    use crate::driver::{MotorDriver, Wheel, WheelState};

    #[derive(Clone)]
    struct SharedBuffer {
        data: Arc<Mutex<Vec<u8>>>,
    }
    impl Write for SharedBuffer {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.data.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> { Ok(()) }
    }
    impl SharedBuffer {
        fn take(&self) -> String {
            let mut data = self.data.lock().unwrap();
            let text = String::from_utf8(data.clone()).unwrap();
            data.clear();
            text
        }
    }

    fn driver() -> (PiBlasterDriver, SharedBuffer) {
        let buffer = SharedBuffer { data: Arc::new(Mutex::new(Vec::new())) };
        let driver = PiBlasterDriver::new(Box::new(buffer.clone()), PinConfig::default());
        (driver, buffer)
    }

    #[test]
    fn test_format_pin() {
        assert!(format_pin(12, true) == "12=1\n");
        assert!(format_pin(21, false) == "21=0\n");
    }

    #[test]
    fn test_startup_enables_and_stops() {
        let (driver, buffer) = driver();
        assert!(buffer.take() == "6=1\n26=1\n12=0\n13=0\n21=0\n20=0\n");
        assert!(driver.wheel(Wheel::Left) == WheelState::Stop);
        assert!(driver.wheel(Wheel::Right) == WheelState::Stop);
    }

    #[test]
    fn test_wheel_pins() {
        let (mut driver, buffer) = driver();
        buffer.take();

        driver.set_wheel(Wheel::Left, WheelState::Forward);
        assert!(buffer.take() == "12=1\n13=0\n");
        driver.set_wheel(Wheel::Left, WheelState::Reverse);
        assert!(buffer.take() == "12=0\n13=1\n");
        driver.set_wheel(Wheel::Right, WheelState::Forward);
        assert!(buffer.take() == "21=1\n20=0\n");
        driver.set_wheel(Wheel::Right, WheelState::Stop);
        assert!(buffer.take() == "21=0\n20=0\n");

        assert!(driver.wheel(Wheel::Left) == WheelState::Reverse);
        assert!(driver.wheel(Wheel::Right) == WheelState::Stop);
    }
}
