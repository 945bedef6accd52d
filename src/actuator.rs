/**
 * The robot's receive loop: take commands off the link, hand them to the
 * engine, and keep the dead-man deadline ticking in between.
 */
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::config::Config;
use crate::driver::MotorDriver;
use crate::engine::Engine;
use crate::error::Result;
use crate::transport::{CommandReceiver, Poll, reconnect_with_retries};


pub struct Actuator<D: MotorDriver, R: CommandReceiver> {
    engine: Engine<D>,
    receiver: R,
    tick_interval: Duration,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
}


impl<D: MotorDriver, R: CommandReceiver> Actuator<D, R> {
    pub fn new(engine: Engine<D>, receiver: R, config: &Config) -> Actuator<D, R> {
        Actuator {
            engine: engine,
            receiver: receiver,
            tick_interval: Duration::from_millis(config.actuator.tick_interval_ms),
            max_reconnect_attempts: config.control.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.control.reconnect_delay_ms),
        }
    }

    pub fn engine(&self) -> &Engine<D> {
        &self.engine
    }

    pub fn receiver(&self) -> &R {
        &self.receiver
    }

    /**
     * Runs commands until `quit` is set or the link can't be brought back.
     * The wheels are stopped on the way out either way.
     */
    pub fn run(&mut self, quit: &AtomicBool) -> Result<()> {
        info!("Actuator ready");
        let result = self.serve(quit);
        self.engine.stop();
        self.receiver.disconnect();
        result
    }

    fn serve(&mut self, quit: &AtomicBool) -> Result<()> {
        while !quit.load(Ordering::SeqCst) {
            match self.receiver.poll(self.tick_interval) {
                Poll::Token(token) => self.engine.handle_token(&token, Instant::now()),
                Poll::Idle => (),
                Poll::Disconnected => {
                    // No point waiting out the deadline with nobody steering
                    self.engine.stop();
                    let receiver = &mut self.receiver;
                    reconnect_with_retries(
                        || receiver.reconnect(),
                        self.max_reconnect_attempts,
                        self.reconnect_delay)?;
                }
            }
            self.engine.tick(Instant::now());
        }
        info!("Quit requested");
        Ok(())
    }
}


#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use super::Actuator;
    use crate::config::Config;
    use crate::driver::{MotorDriver, Wheel, WheelState};
    use crate::engine::Engine;
    use crate::error::{Error, Result};
    use crate::transport::{CommandReceiver, Poll};

    /// Remembers every wheel change.
    struct RecordingDriver {
        left: WheelState,
        right: WheelState,
        history: Vec<(WheelState, WheelState)>,
    }
    impl MotorDriver for RecordingDriver {
        fn set_wheel(&mut self, wheel: Wheel, state: WheelState) {
            match wheel {
                Wheel::Left => self.left = state,
                // Both wheels are always set left then right
                Wheel::Right => {
                    self.right = state;
                    self.history.push((self.left, self.right));
                }
            }
        }
        fn wheel(&self, wheel: Wheel) -> WheelState {
            match wheel {
                Wheel::Left => self.left,
                Wheel::Right => self.right,
            }
        }
    }

    /// Plays back polls, then asks the loop to quit.
    struct ScriptedReceiver {
        script: VecDeque<Poll>,
        quit: Arc<AtomicBool>,
        reconnect_works: bool,
        reconnects: u32,
        disconnected: bool,
    }
    impl CommandReceiver for ScriptedReceiver {
        fn poll(&mut self, _timeout: Duration) -> Poll {
            match self.script.pop_front() {
                Some(poll) => poll,
                None => {
                    self.quit.store(true, Ordering::SeqCst);
                    Poll::Idle
                }
            }
        }
        fn reconnect(&mut self) -> Result<()> {
            self.reconnects += 1;
            if self.reconnect_works { Ok(()) } else { Err(Error::NotConnected) }
        }
        fn disconnect(&mut self) { self.disconnected = true; }
    }

    fn actuator(script: Vec<Poll>, reconnect_works: bool, quit: &Arc<AtomicBool>)
        -> Actuator<RecordingDriver, ScriptedReceiver>
    {
        let mut config = Config::default();
        config.control.max_reconnect_attempts = 3;
        config.control.reconnect_delay_ms = 1;
        // Long enough that the dead-man never fires during a test
        let engine = Engine::new(
            RecordingDriver { left: WheelState::Stop, right: WheelState::Stop, history: Vec::new() },
            Duration::from_secs(60));
        let receiver = ScriptedReceiver {
            script: script.into_iter().collect(),
            quit: Arc::clone(quit),
            reconnect_works: reconnect_works,
            reconnects: 0,
            disconnected: false,
        };
        Actuator::new(engine, receiver, &config)
    }

    fn history(actuator: &Actuator<RecordingDriver, ScriptedReceiver>) -> Vec<(WheelState, WheelState)> {
        actuator.engine().driver().history.clone()
    }

    #[test]
    fn test_runs_tokens() {
        let quit = Arc::new(AtomicBool::new(false));
        let mut actuator = actuator(
            vec![
                Poll::Token("turn_left".to_string()),
                Poll::Idle,
                Poll::Token("not_a_command".to_string()),
                Poll::Token("move_forward".to_string()),
            ],
            true,
            &quit);
        assert!(actuator.run(&quit).is_ok());
        assert!(history(&actuator) == vec![
            (WheelState::Reverse, WheelState::Forward),
            (WheelState::Reverse, WheelState::Reverse),
            // Stopped on the way out
            (WheelState::Stop, WheelState::Stop),
        ]);
        assert!(!actuator.engine().is_armed());
        assert!(actuator.receiver().disconnected);
    }

    #[test]
    fn test_link_loss_stops_then_reconnects() {
        let quit = Arc::new(AtomicBool::new(false));
        let mut actuator = actuator(
            vec![
                Poll::Token("move_forward".to_string()),
                Poll::Disconnected,
                Poll::Token("turn_right".to_string()),
            ],
            true,
            &quit);
        assert!(actuator.run(&quit).is_ok());
        assert!(history(&actuator) == vec![
            (WheelState::Reverse, WheelState::Reverse),
            (WheelState::Stop, WheelState::Stop),
            (WheelState::Forward, WheelState::Reverse),
            (WheelState::Stop, WheelState::Stop),
        ]);
        assert!(actuator.receiver().reconnects == 1);
    }

    #[test]
    fn test_link_loss_is_fatal_after_retries() {
        let quit = Arc::new(AtomicBool::new(false));
        let mut actuator = actuator(
            vec![
                Poll::Token("move_forward".to_string()),
                Poll::Disconnected,
                Poll::Token("turn_left".to_string()),
            ],
            false,
            &quit);
        match actuator.run(&quit) {
            Err(Error::ConnectionLost { attempts: 3 }) => (),
            _ => panic!("Expected the actuator to give up"),
        }
        assert!(actuator.receiver().reconnects == 3);
        // The turn after the link went down never ran
        assert!(history(&actuator) == vec![
            (WheelState::Reverse, WheelState::Reverse),
            (WheelState::Stop, WheelState::Stop),
            (WheelState::Stop, WheelState::Stop),
        ]);
        assert!(actuator.receiver().disconnected);
    }

    #[test]
    fn test_quit_before_start() {
        let quit = Arc::new(AtomicBool::new(true));
        let mut actuator = actuator(vec![Poll::Token("move_forward".to_string())], true, &quit);
        assert!(actuator.run(&quit).is_ok());
        assert!(history(&actuator) == vec![(WheelState::Stop, WheelState::Stop)]);
    }
}
