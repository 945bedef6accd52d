/**
 * The station's control loop: look at a frame, work out where the target is,
 * decide what to do about it and tell the robot.
 */
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use crate::command::Command;
use crate::config::Config;
use crate::dispatcher::{CommandDispatcher, DispatchOutcome};
use crate::error::Result;
use crate::frame_source::FrameSource;
use crate::geometry::{Geometry, MarkerObservations, estimate, heading_degrees};
use crate::navigation::{DriveIntent, NavigationFsm, NavigationState};
use crate::transport::{Transport, reconnect_with_retries};
use crate::vision::{MarkerDetector, VisionConfig, observe};


/// Everything that happened in one control cycle.
#[derive(Clone, Copy, Debug)]
pub struct CycleReport {
    pub geometry: Geometry,
    pub state: NavigationState,
    pub intent: DriveIntent,
    pub command: Command,
    pub outcome: DispatchOutcome,
    pub last_sent: Option<Command>,
}


fn format_optional(value: Option<f32>) -> String {
    match value {
        Some(value) => format!("{:.1}", value),
        None => "-".to_string(),
    }
}


impl fmt::Display for CycleReport {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "heading={} distance={} bearing={} state={} intent={} outcome={} last_sent={}",
            format_optional(self.geometry.pose.and_then(|pose| heading_degrees(&pose))),
            format_optional(self.geometry.distance_px),
            format_optional(self.geometry.bearing_d),
            self.state,
            self.intent.name(),
            self.outcome.name(),
            match self.last_sent {
                Some(command) => command.token(),
                None => "-",
            })
    }
}


pub struct ControlContext {
    pub navigation: NavigationFsm,
    pub dispatcher: CommandDispatcher,
}


impl ControlContext {
    pub fn new(navigation: NavigationFsm, dispatcher: CommandDispatcher) -> ControlContext {
        ControlContext {
            navigation: navigation,
            dispatcher: dispatcher,
        }
    }

    pub fn from_config(config: &Config) -> Result<ControlContext> {
        Ok(ControlContext::new(
            NavigationFsm::new(config.navigation.clone())?,
            CommandDispatcher::new(&config.dispatch)))
    }

    /**
     * Runs one cycle on what the detector saw. Never blocks; a send that
     * fails is left for the next cycle to retry.
     */
    pub fn cycle(
        &mut self,
        observations: &MarkerObservations,
        now: Instant,
        transport: &mut dyn Transport,
    ) -> CycleReport {
        let geometry = estimate(observations);
        let intent = self.navigation.update(geometry.target_fix());
        let command = intent.command();
        let outcome = self.dispatcher.dispatch(command, now, transport);
        CycleReport {
            geometry: geometry,
            state: self.navigation.state(),
            intent: intent,
            command: command,
            outcome: outcome,
            last_sent: self.dispatcher.state().last_sent,
        }
    }
}


#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunSummary {
    pub cycles: u64,
    pub sent: u64,
    pub failed: u64,
    pub final_state: NavigationState,
    pub last_sent: Option<Command>,
}


impl RunSummary {
    fn new() -> RunSummary {
        RunSummary {
            cycles: 0,
            sent: 0,
            failed: 0,
            final_state: NavigationState::Idle,
            last_sent: None,
        }
    }

    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        match report.outcome {
            DispatchOutcome::Sent { .. } => self.sent += 1,
            DispatchOutcome::Failed => self.failed += 1,
            _ => (),
        }
        self.final_state = report.state;
        self.last_sent = report.last_sent;
    }
}


pub struct ControlLoop<S: FrameSource, D: MarkerDetector, T: Transport> {
    context: ControlContext,
    source: S,
    detector: D,
    transport: T,
    vision: VisionConfig,
    max_reconnect_attempts: u32,
    reconnect_delay: Duration,
}


impl<S: FrameSource, D: MarkerDetector, T: Transport> ControlLoop<S, D, T> {
    pub fn new(
        context: ControlContext,
        source: S,
        detector: D,
        transport: T,
        config: &Config,
    ) -> ControlLoop<S, D, T> {
        ControlLoop {
            context: context,
            source: source,
            detector: detector,
            transport: transport,
            vision: config.vision.clone(),
            max_reconnect_attempts: config.control.max_reconnect_attempts,
            reconnect_delay: Duration::from_millis(config.control.reconnect_delay_ms),
        }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /**
     * Runs until the frames run out, `quit` is set, or the link can't be
     * brought back. The robot is told to stop on the way out either way.
     */
    pub fn run(&mut self, quit: &AtomicBool) -> Result<RunSummary> {
        info!("Control loop starting");
        let mut summary = RunSummary::new();
        let result = self.run_cycles(quit, &mut summary);
        self.shut_down();
        info!(
            "Control loop finished after {} cycles, {} sent, {} failed",
            summary.cycles,
            summary.sent,
            summary.failed);
        result.map(|_| summary)
    }

    fn run_cycles(&mut self, quit: &AtomicBool, summary: &mut RunSummary) -> Result<()> {
        loop {
            if quit.load(Ordering::SeqCst) {
                info!("Quit requested");
                return Ok(());
            }

            if !self.transport.is_connected() {
                let transport = &mut self.transport;
                reconnect_with_retries(
                    || transport.reconnect(),
                    self.max_reconnect_attempts,
                    self.reconnect_delay)?;
            }

            let frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => {
                    info!("No more frames");
                    return Ok(());
                }
                Err(e) => {
                    error!("Unable to get frame: {}", e);
                    return Ok(());
                }
            };

            // A frame that can't be looked at shows nothing, which stops the robot
            let observations = match observe(&frame, &self.detector, &self.vision) {
                Ok(observations) => observations,
                Err(e) => {
                    error!("Unable to find markers: {}", e);
                    MarkerObservations::default()
                }
            };
            let report = self.context.cycle(&observations, Instant::now(), &mut self.transport);
            debug!("{}", report);
            summary.record(&report);
        }
    }

    fn shut_down(&mut self) {
        if self.transport.is_connected() {
            match self.transport.send(Command::Stop) {
                Ok(_) => info!("Sent final stop"),
                Err(e) => warn!("Unable to send final stop: {}", e),
            }
        } else {
            warn!("Not connected, unable to send final stop");
        }
        self.transport.disconnect();
    }
}
