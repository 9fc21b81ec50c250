//! Detection-to-actuation control loop.
//!
//! One iteration of the loop is one camera cycle:
//!
//! ```text
//! Scanning --detections--> Triggered --P--> Approaching --D--> (d > threshold) Scanning
//!                                                  |
//!                                          (d <= threshold)
//!                                                  v
//!            Scanning <--R, dwell-- Releasing <--P, dwell-- Picking <--S-- WithinRange
//! ```
//!
//! Every cycle re-runs detection; there is no target lock. The distance is
//! only checked while something is detected in the current frame.
//!
//! Distance timeouts and malformed readings end the iteration back in
//! `Scanning`. Detection failures and broken links propagate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};

use crate::actuator::{ActuatorProtocol, Command, DistanceReading};
use crate::detect::{Detection, DetectionEngine};
use crate::frame::Frame;
use crate::transport::{LinkError, SerialTransport};

/// Distance at or below which the robot stops and picks.
pub const PROXIMITY_THRESHOLD_CM: f32 = 15.0;

/// Time allowed for one mechanical action.
pub const DEFAULT_DWELL: Duration = Duration::from_secs(3);

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ControlState {
    Scanning,
    Triggered,
    Approaching,
    WithinRange,
    Picking,
    Releasing,
}

/// Supplies frames to the loop.
pub trait FrameSource {
    fn next_frame(&mut self) -> Result<Frame>;
}

/// Waits until the actuator has finished a mechanical action.
///
/// The microcontroller does not report completion, so the shipped
/// implementation waits a fixed time.
pub trait MechanicalCompletion {
    fn await_completion(&mut self, command: Command) -> Result<()>;
}

/// Open-loop completion: sleep for a fixed dwell.
#[derive(Clone, Copy, Debug)]
pub struct FixedDwell {
    dwell: Duration,
}

impl FixedDwell {
    pub fn new(dwell: Duration) -> Self {
        Self { dwell }
    }
}

impl Default for FixedDwell {
    fn default() -> Self {
        Self::new(DEFAULT_DWELL)
    }
}

impl MechanicalCompletion for FixedDwell {
    fn await_completion(&mut self, command: Command) -> Result<()> {
        log::debug!("waiting {:?} for {}", self.dwell, command);
        std::thread::sleep(self.dwell);
        Ok(())
    }
}

/// Receives each cycle's detections, e.g. to draw them.
pub trait Overlay {
    fn present(&mut self, frame: &Frame, detections: &[Detection]);
}

/// Overlay that logs each detection box.
#[derive(Clone, Copy, Debug, Default)]
pub struct LogOverlay;

impl Overlay for LogOverlay {
    fn present(&mut self, frame: &Frame, detections: &[Detection]) {
        for detection in detections {
            let b = detection.bbox;
            log::debug!(
                "frame #{} {} ({:.2}) at [{:.0}, {:.0}, {:.0}, {:.0}]",
                frame.sequence,
                detection.display_name(),
                detection.score,
                b.x_min,
                b.y_min,
                b.x_max,
                b.y_max
            );
        }
    }
}

/// Outcome of one loop iteration.
#[derive(Clone, Debug, Default)]
pub struct CycleReport {
    /// Sequence number of the frame this cycle processed.
    pub frame_sequence: u64,
    pub detections: Vec<Detection>,
    /// States entered, in order, starting with `Scanning`.
    pub states: Vec<ControlState>,
    /// Commands put on the wire, in order.
    pub commands: Vec<Command>,
    pub distance: Option<DistanceReading>,
    /// Distance failure absorbed by this cycle.
    pub recovered: Option<String>,
    /// True when the full stop/pick/release sequence ran.
    pub picked: bool,
}

impl CycleReport {
    pub fn triggered(&self) -> bool {
        self.states.contains(&ControlState::Triggered)
    }
}

/// Counters over the loop's lifetime.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub cycles: u64,
    pub triggered: u64,
    pub picks: u64,
    pub recovered_errors: u64,
}

impl LoopStats {
    fn record(&mut self, report: &CycleReport) {
        self.cycles += 1;
        if report.triggered() {
            self.triggered += 1;
        }
        if report.picked {
            self.picks += 1;
        }
        if report.recovered.is_some() {
            self.recovered_errors += 1;
        }
    }
}

/// The orchestrator: frames in, actuator commands out.
pub struct ControlLoop<S, T, C>
where
    S: FrameSource,
    T: SerialTransport,
    C: MechanicalCompletion,
{
    source: S,
    engine: DetectionEngine,
    actuator: ActuatorProtocol<T>,
    completion: C,
    overlay: Box<dyn Overlay>,
    proximity_cm: f32,
    stats: LoopStats,
}

impl<S, T, C> ControlLoop<S, T, C>
where
    S: FrameSource,
    T: SerialTransport,
    C: MechanicalCompletion,
{
    pub fn new(
        source: S,
        engine: DetectionEngine,
        actuator: ActuatorProtocol<T>,
        completion: C,
    ) -> Self {
        Self {
            source,
            engine,
            actuator,
            completion,
            overlay: Box::new(LogOverlay),
            proximity_cm: PROXIMITY_THRESHOLD_CM,
            stats: LoopStats::default(),
        }
    }

    pub fn with_overlay<O: Overlay + 'static>(mut self, overlay: O) -> Self {
        self.overlay = Box::new(overlay);
        self
    }

    pub fn with_proximity_cm(mut self, proximity_cm: f32) -> Self {
        self.proximity_cm = proximity_cm;
        self
    }

    pub fn source(&self) -> &S {
        &self.source
    }

    pub fn actuator(&self) -> &ActuatorProtocol<T> {
        &self.actuator
    }

    pub fn completion(&self) -> &C {
        &self.completion
    }

    pub fn stats(&self) -> LoopStats {
        self.stats
    }

    /// Run cycles until `stop` is raised or `max_cycles` have run.
    ///
    /// The flag is checked between iterations only.
    pub fn run(&mut self, stop: &AtomicBool, max_cycles: Option<u64>) -> Result<LoopStats> {
        while !stop.load(Ordering::SeqCst) {
            if max_cycles.is_some_and(|max| self.stats.cycles >= max) {
                break;
            }
            self.run_cycle()?;
        }
        Ok(self.stats)
    }

    /// Run one full iteration, from capture back to `Scanning`.
    pub fn run_cycle(&mut self) -> Result<CycleReport> {
        let frame = self.source.next_frame().context("capture frame")?;
        log::debug!(
            "frame #{}: {}x{} {:?}",
            frame.sequence,
            frame.width,
            frame.height,
            frame.format
        );
        let detections = self.engine.detect(&frame)?;
        self.overlay.present(&frame, &detections);

        let mut report = CycleReport {
            frame_sequence: frame.sequence,
            detections,
            states: vec![ControlState::Scanning],
            ..CycleReport::default()
        };

        let mut state = ControlState::Scanning;
        loop {
            state = self.advance(state, &mut report)?;
            if state == ControlState::Scanning {
                break;
            }
            report.states.push(state);
        }

        self.stats.record(&report);
        Ok(report)
    }

    fn advance(&mut self, state: ControlState, report: &mut CycleReport) -> Result<ControlState> {
        let next = match state {
            ControlState::Scanning => {
                if report.detections.is_empty() {
                    ControlState::Scanning
                } else {
                    log::info!(
                        "frame #{}: {} detection(s), requesting pick",
                        report.frame_sequence,
                        report.detections.len()
                    );
                    ControlState::Triggered
                }
            }
            ControlState::Triggered => {
                sent(report, Command::RequestPick, self.actuator.request_pick())?;
                ControlState::Approaching
            }
            ControlState::Approaching => self.check_distance(report)?,
            ControlState::WithinRange => {
                sent(report, Command::Stop, self.actuator.stop())?;
                ControlState::Picking
            }
            ControlState::Picking => {
                sent(report, Command::RequestPick, self.actuator.request_pick())?;
                self.completion.await_completion(Command::RequestPick)?;
                ControlState::Releasing
            }
            ControlState::Releasing => {
                sent(report, Command::Release, self.actuator.release())?;
                self.completion.await_completion(Command::Release)?;
                report.picked = true;
                log::info!("frame #{}: pick cycle complete", report.frame_sequence);
                ControlState::Scanning
            }
        };
        Ok(next)
    }

    fn check_distance(&mut self, report: &mut CycleReport) -> Result<ControlState> {
        match self.actuator.request_distance() {
            Ok(reading) => {
                report.commands.push(Command::RequestDistance);
                report.distance = Some(reading);
                if reading.is_within(self.proximity_cm) {
                    log::info!("target at {}, stopping", reading);
                    Ok(ControlState::WithinRange)
                } else {
                    log::debug!("target at {}, still approaching", reading);
                    Ok(ControlState::Scanning)
                }
            }
            Err(err) if err.is_recoverable() => {
                if !matches!(err, LinkError::ReplyOutstanding { .. }) {
                    report.commands.push(Command::RequestDistance);
                }
                log::warn!("distance query failed, resuming scan: {}", err);
                report.recovered = Some(err.to_string());
                Ok(ControlState::Scanning)
            }
            Err(err) => Err(err).context("distance query failed"),
        }
    }
}

/// Record a fire-and-forget command once it is on the wire.
fn sent(report: &mut CycleReport, command: Command, result: Result<(), LinkError>) -> Result<()> {
    result.with_context(|| format!("send {}", command))?;
    report.commands.push(command);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::{InputSpec, InputType, StubBackend};
    use crate::frame::PixelFormat;
    use crate::transport::ScriptedLink;

    struct BlankFrames(u64);

    impl FrameSource for BlankFrames {
        fn next_frame(&mut self) -> Result<Frame> {
            self.0 += 1;
            Ok(Frame::new(vec![0u8; 16], 4, 4, PixelFormat::Gray8)?.with_sequence(self.0))
        }
    }

    #[derive(Default)]
    struct NoWait(Vec<Command>);

    impl MechanicalCompletion for NoWait {
        fn await_completion(&mut self, command: Command) -> Result<()> {
            self.0.push(command);
            Ok(())
        }
    }

    fn control_loop(
        detected: bool,
        link: ScriptedLink,
    ) -> ControlLoop<BlankFrames, ScriptedLink, NoWait> {
        let outputs = if detected {
            StubBackend::ssd_outputs(&[([0.1, 0.1, 0.9, 0.9], 0.0, 0.9)])
        } else {
            StubBackend::ssd_outputs(&[])
        };
        let backend = StubBackend::new(InputSpec::new(4, 4, InputType::U8)).repeat_outputs(outputs);
        ControlLoop::new(
            BlankFrames(0),
            DetectionEngine::new(backend),
            ActuatorProtocol::new(link, Duration::from_millis(10)),
            NoWait::default(),
        )
    }

    #[test]
    fn distance_routing_at_threshold() -> Result<()> {
        for (reading, within) in [("15", true), ("15.0001", false), ("14.99", true), ("300", false)] {
            let mut control = control_loop(true, ScriptedLink::new().with_lines([reading]));
            let report = control.run_cycle()?;
            assert_eq!(
                report.states.contains(&ControlState::WithinRange),
                within,
                "reading {}",
                reading
            );
            assert_eq!(report.picked, within);
        }
        Ok(())
    }

    #[test]
    fn full_sequence_visits_states_in_order() -> Result<()> {
        let mut control = control_loop(true, ScriptedLink::new().with_lines(["3.5"]));
        let report = control.run_cycle()?;

        assert_eq!(
            report.states,
            vec![
                ControlState::Scanning,
                ControlState::Triggered,
                ControlState::Approaching,
                ControlState::WithinRange,
                ControlState::Picking,
                ControlState::Releasing,
            ]
        );
        assert_eq!(control.actuator().transport().written(), b"PDSPR");
        assert_eq!(
            control.completion().0,
            vec![Command::RequestPick, Command::Release]
        );
        Ok(())
    }

    #[test]
    fn configurable_proximity_threshold() -> Result<()> {
        let mut control =
            control_loop(true, ScriptedLink::new().with_lines(["20"])).with_proximity_cm(25.0);
        assert!(control.run_cycle()?.picked);
        Ok(())
    }

    #[test]
    fn stop_flag_halts_between_cycles() -> Result<()> {
        let mut control = control_loop(false, ScriptedLink::new());
        let stop = AtomicBool::new(true);
        let stats = control.run(&stop, None)?;
        assert_eq!(stats.cycles, 0);

        let stop = AtomicBool::new(false);
        let stats = control.run(&stop, Some(5))?;
        assert_eq!(stats.cycles, 5);
        assert_eq!(control.source().0, 5);
        Ok(())
    }

    #[test]
    fn broken_link_propagates() {
        let mut link = ScriptedLink::new();
        link.push_reply(crate::transport::Reply::Broken);
        let mut control = control_loop(true, link);
        let err = control.run_cycle().unwrap_err();
        assert!(err.downcast_ref::<LinkError>().is_some());
    }
}
