//! Per-frame step function of the two-phase workflow.
//!
//! The controller owns every piece of state. Each frame it converts to
//! grayscale, runs detection, maps the key to an action of the active phase
//! and reports what happened as [`Effect`]s plus a [`Flow`] decision. It never
//! touches the display, the console or the file system.

use crate::detect::PatternDetector;
use crate::error::WorkflowError;
use crate::session::{CalibrationSession, PoseCaptureSession, SessionError};
use crate::solver::{CalibrationSolver, Intrinsics, PoseSolver};
use camcal_solve::Pose;
use image::RgbImage;
use log::{debug, info, warn};
use nalgebra::Point2;
use std::path::PathBuf;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Collect samples, then calibrate.
    Intrinsic,
    /// Solve one board pose.
    Extrinsic,
    Done,
}

impl Phase {
    pub fn window_title(self) -> &'static str {
        match self {
            Phase::Intrinsic => "Calibration",
            Phase::Extrinsic | Phase::Done => "Extrinsic",
        }
    }

    pub fn instructions(self) -> &'static str {
        match self {
            Phase::Intrinsic => {
                "Press 'c' to capture a calibration image, 'q' to finish calibration."
            }
            Phase::Extrinsic => "Press 'e' to capture an image for extrinsic calculation.",
            Phase::Done => "",
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Capture,
    Finish,
    CapturePose,
    Quit,
}

/// Key binding of the given phase. Every other key is ignored.
pub fn action_for(phase: Phase, key: char) -> Option<Action> {
    match (phase, key) {
        (Phase::Intrinsic, 'c') => Some(Action::Capture),
        (Phase::Intrinsic, 'q') => Some(Action::Finish),
        (Phase::Extrinsic, 'e') => Some(Action::CapturePose),
        (Phase::Extrinsic, 'q') => Some(Action::Quit),
        _ => None,
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Effect {
    Captured { count: usize },
    Calibrated(Intrinsics),
    PoseSolved(Pose),
    /// Write the current, un-annotated frame to `path`.
    SaveFrame { path: PathBuf },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Flow {
    Continue,
    /// Intrinsics are solved; release the source and start the next phase.
    PhaseComplete,
    Finished,
}

#[derive(Clone, Debug, PartialEq)]
pub struct StepOutcome {
    /// Ordered corners found in the frame, for the overlay.
    pub detection: Option<Vec<Point2<f32>>>,
    pub effects: Vec<Effect>,
    pub flow: Flow,
}

/// Detection and solving back-ends used by the controller.
pub struct Collaborators {
    pub detector: Box<dyn PatternDetector>,
    pub calibration: Box<dyn CalibrationSolver>,
    pub pose: Box<dyn PoseSolver>,
}

pub struct Controller {
    collaborators: Collaborators,
    session: CalibrationSession,
    pose_session: Option<PoseCaptureSession>,
    output: PathBuf,
    phase: Phase,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("phase", &self.phase)
            .field("samples", &self.session.len())
            .field("output", &self.output)
            .finish()
    }
}

impl Controller {
    /// `output` is where the pose frame is saved.
    pub fn new(
        session: CalibrationSession,
        output: impl Into<PathBuf>,
        collaborators: Collaborators,
    ) -> Self {
        Self {
            collaborators,
            session,
            pose_session: None,
            output: output.into(),
            phase: Phase::Intrinsic,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn session(&self) -> &CalibrationSession {
        &self.session
    }

    pub fn pose_session(&self) -> Option<&PoseCaptureSession> {
        self.pose_session.as_ref()
    }

    /// Board corners in `frame`. Also records the frame resolution while
    /// samples are being collected.
    pub fn detect(&mut self, frame: &RgbImage) -> Option<Vec<Point2<f32>>> {
        if self.phase == Phase::Intrinsic {
            self.session.observe(frame.dimensions());
        }
        let gray = image::imageops::grayscale(frame);
        self.collaborators.detector.detect(&gray)
    }

    /// Detect, then act on `key`.
    pub fn step(&mut self, frame: &RgbImage, key: Option<char>) -> Result<StepOutcome, WorkflowError> {
        let detection = self.detect(frame);
        self.dispatch(key, detection)
    }

    /// Act on `key` given the detection of the current frame.
    pub fn dispatch(
        &mut self,
        key: Option<char>,
        detection: Option<Vec<Point2<f32>>>,
    ) -> Result<StepOutcome, WorkflowError> {
        let mut outcome = StepOutcome {
            detection,
            effects: Vec::new(),
            flow: if self.phase == Phase::Done {
                Flow::Finished
            } else {
                Flow::Continue
            },
        };
        let Some(action) = key.and_then(|k| action_for(self.phase, k)) else {
            return Ok(outcome);
        };

        match action {
            Action::Capture => {
                let Some(points) = &outcome.detection else {
                    debug!("capture ignored, no board in view");
                    return Ok(outcome);
                };
                match self.session.capture(points.clone()) {
                    Ok(count) => outcome.effects.push(Effect::Captured { count }),
                    Err(SessionError::CapacityReached { max }) => {
                        warn!("already holding {max} samples, capture ignored");
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            Action::Finish => {
                self.session.finish()?;
                let intrinsics = self
                    .session
                    .solve(self.collaborators.calibration.as_ref())?
                    .clone();
                info!("intrinsics solved, rms {:.4} px", intrinsics.rms);
                self.pose_session = Some(PoseCaptureSession::new(
                    intrinsics.clone(),
                    self.session.pattern(),
                    self.output.clone(),
                ));
                self.phase = Phase::Extrinsic;
                outcome.effects.push(Effect::Calibrated(intrinsics));
                outcome.flow = Flow::PhaseComplete;
            }
            Action::CapturePose => {
                let Some(points) = &outcome.detection else {
                    debug!("pose capture ignored, no board in view");
                    return Ok(outcome);
                };
                let session = self
                    .pose_session
                    .as_mut()
                    .ok_or(WorkflowError::Session(SessionError::NotReady))?;
                let pose = session.capture(points, self.collaborators.pose.as_ref())?;
                outcome.effects.push(Effect::PoseSolved(pose));
                outcome.effects.push(Effect::SaveFrame {
                    path: session.output().to_path_buf(),
                });
                self.phase = Phase::Done;
                outcome.flow = Flow::Finished;
            }
            Action::Quit => {
                info!("extrinsic phase quit without a pose");
                self.phase = Phase::Done;
                outcome.flow = Flow::Finished;
            }
        }
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pattern::ReferencePattern;
    use crate::session::{Sample, SessionState};
    use camcal_solve::{CalibrationError, Distortion, PoseError};
    use image::GrayImage;
    use nalgebra::{Matrix3, Point3, Vector3};
    use std::cell::Cell;
    use std::rc::Rc;

    const N: usize = 6;

    /// Finds the board whenever the top-left pixel is bright.
    struct BrightCornerDetector;

    impl PatternDetector for BrightCornerDetector {
        fn detect(&self, gray: &GrayImage) -> Option<Vec<Point2<f32>>> {
            (gray.get_pixel(0, 0)[0] > 128).then(|| {
                (0..N)
                    .map(|k| Point2::new(k as f32 * 10.0, 5.0))
                    .collect()
            })
        }
    }

    struct FakeCalibration {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl CalibrationSolver for FakeCalibration {
        fn calibrate(
            &self,
            samples: &[Sample],
            image_size: (u32, u32),
        ) -> Result<Intrinsics, CalibrationError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(CalibrationError::NonFinite);
            }
            Ok(Intrinsics {
                camera_matrix: Matrix3::new(500.0, 0.0, 32.0, 0.0, 500.0, 24.0, 0.0, 0.0, 1.0),
                distortion: Distortion::default(),
                rms: samples.len() as f64 * 0.01,
                image_size,
            })
        }
    }

    struct FakePose {
        calls: Rc<Cell<usize>>,
        fail: bool,
    }

    impl PoseSolver for FakePose {
        fn solve_pose(
            &self,
            object_points: &[Point3<f64>],
            _image_points: &[Point2<f32>],
            _intrinsics: &Intrinsics,
        ) -> Result<Pose, PoseError> {
            self.calls.set(self.calls.get() + 1);
            if self.fail {
                return Err(PoseError::DegenerateHomography);
            }
            Ok(Pose::new(
                Vector3::new(0.0, 0.1, 0.0),
                Vector3::new(0.0, 0.0, object_points.len() as f64),
            ))
        }
    }

    struct Harness {
        controller: Controller,
        calibrations: Rc<Cell<usize>>,
        poses: Rc<Cell<usize>>,
    }

    fn harness() -> Harness {
        harness_failing(false, false)
    }

    fn harness_failing(calibration_fails: bool, pose_fails: bool) -> Harness {
        let calibrations = Rc::new(Cell::new(0));
        let poses = Rc::new(Cell::new(0));
        let session = CalibrationSession::new(ReferencePattern::new(2, 3, 1.0), 5, None);
        let controller = Controller::new(
            session,
            "extrinsic_image.jpg",
            Collaborators {
                detector: Box::new(BrightCornerDetector),
                calibration: Box::new(FakeCalibration {
                    calls: calibrations.clone(),
                    fail: calibration_fails,
                }),
                pose: Box::new(FakePose {
                    calls: poses.clone(),
                    fail: pose_fails,
                }),
            },
        );
        Harness {
            controller,
            calibrations,
            poses,
        }
    }

    fn board_frame() -> RgbImage {
        RgbImage::from_pixel(64, 48, image::Rgb([255, 255, 255]))
    }

    fn empty_frame() -> RgbImage {
        RgbImage::new(64, 48)
    }

    fn capture_n(c: &mut Controller, n: usize) {
        for k in 1..=n {
            let out = c.step(&board_frame(), Some('c')).unwrap();
            assert_eq!(out.effects, vec![Effect::Captured { count: k }]);
            assert_eq!(out.flow, Flow::Continue);
        }
    }

    #[test]
    fn capture_without_detection_is_ignored() {
        let mut h = harness();
        let out = h.controller.step(&empty_frame(), Some('c')).unwrap();
        assert!(out.detection.is_none());
        assert!(out.effects.is_empty());
        assert_eq!(h.controller.session().len(), 0);
    }

    #[test]
    fn detection_is_reported_without_key() {
        let mut h = harness();
        let out = h.controller.step(&board_frame(), None).unwrap();
        assert_eq!(out.detection.map(|d| d.len()), Some(N));
        assert!(out.effects.is_empty());
        assert_eq!(out.flow, Flow::Continue);
    }

    #[test]
    fn finish_with_no_samples_fails_without_solving() {
        let mut h = harness();
        let err = h.controller.step(&board_frame(), Some('q')).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::InsufficientSamples { count: 0, min: 5 }
        ));
        assert_eq!(h.calibrations.get(), 0);
    }

    #[test]
    fn six_captures_then_finish_calibrates() {
        let mut h = harness();
        capture_n(&mut h.controller, 6);
        let out = h.controller.step(&empty_frame(), Some('q')).unwrap();

        assert_eq!(out.flow, Flow::PhaseComplete);
        let [Effect::Calibrated(k)] = out.effects.as_slice() else {
            panic!("unexpected effects {:?}", out.effects);
        };
        assert_eq!(k.image_size, (64, 48));
        assert_eq!(h.calibrations.get(), 1);
        assert_eq!(h.controller.phase(), Phase::Extrinsic);
        assert_eq!(h.controller.phase().window_title(), "Extrinsic");
    }

    #[test]
    fn pose_capture_finishes_and_saves() {
        let mut h = harness();
        capture_n(&mut h.controller, 5);
        h.controller.step(&board_frame(), Some('q')).unwrap();

        // 'c' means nothing in the second phase, 'e' without a board is ignored.
        let out = h.controller.step(&board_frame(), Some('c')).unwrap();
        assert!(out.effects.is_empty());
        let out = h.controller.step(&empty_frame(), Some('e')).unwrap();
        assert!(out.effects.is_empty());
        assert_eq!(out.flow, Flow::Continue);

        let out = h.controller.step(&board_frame(), Some('e')).unwrap();
        assert_eq!(out.flow, Flow::Finished);
        assert_eq!(out.effects.len(), 2);
        let Effect::PoseSolved(pose) = &out.effects[0] else {
            panic!("expected a pose, got {:?}", out.effects[0]);
        };
        assert_eq!(pose.tvec.z, N as f64);
        assert_eq!(
            out.effects[1],
            Effect::SaveFrame {
                path: PathBuf::from("extrinsic_image.jpg")
            }
        );
        assert_eq!(h.poses.get(), 1);
        assert!(h.controller.pose_session().is_some_and(|s| s.is_complete()));

        let out = h.controller.step(&board_frame(), Some('e')).unwrap();
        assert_eq!(out.flow, Flow::Finished);
        assert!(out.effects.is_empty());
        assert_eq!(h.poses.get(), 1);
    }

    #[test]
    fn failed_calibration_is_terminal() {
        let mut h = harness_failing(true, false);
        capture_n(&mut h.controller, 5);
        let err = h.controller.step(&board_frame(), Some('q')).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::CalibrationFailed(CalibrationError::NonFinite)
        ));
        assert_eq!(h.calibrations.get(), 1);
        assert_eq!(h.controller.session().state(), &SessionState::Failed);

        // Neither more captures nor a second solve follow.
        let err = h.controller.step(&board_frame(), Some('q'));
        assert!(err.is_err());
        assert_eq!(h.calibrations.get(), 1);
        assert!(h.controller.pose_session().is_none());
    }

    #[test]
    fn failed_pose_solve_saves_nothing() {
        let mut h = harness_failing(false, true);
        capture_n(&mut h.controller, 5);
        h.controller.step(&board_frame(), Some('q')).unwrap();

        let detection = h.controller.detect(&board_frame());
        assert!(detection.is_some());
        let err = h.controller.dispatch(Some('e'), detection).unwrap_err();
        assert!(matches!(
            err,
            WorkflowError::PoseSolveFailed(PoseError::DegenerateHomography)
        ));
        assert_eq!(h.poses.get(), 1);
        assert!(h
            .controller
            .pose_session()
            .is_some_and(|s| !s.is_complete() && s.result().is_none()));
    }

    #[test]
    fn quit_in_second_phase_finishes_without_pose() {
        let mut h = harness();
        capture_n(&mut h.controller, 5);
        h.controller.step(&board_frame(), Some('q')).unwrap();
        let out = h.controller.step(&board_frame(), Some('q')).unwrap();
        assert_eq!(out.flow, Flow::Finished);
        assert!(out.effects.is_empty());
        assert_eq!(h.poses.get(), 0);
        assert_eq!(h.controller.phase(), Phase::Done);
    }

    #[test]
    fn unknown_keys_are_ignored() {
        let mut h = harness();
        for key in ['x', 'e', 'C', ' ', '\n'] {
            let out = h.controller.step(&board_frame(), Some(key)).unwrap();
            assert!(out.effects.is_empty());
            assert_eq!(out.flow, Flow::Continue);
        }
        assert_eq!(h.controller.session().len(), 0);
        assert_eq!(action_for(Phase::Intrinsic, 'e'), None);
        assert_eq!(action_for(Phase::Extrinsic, 'c'), None);
    }

    #[test]
    fn sample_cap_ignores_extra_captures() {
        let session = CalibrationSession::new(ReferencePattern::new(2, 3, 1.0), 1, Some(2));
        let mut c = Controller::new(
            session,
            "out.jpg",
            Collaborators {
                detector: Box::new(BrightCornerDetector),
                calibration: Box::new(FakeCalibration {
                    calls: Rc::new(Cell::new(0)),
                    fail: false,
                }),
                pose: Box::new(FakePose {
                    calls: Rc::new(Cell::new(0)),
                    fail: false,
                }),
            },
        );
        capture_n(&mut c, 2);
        let out = c.step(&board_frame(), Some('c')).unwrap();
        assert!(out.effects.is_empty());
        assert_eq!(c.session().len(), 2);
    }
}
