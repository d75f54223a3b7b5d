//! Sample bookkeeping for the two calibration phases.

use crate::pattern::ReferencePattern;
use crate::solver::{CalibrationSolver, Intrinsics, PoseSolver};
use camcal_solve::{CalibrationError, Pose, PoseError};
use log::{debug, info};
use nalgebra::{Point2, Point3};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SessionError {
    #[error("Not enough images for calibration. Need at least {min}, got {count}.")]
    InsufficientSamples { count: usize, min: usize },

    #[error("detected {got} corners, the pattern has {expected}")]
    PointCountMismatch { expected: usize, got: usize },

    #[error("session is no longer collecting samples")]
    NotCollecting,

    #[error("session is not ready to calibrate")]
    NotReady,

    #[error("sample limit of {max} reached")]
    CapacityReached { max: usize },

    #[error("no frame resolution recorded")]
    NoResolution,

    #[error("calibration failed: {0}")]
    CalibrationFailed(#[source] CalibrationError),

    #[error("pose already captured")]
    PoseAlreadyCaptured,

    #[error("pose estimation failed: {0}")]
    PoseSolveFailed(#[source] PoseError),
}

/// One confirmed capture: the reference pattern and the corners detected in
/// the frame, index `k` of both referring to the same physical corner.
#[derive(Clone, Debug, PartialEq)]
pub struct Sample {
    pub object_points: Vec<Point3<f64>>,
    pub image_points: Vec<Point2<f32>>,
}

#[derive(Clone, Debug, PartialEq)]
pub enum SessionState {
    Collecting,
    Ready,
    Solved(Intrinsics),
    /// The solver was invoked and failed; nothing else is allowed.
    Failed,
}

/// Accumulates samples and runs intrinsic calibration once.
///
/// `Collecting -> Ready -> Solved`. There is no way back to `Collecting`.
#[derive(Clone, Debug)]
pub struct CalibrationSession {
    pattern: ReferencePattern,
    min_samples: usize,
    max_samples: Option<usize>,
    samples: Vec<Sample>,
    image_size: Option<(u32, u32)>,
    state: SessionState,
}

impl CalibrationSession {
    pub fn new(pattern: ReferencePattern, min_samples: usize, max_samples: Option<usize>) -> Self {
        Self {
            pattern,
            min_samples,
            max_samples,
            samples: Vec::new(),
            image_size: None,
            state: SessionState::Collecting,
        }
    }

    pub fn pattern(&self) -> &ReferencePattern {
        &self.pattern
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn min_samples(&self) -> usize {
        self.min_samples
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn image_size(&self) -> Option<(u32, u32)> {
        self.image_size
    }

    pub fn intrinsics(&self) -> Option<&Intrinsics> {
        match &self.state {
            SessionState::Solved(k) => Some(k),
            _ => None,
        }
    }

    /// Record the resolution of the most recent frame.
    pub fn observe(&mut self, size: (u32, u32)) {
        if self.state == SessionState::Collecting {
            self.image_size = Some(size);
        }
    }

    /// Store a detected corner set; returns the new sample count.
    pub fn capture(&mut self, image_points: Vec<Point2<f32>>) -> Result<usize, SessionError> {
        if self.state != SessionState::Collecting {
            return Err(SessionError::NotCollecting);
        }
        if image_points.len() != self.pattern.len() {
            return Err(SessionError::PointCountMismatch {
                expected: self.pattern.len(),
                got: image_points.len(),
            });
        }
        if let Some(max) = self.max_samples {
            if self.samples.len() >= max {
                return Err(SessionError::CapacityReached { max });
            }
        }
        self.samples.push(Sample {
            object_points: self.pattern.points().to_vec(),
            image_points,
        });
        debug!("stored sample #{}", self.samples.len());
        Ok(self.samples.len())
    }

    /// Stop collecting. Fewer than the minimum samples ends the run.
    pub fn finish(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Collecting {
            return Err(SessionError::NotCollecting);
        }
        if self.samples.len() < self.min_samples {
            self.state = SessionState::Failed;
            return Err(SessionError::InsufficientSamples {
                count: self.samples.len(),
                min: self.min_samples,
            });
        }
        self.state = SessionState::Ready;
        Ok(())
    }

    /// Invoke `solver` exactly once with every sample.
    pub fn solve(&mut self, solver: &dyn CalibrationSolver) -> Result<&Intrinsics, SessionError> {
        if self.state != SessionState::Ready {
            return Err(SessionError::NotReady);
        }
        let Some(size) = self.image_size else {
            self.state = SessionState::Failed;
            return Err(SessionError::NoResolution);
        };

        info!(
            "calibrating from {} samples at {}x{}",
            self.samples.len(),
            size.0,
            size.1
        );
        match solver.calibrate(&self.samples, size) {
            Ok(intrinsics) => {
                self.state = SessionState::Solved(intrinsics);
                self.intrinsics().ok_or(SessionError::NotReady)
            }
            Err(e) => {
                self.state = SessionState::Failed;
                Err(SessionError::CalibrationFailed(e))
            }
        }
    }
}

/// Board pose in one frame, with the intrinsics it was solved against.
#[derive(Clone, Debug, PartialEq)]
pub struct Extrinsics {
    pub pose: Pose,
    pub intrinsics: Intrinsics,
}

/// Second phase: one pose capture against solved intrinsics.
#[derive(Clone, Debug)]
pub struct PoseCaptureSession {
    intrinsics: Intrinsics,
    object_points: Vec<Point3<f64>>,
    output: PathBuf,
    result: Option<Pose>,
}

impl PoseCaptureSession {
    pub fn new(intrinsics: Intrinsics, pattern: &ReferencePattern, output: impl Into<PathBuf>) -> Self {
        Self {
            intrinsics,
            object_points: pattern.points().to_vec(),
            output: output.into(),
            result: None,
        }
    }

    pub fn intrinsics(&self) -> &Intrinsics {
        &self.intrinsics
    }

    /// Where the frame of a successful capture is written.
    pub fn output(&self) -> &Path {
        &self.output
    }

    pub fn is_complete(&self) -> bool {
        self.result.is_some()
    }

    pub fn result(&self) -> Option<Extrinsics> {
        self.result.map(|pose| Extrinsics {
            pose,
            intrinsics: self.intrinsics.clone(),
        })
    }

    /// Solve the pose of `image_points`. Only the first capture is accepted.
    pub fn capture(
        &mut self,
        image_points: &[Point2<f32>],
        solver: &dyn PoseSolver,
    ) -> Result<Pose, SessionError> {
        if self.result.is_some() {
            return Err(SessionError::PoseAlreadyCaptured);
        }
        if image_points.len() != self.object_points.len() {
            return Err(SessionError::PointCountMismatch {
                expected: self.object_points.len(),
                got: image_points.len(),
            });
        }
        let pose = solver
            .solve_pose(&self.object_points, image_points, &self.intrinsics)
            .map_err(SessionError::PoseSolveFailed)?;
        self.result = Some(pose);
        Ok(pose)
    }
}
