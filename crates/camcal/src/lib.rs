//! Interactive checkerboard camera calibration.
//!
//! The workflow has two phases. First, captured views of a checkerboard are
//! collected (`c` per view, `q` to finish) and the camera intrinsics are
//! solved from them. Then one more view gives the board pose (`e`), which is
//! printed together with the `[R|t]` matrix while the frame is saved to disk.
//!
//! ## Quickstart (headless replay)
//!
//! ```no_run
//! use camcal::{run_workflow, CalibConfig, HeadlessDisplay, KeyScript};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = CalibConfig {
//!     frames: Some("captures/".into()),
//!     ..CalibConfig::default()
//! };
//! let mut controller = config.controller();
//! let mut display = HeadlessDisplay::new(KeyScript::parse("c.c.c.c.c.q e"));
//! let summary = run_workflow(
//!     &mut controller,
//!     || config.open_source(),
//!     &mut display,
//!     &mut std::io::stdout(),
//! )?;
//! println!("{:?}", summary.intrinsics);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - [`Controller`]: per-frame step function and phase sequencing.
//! - [`CalibrationSession`], [`PoseCaptureSession`]: sample bookkeeping.
//! - [`PatternDetector`], [`CalibrationSolver`], [`PoseSolver`]: back-end
//!   traits, implemented by [`ChessPatternDetector`],
//!   [`PlanarCalibrationSolver`] and [`PlanarPoseSolver`].
//! - [`FrameSource`]: [`ImageDirSource`] and, with feature `live`, `V4lCamera`.
//! - [`run_workflow`]: the driver loop over a source and a [`Display`].
//!
//! The underlying crates are re-exported as [`core`], [`chessboard`] and
//! [`solve`].

pub use camcal_chessboard as chessboard;
pub use camcal_core as core;
pub use camcal_solve as solve;

mod config;
mod controller;
pub mod detect;
mod error;
mod frame;
#[cfg(feature = "live")]
mod gui;
pub mod overlay;
mod pattern;
pub mod report;
mod session;
mod solver;
mod workflow;

#[cfg(feature = "cli")]
pub use config::Cli;
pub use config::{CalibConfig, ConfigError};
pub use controller::{action_for, Action, Collaborators, Controller, Effect, Flow, Phase, StepOutcome};
pub use detect::{ChessCornerParams, ChessPatternDetector, PatternDetector};
pub use error::WorkflowError;
#[cfg(feature = "live")]
pub use frame::V4lCamera;
pub use frame::{yuyv_to_rgb, FrameError, FrameSource, ImageDirSource};
#[cfg(feature = "live")]
pub use gui::run_live;
pub use pattern::ReferencePattern;
pub use session::{
    CalibrationSession, Extrinsics, PoseCaptureSession, Sample, SessionError, SessionState,
};
pub use solver::{
    CalibrationSolver, Intrinsics, PlanarCalibrationSolver, PlanarPoseSolver, PoseSolver,
};
pub use workflow::{
    run, run_workflow, run_workflow_with, Display, HeadlessDisplay, KeyScript, RunSummary,
};
