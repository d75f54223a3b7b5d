//! Run configuration: JSON file, defaults and command-line overrides.

use crate::controller::{Collaborators, Controller};
use crate::detect::{ChessCornerParams, ChessPatternDetector};
use crate::frame::{FrameError, FrameSource, ImageDirSource};
use crate::pattern::ReferencePattern;
use crate::session::CalibrationSession;
use crate::solver::{PlanarCalibrationSolver, PlanarPoseSolver};
use camcal_chessboard::ChessboardParams;
use camcal_core::parse_level_filter;
use camcal_solve::{PnpOptions, SolveOptions};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Everything a run needs. Missing JSON fields take their defaults.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibConfig {
    /// Camera index, `/dev/video<device>`.
    pub device: usize,
    /// Requested capture resolution.
    pub width: u32,
    pub height: u32,
    /// Board geometry (`rows × cols` inner corners) and grid detector tuning.
    pub board: ChessboardParams,
    /// Side of one square in world units.
    pub square_size: f64,
    pub min_samples: usize,
    /// Captures beyond this count are ignored. Unlimited when absent.
    pub max_samples: Option<usize>,
    /// Where the frame used for the pose is saved.
    pub output: PathBuf,
    /// Replay this directory instead of opening the camera.
    pub frames: Option<PathBuf>,
    /// Scripted keys for headless runs, one per frame, `.` for none.
    pub keys: Option<String>,
    pub log_level: String,
    pub chess: ChessCornerParams,
    pub solve: SolveOptions,
    pub pnp: PnpOptions,
}

impl Default for CalibConfig {
    fn default() -> Self {
        Self {
            device: 0,
            width: 640,
            height: 480,
            board: ChessboardParams::with_pattern(6, 9),
            square_size: 7.0 / 16.0,
            min_samples: 5,
            max_samples: None,
            output: PathBuf::from("extrinsic_image.jpg"),
            frames: None,
            keys: None,
            log_level: "info".to_string(),
            chess: ChessCornerParams::default(),
            solve: SolveOptions::default(),
            pnp: PnpOptions::default(),
        }
    }
}

impl CalibConfig {
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let data = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));
        if self.board.rows < 2 || self.board.cols < 2 {
            return invalid(format!(
                "board needs at least 2x2 inner corners, got {}x{}",
                self.board.rows, self.board.cols
            ));
        }
        if !(self.square_size.is_finite() && self.square_size > 0.0) {
            return invalid(format!("square size must be positive, got {}", self.square_size));
        }
        if self.min_samples == 0 {
            return invalid("min_samples must be at least 1".to_string());
        }
        if let Some(max) = self.max_samples {
            if max < self.min_samples {
                return invalid(format!(
                    "max_samples ({max}) is below min_samples ({})",
                    self.min_samples
                ));
            }
        }
        if self.width == 0 || self.height == 0 {
            return invalid(format!("capture size {}x{}", self.width, self.height));
        }
        if parse_level_filter(&self.log_level).is_none() {
            return invalid(format!("unknown log level {:?}", self.log_level));
        }
        Ok(())
    }

    pub fn pattern(&self) -> ReferencePattern {
        ReferencePattern::new(
            self.board.rows as usize,
            self.board.cols as usize,
            self.square_size,
        )
    }

    /// Controller wired to the ChESS detector and the planar solvers.
    pub fn controller(&self) -> Controller {
        let session = CalibrationSession::new(self.pattern(), self.min_samples, self.max_samples);
        Controller::new(
            session,
            self.output.clone(),
            Collaborators {
                detector: Box::new(ChessPatternDetector::new(&self.chess, self.board.clone())),
                calibration: Box::new(PlanarCalibrationSolver::new(self.solve.clone())),
                pose: Box::new(PlanarPoseSolver::new(self.pnp.clone())),
            },
        )
    }

    /// Acquire the configured frame source: the replay directory when set,
    /// the camera otherwise.
    pub fn open_source(&self) -> Result<Box<dyn FrameSource + Send>, FrameError> {
        if let Some(dir) = &self.frames {
            return Ok(Box::new(ImageDirSource::open(dir)?));
        }
        self.open_camera()
    }

    #[cfg(feature = "live")]
    fn open_camera(&self) -> Result<Box<dyn FrameSource + Send>, FrameError> {
        let camera = crate::frame::V4lCamera::open(self.device, self.width, self.height)?;
        Ok(Box::new(camera))
    }

    #[cfg(not(feature = "live"))]
    fn open_camera(&self) -> Result<Box<dyn FrameSource + Send>, FrameError> {
        Err(FrameError::DeviceUnavailable {
            device: format!("/dev/video{}", self.device),
            reason: "built without the `live` feature, replay a directory with --frames".to_string(),
        })
    }
}

#[cfg(feature = "cli")]
pub use cli::Cli;

#[cfg(feature = "cli")]
mod cli {
    use super::{CalibConfig, ConfigError};
    use clap::Parser;
    use std::path::PathBuf;

    /// Interactive checkerboard camera calibration.
    ///
    /// Phase one: 'c' captures a sample, 'q' calibrates. Phase two: 'e'
    /// solves the board pose and saves the frame, 'q' quits.
    #[derive(Debug, Parser)]
    #[command(name = "camcal", version, about)]
    pub struct Cli {
        /// JSON configuration file; flags override its values.
        #[arg(long)]
        pub config: Option<PathBuf>,

        /// Camera index (/dev/video<N>).
        #[arg(long)]
        pub device: Option<usize>,

        /// Inner corners along the first board axis.
        #[arg(long)]
        pub rows: Option<u32>,

        /// Inner corners along the second board axis.
        #[arg(long)]
        pub cols: Option<u32>,

        /// Square side in world units.
        #[arg(long)]
        pub square_size: Option<f64>,

        #[arg(long)]
        pub min_samples: Option<usize>,

        #[arg(long)]
        pub max_samples: Option<usize>,

        /// Where to save the frame used for the pose.
        #[arg(long)]
        pub output: Option<PathBuf>,

        /// Replay images from this directory instead of the camera.
        #[arg(long)]
        pub frames: Option<PathBuf>,

        /// Scripted keys, one per frame ('.' = no key). Runs without a window.
        #[arg(long)]
        pub keys: Option<String>,

        #[arg(long)]
        pub log_level: Option<String>,

        /// Requested capture width.
        #[arg(long)]
        pub width: Option<u32>,

        /// Requested capture height.
        #[arg(long)]
        pub height: Option<u32>,

        /// Print the resolved configuration as JSON and exit.
        #[arg(long)]
        pub dump_config: bool,
    }

    impl Cli {
        /// Defaults, then the config file, then flags; validated.
        pub fn resolve(&self) -> Result<CalibConfig, ConfigError> {
            let mut cfg = match &self.config {
                Some(path) => CalibConfig::from_json_file(path)?,
                None => CalibConfig::default(),
            };
            if let Some(v) = self.device {
                cfg.device = v;
            }
            if let Some(v) = self.rows {
                cfg.board.rows = v;
            }
            if let Some(v) = self.cols {
                cfg.board.cols = v;
            }
            if let Some(v) = self.square_size {
                cfg.square_size = v;
            }
            if let Some(v) = self.min_samples {
                cfg.min_samples = v;
            }
            if let Some(v) = self.max_samples {
                cfg.max_samples = Some(v);
            }
            if let Some(v) = &self.output {
                cfg.output = v.clone();
            }
            if let Some(v) = &self.frames {
                cfg.frames = Some(v.clone());
            }
            if let Some(v) = &self.keys {
                cfg.keys = Some(v.clone());
            }
            if let Some(v) = &self.log_level {
                cfg.log_level = v.clone();
            }
            if let Some(v) = self.width {
                cfg.width = v;
            }
            if let Some(v) = self.height {
                cfg.height = v;
            }
            cfg.validate()?;
            Ok(cfg)
        }
    }

}
