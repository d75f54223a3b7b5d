//! Driver loop: frames in, annotated preview out, effects applied.

use crate::config::CalibConfig;
use crate::controller::{Controller, Effect, Flow, Phase};
use crate::error::WorkflowError;
use crate::frame::{FrameError, FrameSource};
use crate::overlay::annotate;
use crate::report;
use crate::session::Extrinsics;
use crate::solver::Intrinsics;
use image::RgbImage;
use log::info;
use std::collections::VecDeque;
use std::io::Write;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Shows the preview and reports the key pressed while it was shown.
pub trait Display {
    fn show(&mut self, title: &str, frame: &RgbImage) -> Result<Option<char>, WorkflowError>;
}

/// Key sequence for headless runs: one entry per frame, `.` for no key.
/// Whitespace is skipped so scripts may span lines.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyScript {
    keys: VecDeque<Option<char>>,
}

impl KeyScript {
    pub fn parse(script: &str) -> Self {
        let keys = script
            .chars()
            .filter(|c| !c.is_whitespace())
            .map(|c| (c != '.').then_some(c))
            .collect();
        Self { keys }
    }

    /// Next key; `None` once the script is exhausted.
    pub fn next_key(&mut self) -> Option<char> {
        self.keys.pop_front().flatten()
    }

    pub fn remaining(&self) -> usize {
        self.keys.len()
    }
}

/// No window; keys come from a [`KeyScript`].
#[derive(Clone, Debug, Default)]
pub struct HeadlessDisplay {
    script: KeyScript,
    shown: usize,
}

impl HeadlessDisplay {
    pub fn new(script: KeyScript) -> Self {
        Self { script, shown: 0 }
    }

    pub fn frames_shown(&self) -> usize {
        self.shown
    }
}

impl Display for HeadlessDisplay {
    fn show(&mut self, _title: &str, _frame: &RgbImage) -> Result<Option<char>, WorkflowError> {
        self.shown += 1;
        Ok(self.script.next_key())
    }
}

/// What a completed run produced.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RunSummary {
    pub samples: usize,
    pub intrinsics: Option<Intrinsics>,
    /// `None` when the user quit the second phase.
    pub extrinsics: Option<Extrinsics>,
}

impl RunSummary {
    fn of(controller: &Controller) -> Self {
        Self {
            samples: controller.session().len(),
            intrinsics: controller.session().intrinsics().cloned(),
            extrinsics: controller.pose_session().and_then(|s| s.result()),
        }
    }
}

/// Run both phases to completion.
///
/// The source is opened at the start of each phase and dropped at its end.
/// Console text goes to `out`.
pub fn run_workflow<S, O>(
    controller: &mut Controller,
    mut open_source: O,
    display: &mut dyn Display,
    out: &mut dyn Write,
) -> Result<RunSummary, WorkflowError>
where
    S: FrameSource,
    O: FnMut() -> Result<S, FrameError>,
{
    let first = open_source().map_err(WorkflowError::DeviceUnavailable)?;
    run_workflow_with(controller, first, open_source, display, out)
}

/// [`run_workflow`] with the first phase's source already acquired.
///
/// `open_source` is only called for the phases after the first.
#[cfg_attr(feature = "tracing", instrument(level = "info", skip_all))]
pub fn run_workflow_with<S, O>(
    controller: &mut Controller,
    first: S,
    mut open_source: O,
    display: &mut dyn Display,
    out: &mut dyn Write,
) -> Result<RunSummary, WorkflowError>
where
    S: FrameSource,
    O: FnMut() -> Result<S, FrameError>,
{
    let line_len = controller.session().pattern().rows();
    let mut acquired = Some(first);

    while controller.phase() != Phase::Done {
        let phase = controller.phase();
        let mut source = match acquired.take() {
            Some(source) => source,
            None => open_source().map_err(WorkflowError::DeviceUnavailable)?,
        };
        info!("{} phase started", phase.window_title());
        writeln!(out, "{}", phase.instructions())?;

        loop {
            let frame = source.read()?;
            let detection = controller.detect(&frame);
            let key = match &detection {
                Some(corners) => {
                    display.show(phase.window_title(), &annotate(&frame, corners, line_len))?
                }
                None => display.show(phase.window_title(), &frame)?,
            };

            let outcome = controller.dispatch(key, detection)?;
            for effect in &outcome.effects {
                apply_effect(effect, &frame, out)?;
            }
            if outcome.flow != Flow::Continue {
                break;
            }
        }
    }
    Ok(RunSummary::of(controller))
}

fn apply_effect(effect: &Effect, frame: &RgbImage, out: &mut dyn Write) -> Result<(), WorkflowError> {
    match effect {
        Effect::Captured { count } => writeln!(out, "{}", report::captured(*count))?,
        Effect::Calibrated(intrinsics) => writeln!(out, "{}", report::calibration(intrinsics))?,
        Effect::PoseSolved(pose) => writeln!(out, "{}", report::pose(pose))?,
        Effect::SaveFrame { path } => {
            frame.save(path).map_err(|source| WorkflowError::SaveFrame {
                path: path.clone(),
                source,
            })?;
            writeln!(out, "{}", report::saved(path))?;
        }
    }
    Ok(())
}

/// Run with the configured source and display: the live window when built
/// with `live` and no key script is given, headless otherwise.
///
/// The first source is acquired before any window exists, so a missing
/// device fails the run straight away.
pub fn run(config: &CalibConfig) -> Result<RunSummary, WorkflowError> {
    let first = config
        .open_source()
        .map_err(WorkflowError::DeviceUnavailable)?;

    #[cfg(feature = "live")]
    if config.keys.is_none() {
        return crate::gui::run_live(config.clone(), first);
    }

    let mut controller = config.controller();
    let mut display = HeadlessDisplay::new(KeyScript::parse(config.keys.as_deref().unwrap_or("")));
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    run_workflow_with(
        &mut controller,
        first,
        || config.open_source(),
        &mut display,
        &mut out,
    )
}
