//! Live preview window (`eframe`).
//!
//! The event loop owns the main thread. The workflow runs on a worker
//! thread and talks to the window over two channels: annotated frames one
//! way, typed keys the other. Closing the window ends the run; the worker
//! finishing closes the window.

use crate::config::CalibConfig;
use crate::error::WorkflowError;
use crate::frame::FrameSource;
use crate::workflow::{run_workflow_with, Display, RunSummary};
use eframe::egui;
use image::RgbImage;
use log::debug;
use std::sync::mpsc::{self, Receiver, Sender, SyncSender, TryRecvError};
use std::thread;
use std::time::Duration;

type TitledFrame = (String, RgbImage);

/// Worker-side end of the window.
struct ChannelDisplay {
    frames: SyncSender<TitledFrame>,
    keys: Receiver<char>,
}

impl Display for ChannelDisplay {
    fn show(&mut self, title: &str, frame: &RgbImage) -> Result<Option<char>, WorkflowError> {
        self.frames
            .send((title.to_string(), frame.clone()))
            .map_err(|_| WorkflowError::Display("preview window closed".to_string()))?;
        Ok(self.keys.try_recv().ok())
    }
}

struct PreviewApp {
    frames: Receiver<TitledFrame>,
    keys: Sender<char>,
    texture: Option<egui::TextureHandle>,
    title: String,
}

impl PreviewApp {
    fn latest_frame(&mut self, ctx: &egui::Context) {
        let mut latest = None;
        loop {
            match self.frames.try_recv() {
                Ok(frame) => latest = Some(frame),
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    debug!("workflow finished, closing the preview");
                    ctx.send_viewport_cmd(egui::ViewportCommand::Close);
                    break;
                }
            }
        }
        let Some((title, frame)) = latest else {
            return;
        };

        if title != self.title {
            ctx.send_viewport_cmd(egui::ViewportCommand::Title(title.clone()));
            self.title = title;
        }
        let size = [frame.width() as usize, frame.height() as usize];
        let image = egui::ColorImage::from_rgb(size, frame.as_raw());
        match &mut self.texture {
            Some(texture) => texture.set(image, egui::TextureOptions::LINEAR),
            None => {
                self.texture = Some(ctx.load_texture("frame", image, egui::TextureOptions::LINEAR))
            }
        }
    }
}

impl eframe::App for PreviewApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.latest_frame(ctx);

        let typed: Vec<char> = ctx.input(|i| {
            i.events
                .iter()
                .filter_map(|e| match e {
                    egui::Event::Text(text) => Some(text.chars().collect::<Vec<_>>()),
                    _ => None,
                })
                .flatten()
                .collect()
        });
        for key in typed {
            // The worker is gone once the run has ended.
            let _ = self.keys.send(key);
        }

        egui::CentralPanel::default().show(ctx, |ui| match &self.texture {
            Some(texture) => {
                ui.add(egui::Image::new((texture.id(), texture.size_vec2())).shrink_to_fit());
            }
            None => {
                ui.label("Waiting for the camera...");
            }
        });
        ctx.request_repaint_after(Duration::from_millis(10));
    }
}

/// Run the workflow with a live preview window.
///
/// `first` is the phase-one source, acquired by the caller before any window
/// is created.
pub fn run_live(
    config: CalibConfig,
    first: Box<dyn FrameSource + Send>,
) -> Result<RunSummary, WorkflowError> {
    let (frame_tx, frame_rx) = mpsc::sync_channel::<TitledFrame>(1);
    let (key_tx, key_rx) = mpsc::channel::<char>();

    let worker = thread::spawn(move || {
        let mut controller = config.controller();
        let mut display = ChannelDisplay {
            frames: frame_tx,
            keys: key_rx,
        };
        let stdout = std::io::stdout();
        let mut out = stdout.lock();
        run_workflow_with(
            &mut controller,
            first,
            || config.open_source(),
            &mut display,
            &mut out,
        )
    });

    let app = PreviewApp {
        frames: frame_rx,
        keys: key_tx,
        texture: None,
        title: String::new(),
    };
    let options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title("Calibration")
            .with_inner_size([960.0, 720.0]),
        ..Default::default()
    };
    eframe::run_native("camcal", options, Box::new(|_cc| Ok(Box::new(app))))
        .map_err(|e| WorkflowError::Display(e.to_string()))?;

    worker
        .join()
        .map_err(|_| WorkflowError::Display("workflow thread panicked".to_string()))?
}
