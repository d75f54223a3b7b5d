use camcal::{run, CalibConfig, Cli};
use clap::Parser;
use std::process::ExitCode;

fn init_logging(config: &CalibConfig) {
    #[cfg(feature = "tracing")]
    camcal::core::init_tracing(&config.log_level);
    #[cfg(not(feature = "tracing"))]
    {
        let level = camcal::core::parse_level_filter(&config.log_level)
            .unwrap_or(log::LevelFilter::Info);
        let _ = camcal::core::init_with_level(level);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let config = match cli.resolve() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {err}");
            return ExitCode::from(2);
        }
    };

    if cli.dump_config {
        return match serde_json::to_string_pretty(&config) {
            Ok(json) => {
                println!("{json}");
                ExitCode::SUCCESS
            }
            Err(err) => {
                eprintln!("error: {err}");
                ExitCode::from(2)
            }
        };
    }

    init_logging(&config);
    match run(&config) {
        Ok(summary) => {
            log::info!(
                "done: {} samples, pose {}",
                summary.samples,
                if summary.extrinsics.is_some() { "saved" } else { "skipped" }
            );
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{err}");
            ExitCode::from(1)
        }
    }
}
