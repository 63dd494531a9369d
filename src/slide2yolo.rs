use clap::Parser;
use log::{error, info};
use std::process::ExitCode;

use slide2yolo::{
    BoundingBoxReducer, Cli, Command, DatasetSplitter, PipelineConfig, RegionExtractor,
    TrainingInvoker,
};

fn run(command: &Command, config: &PipelineConfig) -> slide2yolo::Result<()> {
    match command {
        Command::Reduce => {
            BoundingBoxReducer::new(config).run()?;
        }
        Command::Extract(_) => {
            RegionExtractor::new(config).run()?;
        }
        Command::Split => {
            DatasetSplitter::new(config).run()?;
        }
        Command::Train => TrainingInvoker::new(config).run()?,
        Command::All { skip_train, .. } => {
            // Catch a bad split before spending time on extraction
            config.split_ratios.validate()?;
            RegionExtractor::new(config).run()?;
            DatasetSplitter::new(config).run()?;
            if *skip_train {
                info!("Skipping training.");
            } else {
                TrainingInvoker::new(config).run()?;
            }
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    // Initialize the logger
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let config = cli.to_config();

    info!("Starting {:?}...", cli.command);
    match run(&cli.command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("Failed to prepare dataset: {}", e);
            ExitCode::FAILURE
        }
    }
}
