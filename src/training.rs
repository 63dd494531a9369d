use log::info;
use std::path::PathBuf;
use std::process::Command;

use crate::config::PipelineConfig;
use crate::error::{PrepError, Result};

/// Hands the split dataset to the ultralytics `yolo` CLI
pub struct TrainingInvoker {
    yolo_bin: String,
    model: String,
    dataset_dir: PathBuf,
    epochs: u32,
    image_size: u32,
}

impl TrainingInvoker {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            yolo_bin: config.yolo_bin.clone(),
            model: config.model.clone(),
            dataset_dir: config.dataset_dir.clone(),
            epochs: config.epoch_count,
            image_size: config.image_size,
        }
    }

    /// `yolo classify train model=.. data=.. epochs=.. imgsz=..`
    pub fn command(&self) -> Command {
        let mut command = Command::new(&self.yolo_bin);
        command
            .arg("classify")
            .arg("train")
            .arg(format!("model={}", self.model))
            .arg(format!("data={}", self.dataset_dir.display()))
            .arg(format!("epochs={}", self.epochs))
            .arg(format!("imgsz={}", self.image_size));
        command
    }

    pub fn run(&self) -> Result<()> {
        info!(
            "Training {} on {} for {} epochs (imgsz={})",
            self.model,
            self.dataset_dir.display(),
            self.epochs,
            self.image_size
        );
        let status = self.command().status().map_err(|e| {
            PrepError::Training(format!("could not launch {}: {}", self.yolo_bin, e))
        })?;
        if !status.success() {
            return Err(PrepError::Training(format!(
                "{} exited with {}",
                self.yolo_bin, status
            )));
        }
        info!("Training finished.");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::ffi::OsStr;

    #[test]
    fn command_carries_training_settings() {
        let config = PipelineConfig {
            dataset_dir: PathBuf::from("subcell7"),
            ..PipelineConfig::default()
        };
        let command = TrainingInvoker::new(&config).command();

        assert_eq!(command.get_program(), OsStr::new("yolo"));
        let args: Vec<_> = command.get_args().collect();
        assert_eq!(
            args,
            vec![
                OsStr::new("classify"),
                OsStr::new("train"),
                OsStr::new("model=yolov8n-cls.pt"),
                OsStr::new("data=subcell7"),
                OsStr::new("epochs=50"),
                OsStr::new("imgsz=128"),
            ]
        );
    }

    #[test]
    fn missing_trainer_is_a_training_error() {
        let config = PipelineConfig {
            yolo_bin: "slide2yolo-no-such-trainer".to_string(),
            ..PipelineConfig::default()
        };
        assert!(matches!(
            TrainingInvoker::new(&config).run(),
            Err(PrepError::Training(_))
        ));
    }
}
