use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::str::FromStr;

use crate::error::{PrepError, Result};
use crate::types::ClassMap;

/// Allowed deviation of the split ratio sum from 1
pub const RATIO_TOLERANCE: f64 = 0.01;

/// Command-line arguments for turning slide annotations into a YOLO dataset.
#[derive(Parser, Debug, Clone)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Whole-slide image to crop regions from
    #[arg(long = "source", global = true, default_value = "DI-MH-694-05.svs")]
    pub source_path: PathBuf,

    /// GeoJSON feature collection with the polygon annotations
    #[arg(
        long = "annotations",
        global = true,
        default_value = "DI-MH-694-05_big.geojson"
    )]
    pub annotation_path: PathBuf,

    /// Directory receiving crops, labels and the split tree
    #[arg(long = "output-dir", global = true, default_value = "subcell7")]
    pub output_dir: PathBuf,

    /// Where the bounding-box GeoJSON is written [default: <output-dir>/new_geojson.geojson]
    #[arg(long = "reduced-annotations", global = true)]
    pub reduced_annotation_path: Option<PathBuf>,

    /// Proportion of each class used for training
    #[arg(long = "train-size", global = true, default_value_t = 0.70, value_parser = validate_size)]
    pub train_size: f64,

    /// Proportion of each class used for testing
    #[arg(long = "test-size", global = true, default_value_t = 0.15, value_parser = validate_size)]
    pub test_size: f64,

    /// Proportion of each class used for validation
    #[arg(long = "val-size", global = true, default_value_t = 0.15, value_parser = validate_size)]
    pub val_size: f64,

    /// Seed for random shuffling
    #[arg(long = "seed", global = true, default_value_t = 42)]
    pub seed: u64,

    /// Also copy label files into the split tree
    #[arg(long = "copy-labels", global = true)]
    pub copy_labels: bool,

    /// Pretrained model handed to the trainer
    #[arg(long = "model", global = true, default_value = "yolov8n-cls.pt")]
    pub model: String,

    /// Dataset root handed to the trainer [default: <output-dir>]
    #[arg(long = "dataset-dir", global = true)]
    pub dataset_dir: Option<PathBuf>,

    /// Number of training epochs
    #[arg(long = "epochs", global = true, default_value_t = 50)]
    pub epochs: u32,

    /// Training input image size
    #[arg(long = "imgsz", global = true, default_value_t = 128)]
    pub image_size: u32,

    /// Trainer executable
    #[arg(long = "yolo-bin", global = true, default_value = "yolo")]
    pub yolo_bin: String,
}

/// Classification names for the steps that assign class ids
#[derive(Args, Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassArgs {
    /// List of classes in id order [default: Mitosis,Kayrorrhexis]
    #[arg(value_delimiter = ',')]
    pub class_list: Vec<String>,
}

impl ClassArgs {
    pub fn class_map(&self) -> ClassMap {
        if self.class_list.is_empty() {
            ClassMap::default()
        } else {
            ClassMap::from_labels(&self.class_list)
        }
    }
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Rewrite polygon geometries as their bounding rectangles
    Reduce,
    /// Crop annotated regions and write image/label pairs
    Extract(ClassArgs),
    /// Split extracted samples into train/test/val per class
    Split,
    /// Run the external trainer on the split dataset
    Train,
    /// Extract, split, then train
    All {
        /// Stop after splitting
        #[arg(long = "skip-train")]
        skip_train: bool,

        #[command(flatten)]
        classes: ClassArgs,
    },
}

impl Command {
    fn class_map(&self) -> ClassMap {
        match self {
            Command::Extract(classes) | Command::All { classes, .. } => classes.class_map(),
            _ => ClassMap::default(),
        }
    }
}

impl Cli {
    pub fn to_config(&self) -> PipelineConfig {
        let class_map = self.command.class_map();
        PipelineConfig {
            source_path: self.source_path.clone(),
            annotation_path: self.annotation_path.clone(),
            reduced_annotation_path: self
                .reduced_annotation_path
                .clone()
                .unwrap_or_else(|| self.output_dir.join(REDUCED_FILE_NAME)),
            dataset_dir: self
                .dataset_dir
                .clone()
                .unwrap_or_else(|| self.output_dir.clone()),
            output_dir: self.output_dir.clone(),
            class_map,
            split_ratios: SplitRatios {
                train: self.train_size,
                test: self.test_size,
                val: self.val_size,
            },
            seed: self.seed,
            copy_labels: self.copy_labels,
            model: self.model.clone(),
            epoch_count: self.epochs,
            image_size: self.image_size,
            yolo_bin: self.yolo_bin.clone(),
        }
    }
}

const REDUCED_FILE_NAME: &str = "new_geojson.geojson";

/// Everything the pipeline components need, handed to each at construction
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub source_path: PathBuf,
    pub annotation_path: PathBuf,
    pub reduced_annotation_path: PathBuf,
    pub output_dir: PathBuf,
    pub dataset_dir: PathBuf,
    pub class_map: ClassMap,
    pub split_ratios: SplitRatios,
    pub seed: u64,
    pub copy_labels: bool,
    pub model: String,
    pub epoch_count: u32,
    pub image_size: u32,
    pub yolo_bin: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let output_dir = PathBuf::from("subcell7");
        Self {
            source_path: PathBuf::from("DI-MH-694-05.svs"),
            annotation_path: PathBuf::from("DI-MH-694-05_big.geojson"),
            reduced_annotation_path: output_dir.join(REDUCED_FILE_NAME),
            dataset_dir: output_dir.clone(),
            output_dir,
            class_map: ClassMap::default(),
            split_ratios: SplitRatios::default(),
            seed: 42,
            copy_labels: false,
            model: "yolov8n-cls.pt".to_string(),
            epoch_count: 50,
            image_size: 128,
            yolo_bin: "yolo".to_string(),
        }
    }
}

/// Train/test/val proportions applied to every class
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub test: f64,
    pub val: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.70,
            test: 0.15,
            val: 0.15,
        }
    }
}

impl SplitRatios {
    pub fn validate(&self) -> Result<()> {
        if ((self.train + self.test + self.val) - 1.0).abs() < RATIO_TOLERANCE {
            Ok(())
        } else {
            Err(PrepError::InvalidSplitRatios {
                train: self.train,
                test: self.test,
                val: self.val,
            })
        }
    }

    /// Share of the non-training remainder that goes to test
    pub fn relative_test(&self) -> f64 {
        let rest = self.test + self.val;
        if rest > 0.0 {
            self.test / rest
        } else {
            0.0
        }
    }
}

// Validate that the size is between 0.0 and 1.0
fn validate_size(s: &str) -> std::result::Result<f64, String> {
    match f64::from_str(s) {
        Ok(val) if (0.0..=1.0).contains(&val) => Ok(val),
        _ => Err("SIZE must be between 0.0 and 1.0".to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_size() {
        assert!(validate_size("0.5").is_ok());
        assert!(validate_size("1.0").is_ok());
        assert!(validate_size("0.0").is_ok());
        assert!(validate_size("-0.1").is_err());
        assert!(validate_size("1.1").is_err());
        assert!(validate_size("abc").is_err());
    }

    #[test]
    fn ratios_outside_tolerance_are_rejected() {
        let ratios = SplitRatios {
            train: 0.8,
            test: 0.1,
            val: 0.2,
        };
        assert!(matches!(
            ratios.validate(),
            Err(PrepError::InvalidSplitRatios { .. })
        ));
        assert!(SplitRatios::default().validate().is_ok());
        assert!(SplitRatios {
            train: 0.7,
            test: 0.15,
            val: 0.145
        }
        .validate()
        .is_ok());
    }

    #[test]
    fn relative_test_share() {
        assert_eq!(SplitRatios::default().relative_test(), 0.5);
        let only_train = SplitRatios {
            train: 1.0,
            test: 0.0,
            val: 0.0,
        };
        assert_eq!(only_train.relative_test(), 0.0);
    }

    #[test]
    fn cli_defaults_match_pipeline_defaults() {
        let cli = Cli::parse_from(["slide2yolo", "extract"]);
        let config = cli.to_config();
        let defaults = PipelineConfig::default();
        assert_eq!(cli.command, Command::Extract(ClassArgs::default()));
        assert_eq!(config.source_path, defaults.source_path);
        assert_eq!(config.annotation_path, defaults.annotation_path);
        assert_eq!(config.reduced_annotation_path, defaults.reduced_annotation_path);
        assert_eq!(config.dataset_dir, defaults.dataset_dir);
        assert_eq!(config.class_map, defaults.class_map);
        assert_eq!(config.split_ratios, defaults.split_ratios);
        assert_eq!(config.epoch_count, 50);
        assert_eq!(config.image_size, 128);
    }

    #[test]
    fn class_list_replaces_default_map() {
        let cli = Cli::parse_from([
            "slide2yolo",
            "all",
            "--skip-train",
            "--output-dir",
            "out",
            "Tumor,Stroma",
        ]);
        let config = cli.to_config();
        assert_eq!(
            cli.command,
            Command::All {
                skip_train: true,
                classes: ClassArgs {
                    class_list: vec!["Tumor".to_string(), "Stroma".to_string()],
                },
            }
        );
        assert_eq!(config.class_map.class_id(Some("Stroma")), 1);
        assert_eq!(config.class_map.class_id(Some("Mitosis")), -1);
        assert_eq!(config.dataset_dir, PathBuf::from("out"));
        assert_eq!(
            config.reduced_annotation_path,
            PathBuf::from("out/new_geojson.geojson")
        );
    }

    #[test]
    fn class_list_accepts_separate_values() {
        let cli = Cli::parse_from(["slide2yolo", "extract", "Tumor", "Stroma,Necrosis"]);
        let config = cli.to_config();
        assert_eq!(config.class_map.class_id(Some("Tumor")), 0);
        assert_eq!(config.class_map.class_id(Some("Necrosis")), 2);
    }
}
