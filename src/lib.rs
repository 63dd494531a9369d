//! Whole-slide annotations to YOLO dataset converter
//!
//! This library turns polygon annotations of a GeoJSON feature collection into
//! cropped image/label pairs, splits them per class into train/test/val trees
//! and hands the result to an external trainer.

pub mod config;
pub mod dataset;
pub mod error;
pub mod extraction;
pub mod reduce;
pub mod slide;
pub mod training;
pub mod types;
pub mod utils;

// Re-export commonly used types and functions
pub use config::{ClassArgs, Cli, Command, PipelineConfig, SplitRatios};
pub use dataset::{split_samples, ClassGroups, DatasetSplitter, Split, SplitStats};
pub use error::{PrepError, Result};
pub use extraction::RegionExtractor;
pub use reduce::{reduce_collection, BoundingBoxReducer};
pub use slide::{RasterSlide, Region, SlideReader};
pub use training::TrainingInvoker;
pub use types::{
    BoundingBox, ClassMap, ExtractedSample, Feature, FeatureCollection, SampleId, YoloLabel,
    UNKNOWN_CLASS_ID,
};
