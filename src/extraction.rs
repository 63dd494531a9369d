//! Cropping annotated regions out of a slide.
//!
//! Every feature of the collection becomes one sample: a PNG crop of its
//! bounding box and a one-line YOLO label file, both named after the
//! feature's [`SampleId`].

use image::DynamicImage;
use log::{debug, info, warn};
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::{PrepError, Result};
use crate::slide::{RasterSlide, Region, SlideReader};
use crate::types::{
    BoundingBox, ClassMap, ExtractedSample, ExtractionStats, Feature, FeatureCollection,
    SampleId, YoloLabel, UNKNOWN_CLASS_ID,
};
use crate::utils::{read_feature_collection, step_progress_bar};

/// Pixel rectangle covering `bbox` at full resolution, coordinates truncated toward zero
pub fn pixel_region(bbox: &BoundingBox) -> Region {
    Region {
        x: bbox.min_x as i64,
        y: bbox.min_y as i64,
        level: 0,
        width: bbox.width() as u32,
        height: bbox.height() as u32,
    }
}

pub struct RegionExtractor {
    source_path: PathBuf,
    annotation_path: PathBuf,
    output_dir: PathBuf,
    class_map: ClassMap,
}

impl RegionExtractor {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            source_path: config.source_path.clone(),
            annotation_path: config.annotation_path.clone(),
            output_dir: config.output_dir.clone(),
            class_map: config.class_map.clone(),
        }
    }

    /// Open the configured slide and annotation file and extract every feature
    pub fn run(&self) -> Result<ExtractionStats> {
        let collection = read_feature_collection(&self.annotation_path)?;
        let slide = RasterSlide::open(&self.source_path)?;
        debug!("Class map: {:?}", self.class_map.names());
        let stats = self.extract(&collection, &slide)?;
        info!("Images preprocess finished.");
        Ok(stats)
    }

    /// Extract and write one sample per feature, in collection order.
    /// Samples written before a failure stay on disk.
    pub fn extract<S: SlideReader>(
        &self,
        collection: &FeatureCollection,
        slide: &S,
    ) -> Result<ExtractionStats> {
        fs::create_dir_all(&self.output_dir).map_err(|e| PrepError::io_at(&self.output_dir, e))?;

        let mut stats = ExtractionStats::default();
        let pb = step_progress_bar(collection.features.len() as u64, "Extract", "features");

        for (index, feature) in collection.features.iter().enumerate() {
            stats.features_seen += 1;
            match self.extract_feature(SampleId(index), feature, slide)? {
                Some(sample) => {
                    if sample.label.class_id == UNKNOWN_CLASS_ID {
                        stats.unknown_class += 1;
                    }
                    self.write_sample(&sample)?;
                    stats.samples_written += 1;
                }
                None => stats.skipped_degenerate += 1,
            }
            pb.inc(1);
        }
        pb.finish_with_message("Extraction complete");

        stats.print_summary();
        Ok(stats)
    }

    /// Build the sample for one feature; `None` when its box has no area
    pub fn extract_feature<S: SlideReader>(
        &self,
        id: SampleId,
        feature: &Feature,
        slide: &S,
    ) -> Result<Option<ExtractedSample>> {
        let geometry = feature
            .geometry
            .as_ref()
            .filter(|g| g.is_polygon())
            .ok_or_else(|| PrepError::MalformedGeometry {
                feature: id.0,
                reason: "expected a Polygon geometry".to_string(),
            })?;
        let ring = geometry.exterior_ring(id.0)?;
        let bbox = BoundingBox::from_points(&ring).ok_or_else(|| PrepError::MalformedGeometry {
            feature: id.0,
            reason: "empty exterior ring".to_string(),
        })?;

        let region = pixel_region(&bbox);
        if bbox.is_degenerate() || region.width == 0 || region.height == 0 {
            warn!(
                "Skipping feature {}: bounding box {:?} has no pixel area",
                id, bbox
            );
            return Ok(None);
        }

        let classification = feature.classification_name();
        let class_id = self.class_map.class_id(classification);
        if class_id == UNKNOWN_CLASS_ID {
            debug!(
                "Feature {} has unmapped classification {:?}",
                id, classification
            );
        }

        let raw = slide.read_region(&region)?;
        let image = DynamicImage::ImageRgba8(raw).to_rgb8();

        // The crop is the box itself, so the box spans the whole frame
        let (x_center, y_center, width, height) = bbox.normalized_within(&bbox);
        Ok(Some(ExtractedSample {
            id,
            image,
            label: YoloLabel {
                class_id,
                x_center,
                y_center,
                width,
                height,
            },
        }))
    }

    /// Write `image_<id>.png` and `image_<id>.txt`
    pub fn write_sample(&self, sample: &ExtractedSample) -> Result<()> {
        let image_path = self.output_dir.join(sample.id.image_file_name());
        sample.image.save(&image_path)?;

        let label_path = self.output_dir.join(sample.id.label_file_name());
        let file = File::create(&label_path).map_err(|e| PrepError::io_at(&label_path, e))?;
        let mut writer = BufWriter::new(file);
        writeln!(writer, "{}", sample.label)?;
        writer.flush()?;
        Ok(())
    }
}
