use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use crate::error::{PrepError, Result};
use crate::types::FeatureCollection;

/// Read and parse a GeoJSON feature collection.
/// The file is parsed straight from a buffered stream; slide annotation exports get large.
pub fn read_feature_collection(path: &Path) -> Result<FeatureCollection> {
    let file = File::open(path).map_err(|e| PrepError::io_at(path, e))?;
    let collection: FeatureCollection = serde_json::from_reader(BufReader::new(file))?;
    log::debug!(
        "Read {} features from {}",
        collection.features.len(),
        path.display()
    );
    Ok(collection)
}

/// Write a feature collection with a 4-space indent
pub fn write_feature_collection(path: &Path, collection: &FeatureCollection) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| PrepError::io_at(parent, e))?;
    }
    let file = File::create(path).map_err(|e| PrepError::io_at(path, e))?;
    let mut writer = BufWriter::new(file);
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut serializer = serde_json::Serializer::with_formatter(&mut writer, formatter);
    collection.serialize(&mut serializer)?;
    writer.flush()?;
    Ok(())
}

/// Progress bar for one pipeline step, counting `unit`s (features, files)
pub fn step_progress_bar(len: u64, step: &str, unit: &str) -> ProgressBar {
    let pb = ProgressBar::new(len);
    let template = format!(
        "{{spinner:.green}} {step:<8} [{{elapsed_precise}}] [{{bar:40.cyan/blue}}] {{pos}}/{{len}} {unit} ({{eta}})"
    );
    pb.set_style(
        ProgressStyle::with_template(&template)
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Empty out a split directory left by an earlier run, or create it.
/// Files from a previous split must not leak into the new one.
pub fn recreate_split_dir(path: &Path) -> Result<()> {
    if path.exists() {
        log::warn!("Replacing previous split in {}", path.display());
        fs::remove_dir_all(path).map_err(|e| PrepError::io_at(path, e))?;
    }
    fs::create_dir_all(path).map_err(|e| PrepError::io_at(path, e))
}
