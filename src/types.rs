use image::RgbImage;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use std::collections::HashMap;
use std::fmt;

use crate::error::{PrepError, Result};

/// Geometry type handled by the reducer and the extractor
pub const POLYGON: &str = "Polygon";

/// Class id emitted for classification names missing from the class map
pub const UNKNOWN_CLASS_ID: i32 = -1;

fn feature_collection_type() -> String {
    "FeatureCollection".to_string()
}

fn feature_type() -> String {
    "Feature".to_string()
}

// A GeoJSON feature collection as exported by QuPath. Members we don't
// interpret are carried through `extra` so a rewrite keeps them.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct FeatureCollection {
    #[serde(rename = "type", default = "feature_collection_type")]
    pub kind: String,
    pub features: Vec<Feature>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

// One annotated region
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Feature {
    #[serde(rename = "type", default = "feature_type")]
    pub kind: String,
    #[serde(default)]
    pub geometry: Option<Geometry>,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub properties: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Feature {
    /// `properties.classification.name`, if present
    pub fn classification_name(&self) -> Option<&str> {
        self.properties
            .get("classification")
            .and_then(|classification| classification.get("name"))
            .and_then(Value::as_str)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Geometry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub coordinates: Value,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Geometry {
    pub fn is_polygon(&self) -> bool {
        self.kind == POLYGON
    }

    /// Closed rectangle around the exterior ring:
    /// (min,min) -> (min,max) -> (max,max) -> (max,min) -> (min,min).
    /// Corners reuse the ring's own numbers, so integer input stays integer.
    pub fn bounding_rectangle(&self, feature: usize) -> Result<Self> {
        let positions = self.exterior_positions(feature)?;
        let Some((&[first_x, first_y], rest)) = positions.split_first() else {
            return Err(PrepError::MalformedGeometry {
                feature,
                reason: "empty exterior ring".to_string(),
            });
        };

        let (mut min_x, mut max_x, mut min_y, mut max_y) = (first_x, first_x, first_y, first_y);
        for &[x, y] in rest {
            if x.0 < min_x.0 {
                min_x = x;
            }
            if x.0 > max_x.0 {
                max_x = x;
            }
            if y.0 < min_y.0 {
                min_y = y;
            }
            if y.0 > max_y.0 {
                max_y = y;
            }
        }

        let ring = vec![
            corner(min_x.1, min_y.1),
            corner(min_x.1, max_y.1),
            corner(max_x.1, max_y.1),
            corner(max_x.1, min_y.1),
            corner(min_x.1, min_y.1),
        ];
        Ok(Self {
            kind: POLYGON.to_string(),
            coordinates: Value::Array(vec![Value::Array(ring)]),
            extra: Map::new(),
        })
    }

    /// Parse the first ring of a polygon into `(x, y)` points, ignoring holes.
    /// `feature` is only used to label errors.
    pub fn exterior_ring(&self, feature: usize) -> Result<Vec<(f64, f64)>> {
        Ok(self
            .exterior_positions(feature)?
            .into_iter()
            .map(|[x, y]| (x.0, y.0))
            .collect())
    }

    // Each coordinate as its float value alongside the number it was read from
    fn exterior_positions(&self, feature: usize) -> Result<Vec<[(f64, &Number); 2]>> {
        let malformed = |reason: String| PrepError::MalformedGeometry { feature, reason };

        let ring = self
            .coordinates
            .get(0)
            .and_then(Value::as_array)
            .ok_or_else(|| malformed("missing exterior ring".to_string()))?;

        ring.iter()
            .map(|position| match (coordinate(position, 0), coordinate(position, 1)) {
                (Some(x), Some(y)) => Ok([x, y]),
                _ => Err(malformed(format!("non-numeric position {}", position))),
            })
            .collect()
    }
}

fn coordinate(position: &Value, axis: usize) -> Option<(f64, &Number)> {
    match position.get(axis) {
        Some(Value::Number(number)) => number.as_f64().map(|value| (value, number)),
        _ => None,
    }
}

fn corner(x: &Number, y: &Number) -> Value {
    Value::Array(vec![Value::Number(x.clone()), Value::Number(y.clone())])
}

/// Axis-aligned rectangle enclosing a polygon
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl BoundingBox {
    /// Returns `None` for an empty point list.
    pub fn from_points(points: &[(f64, f64)]) -> Option<Self> {
        if points.is_empty() {
            return None;
        }
        let (min_x, min_y, max_x, max_y) = points.iter().fold(
            (f64::MAX, f64::MAX, f64::MIN, f64::MIN),
            |(min_x, min_y, max_x, max_y), &(x, y)| {
                (min_x.min(x), min_y.min(y), max_x.max(x), max_y.max(y))
            },
        );
        Some(Self {
            min_x,
            min_y,
            max_x,
            max_y,
        })
    }

    pub fn width(&self) -> f64 {
        self.max_x - self.min_x
    }

    pub fn height(&self) -> f64 {
        self.max_y - self.min_y
    }

    pub fn is_degenerate(&self) -> bool {
        self.width() <= 0.0 || self.height() <= 0.0
    }

    /// YOLO-style `(x_center, y_center, width, height)` of `self` relative to `frame`.
    /// `frame` must not be degenerate.
    pub fn normalized_within(&self, frame: &BoundingBox) -> (f64, f64, f64, f64) {
        let frame_width = frame.width();
        let frame_height = frame.height();
        let x_center = ((self.min_x + self.max_x) / 2.0 - frame.min_x) / frame_width;
        let y_center = ((self.min_y + self.max_y) / 2.0 - frame.min_y) / frame_height;
        (
            x_center,
            y_center,
            self.width() / frame_width,
            self.height() / frame_height,
        )
    }
}

/// Mapping from classification name to class id
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassMap {
    ids: HashMap<String, u32>,
}

impl ClassMap {
    /// Ids follow list order, like an ordered label list
    pub fn from_labels<S: AsRef<str>>(labels: &[S]) -> Self {
        labels
            .iter()
            .enumerate()
            .map(|(id, label)| (label.as_ref().to_string(), id as u32))
            .collect()
    }

    /// Class id for `name`, or [`UNKNOWN_CLASS_ID`] when the name is unmapped or absent
    pub fn class_id(&self, name: Option<&str>) -> i32 {
        name.and_then(|name| self.ids.get(name))
            .map_or(UNKNOWN_CLASS_ID, |&id| id as i32)
    }

    /// Names sorted by id
    pub fn names(&self) -> Vec<(u32, &str)> {
        let mut names: Vec<_> = self
            .ids
            .iter()
            .map(|(name, &id)| (id, name.as_str()))
            .collect();
        names.sort();
        names
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

impl Default for ClassMap {
    fn default() -> Self {
        Self::from_labels(&["Mitosis", "Kayrorrhexis"])
    }
}

impl FromIterator<(String, u32)> for ClassMap {
    fn from_iter<I: IntoIterator<Item = (String, u32)>>(iter: I) -> Self {
        Self {
            ids: iter.into_iter().collect(),
        }
    }
}

/// Identifier shared by a sample's image file and label file
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SampleId(pub usize);

impl SampleId {
    pub fn image_file_name(&self) -> String {
        format!("image_{}.png", self.0)
    }

    pub fn label_file_name(&self) -> String {
        format!("image_{}.txt", self.0)
    }
}

impl fmt::Display for SampleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One line of a YOLO label file, coordinates normalized to `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct YoloLabel {
    pub class_id: i32,
    pub x_center: f64,
    pub y_center: f64,
    pub width: f64,
    pub height: f64,
}

impl fmt::Display for YoloLabel {
    // `{:?}` keeps the decimal point on whole numbers (`1.0`, not `1`)
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {:?} {:?} {:?} {:?}",
            self.class_id, self.x_center, self.y_center, self.width, self.height
        )
    }
}

// A cropped region and its label, written once and never touched again
#[derive(Debug, Clone)]
pub struct ExtractedSample {
    pub id: SampleId,
    pub image: RgbImage,
    pub label: YoloLabel,
}

// Struct to hold extraction statistics
#[derive(Debug, Default, Clone)]
pub struct ExtractionStats {
    pub features_seen: usize,
    pub samples_written: usize,
    pub skipped_degenerate: usize,
    pub unknown_class: usize,
}

impl ExtractionStats {
    pub fn print_summary(&self) {
        log::info!("=== Extraction Summary ===");
        log::info!("Features processed: {}", self.features_seen);
        log::info!("Samples written: {}", self.samples_written);
        log::info!("Skipped (degenerate bounding box): {}", self.skipped_degenerate);
        if self.unknown_class > 0 {
            log::warn!(
                "Samples with an unmapped classification (class id {}): {}",
                UNKNOWN_CLASS_ID,
                self.unknown_class
            );
        }
    }
}
