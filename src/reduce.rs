use log::info;
use std::path::PathBuf;

use crate::config::PipelineConfig;
use crate::error::Result;
use crate::types::{Feature, FeatureCollection};
use crate::utils::{read_feature_collection, write_feature_collection};

/// Replace a polygon geometry with its bounding rectangle.
/// Anything that isn't a polygon is left alone.
pub fn reduce_feature(index: usize, feature: &mut Feature) -> Result<()> {
    let Some(geometry) = feature.geometry.as_ref().filter(|g| g.is_polygon()) else {
        return Ok(());
    };
    let rectangle = geometry.bounding_rectangle(index)?;
    feature.geometry = Some(rectangle);
    Ok(())
}

pub fn reduce_collection(mut collection: FeatureCollection) -> Result<FeatureCollection> {
    for (index, feature) in collection.features.iter_mut().enumerate() {
        reduce_feature(index, feature)?;
    }
    Ok(collection)
}

/// Rewrites an annotation file so every polygon becomes a box
pub struct BoundingBoxReducer {
    annotation_path: PathBuf,
    output_path: PathBuf,
}

impl BoundingBoxReducer {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            annotation_path: config.annotation_path.clone(),
            output_path: config.reduced_annotation_path.clone(),
        }
    }

    /// Returns the path written
    pub fn run(&self) -> Result<PathBuf> {
        let collection = read_feature_collection(&self.annotation_path)?;
        let reduced = reduce_collection(collection)?;
        write_feature_collection(&self.output_path, &reduced)?;
        info!(
            "New GeoJSON file with bounding boxes has been saved to: {}",
            self.output_path.display()
        );
        Ok(self.output_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PrepError;
    use serde_json::json;

    fn collection(features: serde_json::Value) -> FeatureCollection {
        serde_json::from_value(json!({ "type": "FeatureCollection", "features": features }))
            .unwrap()
    }

    #[test]
    fn polygon_becomes_closed_rectangle() {
        let reduced = reduce_collection(collection(json!([{
            "type": "Feature",
            "geometry": {
                "type": "Polygon",
                "coordinates": [
                    [[12.5, 40.0], [30.0, 10.0], [50.0, 22.0], [12.5, 40.0]],
                    [[20.0, 20.0], [21.0, 20.0], [21.0, 21.0], [20.0, 20.0]]
                ]
            },
            "properties": { "classification": { "name": "Mitosis" } }
        }])))
        .unwrap();

        let geometry = reduced.features[0].geometry.as_ref().unwrap();
        assert_eq!(geometry.kind, "Polygon");
        assert_eq!(
            geometry.coordinates,
            json!([[[12.5, 10.0], [12.5, 40.0], [50.0, 40.0], [50.0, 10.0], [12.5, 10.0]]])
        );
        assert_eq!(reduced.features[0].classification_name(), Some("Mitosis"));
    }

    #[test]
    fn other_geometries_pass_through() {
        let features = json!([
            { "type": "Feature", "geometry": { "type": "Point", "coordinates": [3, 4] }, "properties": {} },
            { "type": "Feature", "geometry": {
                "type": "MultiPolygon",
                "coordinates": [[[[0, 0], [1, 0], [1, 1], [0, 0]]]]
            }, "properties": {} },
            { "type": "Feature", "geometry": null, "properties": {} }
        ]);
        let original = collection(features.clone());
        let reduced = reduce_collection(collection(features)).unwrap();
        for (before, after) in original.features.iter().zip(&reduced.features) {
            assert_eq!(before.geometry, after.geometry);
        }
    }

    #[test]
    fn empty_ring_is_an_error() {
        let result = reduce_collection(collection(json!([
            { "type": "Feature", "geometry": { "type": "Polygon", "coordinates": [[[1, 1], [2, 2], [1, 1]]] } },
            { "type": "Feature", "geometry": { "type": "Polygon", "coordinates": [[]] } }
        ])));
        assert!(matches!(
            result,
            Err(PrepError::MalformedGeometry { feature: 1, .. })
        ));
    }

    #[test]
    fn run_writes_reduced_file() {
        let temp_dir = tempfile::tempdir().unwrap();
        let annotation_path = temp_dir.path().join("slide.geojson");
        std::fs::write(
            &annotation_path,
            r#"{"type":"FeatureCollection","features":[{"type":"Feature",
                "geometry":{"type":"Polygon","coordinates":[[[0,0],[4,2],[1,5],[0,0]]]},
                "properties":{}}]}"#,
        )
        .unwrap();
        let config = PipelineConfig {
            annotation_path,
            reduced_annotation_path: temp_dir.path().join("out/new_geojson.geojson"),
            ..PipelineConfig::default()
        };

        let written = BoundingBoxReducer::new(&config).run().unwrap();

        let reduced = read_feature_collection(&written).unwrap();
        let ring = reduced.features[0]
            .geometry
            .as_ref()
            .unwrap()
            .exterior_ring(0)
            .unwrap();
        assert_eq!(
            ring,
            vec![(0.0, 0.0), (0.0, 5.0), (4.0, 5.0), (4.0, 0.0), (0.0, 0.0)]
        );

        // integer input is written back without a decimal point
        let text = std::fs::read_to_string(&written).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(
            raw["features"][0]["geometry"]["coordinates"],
            json!([[[0, 0], [0, 5], [4, 5], [4, 0], [0, 0]]])
        );
        assert!(!text.contains(".0"));
    }
}
