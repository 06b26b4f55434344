//! Region catalog resolution against the boundary set.
//!
//! The boundary set is a GeoJSON FeatureCollection exported from the
//! administrative shapefile by the data-curation side; this module resolves
//! the configured region list against it and applies the bounding-box filter.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use geo::{BoundingRect, Centroid, Contains, Coord, Intersects, LineString, MultiPolygon, Polygon, Rect};
use serde::Deserialize;
use thiserror::Error;

use crate::config::RegionSpec;

/// Errors produced while loading or resolving the region catalog.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Failed to read the boundary file.
    #[error("Failed to read boundaries from {path}: {source}")]
    Read {
        /// Boundary file path.
        path: PathBuf,
        /// Underlying IO error.
        source: std::io::Error,
    },
    /// Failed to parse the boundary file.
    #[error("Invalid boundary file at {path}: {source}")]
    Parse {
        /// Boundary file path.
        path: PathBuf,
        /// JSON parse error.
        source: serde_json::Error,
    },
    /// A feature is unusable (missing name property, degenerate geometry).
    #[error("Invalid boundary feature in {path}: {reason}")]
    InvalidFeature {
        /// Boundary file path.
        path: PathBuf,
        /// What was wrong with the feature.
        reason: String,
    },
    /// A configured region name is absent from the boundary set.
    #[error("Region {name:?} is not present in the boundary set")]
    UnknownRegion {
        /// The missing region name.
        name: String,
    },
    /// Resolution produced no regions at all.
    #[error("No regions selected: {reason}")]
    EmptySelection {
        /// Why the selection came up empty.
        reason: String,
    },
}

/// One administrative boundary.
#[derive(Debug, Clone)]
pub struct Boundary {
    /// Region name from the configured attribute column.
    pub name: String,
    /// Boundary geometry.
    pub geometry: MultiPolygon<f64>,
}

impl Boundary {
    /// Whether this boundary passes a bounding-box filter: its extent
    /// intersects the box, or its centroid falls inside it.
    pub fn intersects_bbox(&self, bbox: &Rect<f64>) -> bool {
        let extent_hit = self
            .geometry
            .bounding_rect()
            .is_some_and(|extent| extent.intersects(bbox));
        let centroid_hit = self
            .geometry
            .centroid()
            .is_some_and(|centroid| bbox.contains(&centroid));
        extent_hit || centroid_hit
    }
}

/// The shapefile-derived boundary set, keyed by region name.
#[derive(Debug, Clone, Default)]
pub struct BoundarySet {
    boundaries: BTreeMap<String, Boundary>,
}

#[derive(Deserialize)]
struct FeatureCollection {
    features: Vec<Feature>,
}

#[derive(Deserialize)]
struct Feature {
    #[serde(default)]
    properties: serde_json::Map<String, serde_json::Value>,
    geometry: Geometry,
}

#[derive(Deserialize)]
#[serde(tag = "type")]
enum Geometry {
    Polygon {
        coordinates: Vec<Vec<Vec<f64>>>,
    },
    MultiPolygon {
        coordinates: Vec<Vec<Vec<Vec<f64>>>>,
    },
}

impl BoundarySet {
    /// Load boundaries from a GeoJSON FeatureCollection, taking region names
    /// from the `region_column` property.
    pub fn load(path: &Path, region_column: &str) -> Result<Self, CatalogError> {
        let bytes = std::fs::read(path).map_err(|source| CatalogError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let collection: FeatureCollection =
            serde_json::from_slice(&bytes).map_err(|source| CatalogError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        let mut boundaries = BTreeMap::new();
        for feature in collection.features {
            let name = feature
                .properties
                .get(region_column)
                .and_then(|value| value.as_str())
                .ok_or_else(|| CatalogError::InvalidFeature {
                    path: path.to_path_buf(),
                    reason: format!("feature without string property {region_column:?}"),
                })?
                .to_string();
            let geometry = parse_geometry(&feature.geometry, path, &name)?;
            if boundaries
                .insert(
                    name.clone(),
                    Boundary {
                        name: name.clone(),
                        geometry,
                    },
                )
                .is_some()
            {
                return Err(CatalogError::InvalidFeature {
                    path: path.to_path_buf(),
                    reason: format!("duplicate region {name:?}"),
                });
            }
        }
        Ok(Self { boundaries })
    }

    /// Look up one boundary by region name.
    pub fn get(&self, name: &str) -> Option<&Boundary> {
        self.boundaries.get(name)
    }

    /// Region names in sorted order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.boundaries.keys().map(String::as_str)
    }

    /// Number of boundaries loaded.
    pub fn len(&self) -> usize {
        self.boundaries.len()
    }

    /// Whether the set is empty.
    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}

fn parse_geometry(
    geometry: &Geometry,
    path: &Path,
    name: &str,
) -> Result<MultiPolygon<f64>, CatalogError> {
    let polygons: Vec<&Vec<Vec<Vec<f64>>>> = match geometry {
        Geometry::Polygon { coordinates } => {
            return Ok(MultiPolygon::new(vec![parse_polygon(coordinates, path, name)?]));
        }
        Geometry::MultiPolygon { coordinates } => coordinates.iter().collect(),
    };
    let mut out = Vec::with_capacity(polygons.len());
    for rings in polygons {
        out.push(parse_polygon(rings, path, name)?);
    }
    Ok(MultiPolygon::new(out))
}

fn parse_polygon(
    rings: &[Vec<Vec<f64>>],
    path: &Path,
    name: &str,
) -> Result<Polygon<f64>, CatalogError> {
    let mut lines = rings.iter().map(|ring| parse_ring(ring, path, name));
    let exterior = lines.next().ok_or_else(|| CatalogError::InvalidFeature {
        path: path.to_path_buf(),
        reason: format!("region {name:?} has a polygon without rings"),
    })??;
    let interiors = lines.collect::<Result<Vec<_>, _>>()?;
    Ok(Polygon::new(exterior, interiors))
}

fn parse_ring(ring: &[Vec<f64>], path: &Path, name: &str) -> Result<LineString<f64>, CatalogError> {
    let mut coords = Vec::with_capacity(ring.len());
    for position in ring {
        if position.len() < 2 {
            return Err(CatalogError::InvalidFeature {
                path: path.to_path_buf(),
                reason: format!("region {name:?} has a position with fewer than 2 values"),
            });
        }
        coords.push(Coord {
            x: position[0],
            y: position[1],
        });
    }
    if coords.len() < 4 {
        return Err(CatalogError::InvalidFeature {
            path: path.to_path_buf(),
            reason: format!("region {name:?} has a ring with fewer than 4 positions"),
        });
    }
    Ok(LineString::new(coords))
}

/// Resolve the configured region list against the boundary set.
///
/// `"all"` expands to every boundary passing the bounding-box filter, in
/// sorted order. Explicitly named regions are validated against the set but
/// not re-filtered by the box.
pub fn resolve_regions(
    spec: &RegionSpec,
    set: &BoundarySet,
    bbox: Option<&Rect<f64>>,
) -> Result<Vec<String>, CatalogError> {
    match spec {
        RegionSpec::All(_) => {
            let names: Vec<String> = set
                .boundaries
                .values()
                .filter(|boundary| bbox.is_none_or(|bbox| boundary.intersects_bbox(bbox)))
                .map(|boundary| boundary.name.clone())
                .collect();
            if names.is_empty() {
                return Err(CatalogError::EmptySelection {
                    reason: "no boundary intersects the configured bounding box".to_string(),
                });
            }
            Ok(names)
        }
        RegionSpec::Named(names) => {
            let mut resolved: Vec<String> = Vec::with_capacity(names.len());
            for name in names {
                if set.get(name).is_none() {
                    return Err(CatalogError::UnknownRegion { name: name.clone() });
                }
                if !resolved.iter().any(|seen| seen == name) {
                    resolved.push(name.clone());
                }
            }
            resolved.sort();
            if resolved.is_empty() {
                return Err(CatalogError::EmptySelection {
                    reason: "the configured region list is empty".to_string(),
                });
            }
            Ok(resolved)
        }
    }
}
