use crate::attributes::AttributeStore;
use crate::geometry::GeometryStore;
use crate::selection::Selection;
use crate::types::{Municipality, MunicipalityGeometry};
use geo::{BoundingRect, Centroid};
use geojson::{Feature, FeatureCollection};
use serde::Serialize;
use std::sync::Arc;
use tracing::debug;

/// Store handles opened once at startup and shared by every render.
#[derive(Clone)]
pub struct Stores {
    pub attributes: Arc<dyn AttributeStore>,
    pub geometry: Arc<GeometryStore>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DashboardView {
    pub selection: Selection,
    pub options: Vec<String>,
    pub summary: Option<SummaryPanel>,
    pub table: TableView,
    pub map: Option<MapView>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SummaryPanel {
    pub region: String,
    pub state: String,
    pub name: String,
    pub population: String,
}

impl SummaryPanel {
    pub fn from_record(record: &Municipality) -> Self {
        Self {
            region: record.region.clone(),
            state: record.state.clone(),
            name: record.name.clone(),
            population: record.formatted_population(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct TableView {
    pub rows: Vec<Municipality>,
    /// Rows available before truncation.
    pub total_rows: usize,
}

impl TableView {
    pub fn is_truncated(&self) -> bool {
        self.total_rows > self.rows.len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MapView {
    pub code: String,
    /// `[[min_lon, min_lat], [max_lon, max_lat]]`
    pub bounds: [[f64; 2]; 2],
    pub centroid: Option<[f64; 2]>,
    pub features: FeatureCollection,
}

/// Builds a fresh view for one render from the stores and the selection.
///
/// A lookup miss only blanks the fragment that depends on it.
pub fn build_view(stores: &Stores, selection: &Selection, table_rows: usize) -> DashboardView {
    let attributes = stores.attributes.as_ref();

    let (summary, table, map) = match selection.name() {
        None => {
            let all = attributes.get_all();
            let table = TableView {
                rows: all.iter().take(table_rows).cloned().collect(),
                total_rows: all.len(),
            };
            (None, table, None)
        }
        Some(name) => {
            let hits = attributes.get_by_name(name);
            let record = hits.first().copied();
            if record.is_none() {
                debug!(city = %name, "selection matched no attribute record");
            }

            let summary = record.map(SummaryPanel::from_record);
            let map = record.and_then(|r| map_for(&stores.geometry, r));
            let table = TableView {
                rows: hits.iter().take(table_rows).map(|r| (*r).clone()).collect(),
                total_rows: hits.len(),
            };
            (summary, table, map)
        }
    };

    DashboardView {
        selection: selection.clone(),
        options: attributes.list_names().to_vec(),
        summary,
        table,
        map,
    }
}

fn map_for(geometry: &GeometryStore, record: &Municipality) -> Option<MapView> {
    let Some(found) = geometry.get_by_code(&record.ibge_code) else {
        debug!(city = %record.name, code = %record.ibge_code, "no geometry for code");
        return None;
    };
    let rect = found.geometry.bounding_rect()?;
    let centroid = found.geometry.centroid().map(|p| [p.x(), p.y()]);

    Some(MapView {
        code: found.code.clone(),
        bounds: [[rect.min().x, rect.min().y], [rect.max().x, rect.max().y]],
        centroid,
        features: to_feature_collection(found, Some(&record.name)),
    })
}

/// Wraps one boundary as a single-feature collection carrying its code and name.
pub fn to_feature_collection(
    found: &MunicipalityGeometry,
    name: Option<&str>,
) -> FeatureCollection {
    let mut feature = Feature {
        bbox: None,
        geometry: Some(geojson::Geometry::new(geojson::Value::from(
            &found.geometry,
        ))),
        id: None,
        properties: None,
        foreign_members: None,
    };
    feature.set_property("code", found.code.clone());
    if let Some(name) = name {
        feature.set_property("name", name.to_string());
    }
    std::iter::once(feature).collect()
}
