pub mod attributes;
pub mod config;
pub mod geometry;
pub mod render;
pub mod selection;
pub mod server;
pub mod types;
pub mod view;

use anyhow::Result;
use std::sync::Arc;

/// Opens both stores once; any missing or unreadable data file is fatal.
pub fn open_stores(config: &config::AppConfig) -> Result<view::Stores> {
    let attributes = attributes::load_attributes(config)?;
    let geometry = geometry::load_geometry(config)?;
    Ok(view::Stores {
        attributes: Arc::new(attributes),
        geometry: Arc::new(geometry),
    })
}
