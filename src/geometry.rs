use crate::config::AppConfig;
use crate::types::{normalize_code, MunicipalityGeometry};
use anyhow::{anyhow, Context, Result};
use geo::MultiPolygon;
use geojson::GeoJson;
use shapefile::dbase::FieldValue;
use shapefile::Reader;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Municipality boundaries keyed by normalized IBGE code.
#[derive(Debug, Default)]
pub struct GeometryStore {
    by_code: HashMap<String, MunicipalityGeometry>,
}

impl GeometryStore {
    pub fn from_records(records: Vec<MunicipalityGeometry>) -> Self {
        let mut by_code = HashMap::with_capacity(records.len());
        for record in records {
            let key = normalize_code(&record.code);
            if by_code.contains_key(&key) {
                warn!(code = %record.code, "duplicate geometry code, keeping the first");
                continue;
            }
            by_code.insert(key, record);
        }
        Self { by_code }
    }

    /// Geometry whose code matches `code`, raw or zero-padded.
    pub fn get_by_code(&self, code: &str) -> Option<&MunicipalityGeometry> {
        let key = normalize_code(code);
        if key.is_empty() {
            return None;
        }
        self.by_code.get(&key)
    }

    pub fn len(&self) -> usize {
        self.by_code.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_code.is_empty()
    }
}

pub fn load_geometry(config: &AppConfig) -> Result<GeometryStore> {
    let path = &config.input.geometry;
    let code_column = &config.input.geometry_code_column;
    let started_at = Instant::now();

    let extension = path
        .extension()
        .and_then(|e| e.to_str())
        .map(|s: &str| s.to_lowercase())
        .ok_or_else(|| anyhow!("Input geometry file has no extension"))?;

    let records = match extension.as_str() {
        "zip" => load_zipped_shapefile(path, code_column)?,
        "shp" => load_shapefile(path, code_column)?,
        "json" | "geojson" => load_geojson(path, code_column)?,
        _ => return Err(anyhow!("Unsupported geometry format: {}", extension)),
    };

    let store = GeometryStore::from_records(records);
    info!(
        geometries = store.len(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "loaded geometry from {:?}",
        path
    );
    Ok(store)
}

/// Extracts the shapefile members of a zip bundle into a temp dir and reads them.
fn load_zipped_shapefile(path: &Path, code_column: &str) -> Result<Vec<MunicipalityGeometry>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open shapefile bundle: {:?}", path))?;
    let mut zip = zip::ZipArchive::new(file)
        .with_context(|| format!("Failed to read zip archive: {:?}", path))?;

    let tmp = tempfile::tempdir().context("Failed to create extraction directory")?;
    let mut shp_path: Option<PathBuf> = None;

    for i in 0..zip.len() {
        let mut entry = zip.by_index(i)?;
        let Some(name) = entry.enclosed_name() else {
            continue;
        };
        let Some(file_name) = name.file_name().map(PathBuf::from) else {
            continue;
        };
        let ext = file_name
            .extension()
            .and_then(|e| e.to_str())
            .map(|s| s.to_lowercase())
            .unwrap_or_default();
        if !matches!(ext.as_str(), "shp" | "shx" | "dbf" | "prj" | "cpg") {
            continue;
        }

        let target = tmp.path().join(&file_name);
        let mut out = File::create(&target)
            .with_context(|| format!("Failed to extract {:?}", file_name))?;
        std::io::copy(&mut entry, &mut out)?;
        debug!("extracted {:?}", file_name);

        if ext == "shp" {
            if shp_path.is_some() {
                return Err(anyhow!("Zip archive {:?} holds more than one .shp", path));
            }
            shp_path = Some(target);
        }
    }

    let shp_path = shp_path.ok_or_else(|| anyhow!("No .shp file inside {:?}", path))?;
    load_shapefile(&shp_path, code_column)
}

fn load_shapefile(path: &Path, code_column: &str) -> Result<Vec<MunicipalityGeometry>> {
    let mut reader = Reader::from_path(path)
        .with_context(|| format!("Failed to open Shapefile: {:?}", path))?;

    let mut geometries = Vec::new();

    for result in reader.iter_shapes_and_records() {
        let (shape, record) = result?;

        let code_value = record
            .get(code_column)
            .ok_or_else(|| anyhow!("Code column '{}' not found in Shapefile", code_column))?;
        let Some(code) = dbase_code(code_value)? else {
            continue;
        };

        let geometry = match geo::Geometry::<f64>::try_from(shape) {
            Ok(geometry) => geometry,
            Err(e) => {
                debug!(code = %code, "skipping shape: {:?}", e);
                continue;
            }
        };
        if let Some(geometry) = into_multipolygon(geometry) {
            geometries.push(MunicipalityGeometry { code, geometry });
        }
    }

    Ok(geometries)
}

fn dbase_code(value: &FieldValue) -> Result<Option<String>> {
    match value {
        FieldValue::Character(Some(s)) => Ok(Some(s.trim().to_string())),
        FieldValue::Numeric(Some(n)) => Ok(Some(format!("{:.0}", n))),
        FieldValue::Character(None) | FieldValue::Numeric(None) => Ok(None),
        _ => Err(anyhow!("Shapefile code column must be text or numeric")),
    }
}

pub fn load_geojson(path: &Path, code_column: &str) -> Result<Vec<MunicipalityGeometry>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open GeoJSON file: {:?}", path))?;
    let collection = match GeoJson::from_reader(BufReader::new(file))
        .context("Failed to parse GeoJSON")?
    {
        GeoJson::FeatureCollection(fc) => fc,
        _ => return Err(anyhow!("GeoJSON must be a FeatureCollection")),
    };

    let mut geometries = Vec::new();

    for feature in collection.features {
        let code = match feature.property(code_column) {
            Some(serde_json::Value::String(s)) => s.trim().to_string(),
            Some(serde_json::Value::Number(n)) => n.to_string(),
            _ => continue,
        };
        let Some(value) = feature.geometry.map(|g| g.value) else {
            continue;
        };

        let geometry: geo::Geometry<f64> = value
            .try_into()
            .map_err(|e| anyhow!("Failed to convert geojson geometry {}: {:?}", code, e))?;
        if let Some(geometry) = into_multipolygon(geometry) {
            geometries.push(MunicipalityGeometry { code, geometry });
        }
    }

    Ok(geometries)
}

/// Areal geometries only; points and lines have no outline to draw.
fn into_multipolygon(geometry: geo::Geometry<f64>) -> Option<MultiPolygon<f64>> {
    match geometry {
        geo::Geometry::MultiPolygon(mp) => Some(mp),
        geo::Geometry::Polygon(p) => Some(MultiPolygon::new(vec![p])),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::polygon;

    fn square(code: &str) -> MunicipalityGeometry {
        let p = polygon![(x: 0.0, y: 0.0), (x: 1.0, y: 0.0), (x: 1.0, y: 1.0), (x: 0.0, y: 1.0)];
        MunicipalityGeometry {
            code: code.to_string(),
            geometry: MultiPolygon::new(vec![p]),
        }
    }

    #[test]
    fn lookup_accepts_raw_and_padded_codes() {
        let store = GeometryStore::from_records(vec![square("0012"), square("3550308")]);
        assert_eq!(store.get_by_code("12").unwrap().code, "0012");
        assert_eq!(store.get_by_code("0012").unwrap().code, "0012");
        assert_eq!(store.get_by_code("3550308").unwrap().code, "3550308");
    }

    #[test]
    fn lookup_miss_is_none() {
        let store = GeometryStore::from_records(vec![square("3550308")]);
        assert!(store.get_by_code("9999999").is_none());
        assert!(store.get_by_code("").is_none());
    }

    #[test]
    fn duplicate_codes_keep_first() {
        let mut second = square("1");
        second.geometry = MultiPolygon::new(vec![]);
        let store = GeometryStore::from_records(vec![square("1"), second]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.get_by_code("1").unwrap().geometry.0.len(), 1);
    }

    #[test]
    fn geojson_features_keyed_by_string_or_number() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("mun.geojson");
        std::fs::write(
            &path,
            r#"{"type":"FeatureCollection","features":[
              {"type":"Feature","properties":{"CD_MUN":"3550308"},
               "geometry":{"type":"Polygon","coordinates":[[[-46.8,-23.4],[-46.3,-23.4],[-46.3,-24.0],[-46.8,-23.4]]]}},
              {"type":"Feature","properties":{"CD_MUN":1200401},
               "geometry":{"type":"MultiPolygon","coordinates":[[[[-68.0,-10.0],[-67.5,-10.0],[-67.5,-10.5],[-68.0,-10.0]]]]}},
              {"type":"Feature","properties":{"CD_MUN":"0000001"},
               "geometry":{"type":"Point","coordinates":[0.0,0.0]}},
              {"type":"Feature","properties":{"OTHER":"x"},
               "geometry":{"type":"Polygon","coordinates":[[[0.0,0.0],[1.0,0.0],[1.0,1.0],[0.0,0.0]]]}}
            ]}"#,
        )
        .unwrap();

        let store = GeometryStore::from_records(load_geojson(&path, "CD_MUN").unwrap());
        assert_eq!(store.len(), 2);
        assert!(store.get_by_code("3550308").is_some());
        assert!(store.get_by_code("1200401").is_some());
        assert!(store.get_by_code("1").is_none());
    }

    enum CodeField {
        Character(&'static str),
        Numeric(f64),
    }

    /// Writes a one-square shapefile (`.shp`, `.shx`, `.dbf`) under `dir/stem.*`.
    fn write_shapefile(dir: &Path, stem: &str, code: CodeField) -> PathBuf {
        use shapefile::dbase::{FieldName, Record, TableWriterBuilder};

        let field = FieldName::try_from("CD_MUN").unwrap();
        let (table, value) = match code {
            CodeField::Character(c) => (
                TableWriterBuilder::new().add_character_field(field, 7),
                FieldValue::Character(Some(c.to_string())),
            ),
            CodeField::Numeric(n) => (
                TableWriterBuilder::new().add_numeric_field(field, 10, 0),
                FieldValue::Numeric(Some(n)),
            ),
        };

        let shp_path = dir.join(format!("{stem}.shp"));
        {
            let mut writer = shapefile::Writer::from_path(&shp_path, table).unwrap();
            let ring = vec![
                shapefile::Point::new(-46.8, -23.4),
                shapefile::Point::new(-46.3, -23.4),
                shapefile::Point::new(-46.3, -24.0),
                shapefile::Point::new(-46.8, -24.0),
                shapefile::Point::new(-46.8, -23.4),
            ];
            let polygon = shapefile::Polygon::new(shapefile::PolygonRing::Outer(ring));
            let mut record = Record::default();
            record.insert("CD_MUN".to_string(), value);
            writer.write_shape_and_record(&polygon, &record).unwrap();
        }
        shp_path
    }

    /// Zips every file of `sources` under `prefix/` inside the archive.
    fn zip_files(zip_path: &Path, prefix: &str, sources: &[PathBuf]) {
        use std::io::Write;

        let mut zip = zip::ZipWriter::new(File::create(zip_path).unwrap());
        for source in sources {
            let name = source.file_name().unwrap().to_string_lossy();
            zip.start_file(
                format!("{prefix}/{name}"),
                zip::write::SimpleFileOptions::default(),
            )
            .unwrap();
            zip.write_all(&std::fs::read(source).unwrap()).unwrap();
        }
        zip.finish().unwrap();
    }

    fn shapefile_members(shp: &Path) -> Vec<PathBuf> {
        ["shp", "shx", "dbf"]
            .iter()
            .map(|ext| shp.with_extension(ext))
            .collect()
    }

    #[test]
    fn zipped_shapefile_with_character_codes() {
        let dir = tempfile::tempdir().unwrap();
        let shp = write_shapefile(dir.path(), "BR_Municipios_2022", CodeField::Character("3550308"));
        let zip_path = dir.path().join("BR_Municipios_2022.zip");
        zip_files(&zip_path, "BR_Municipios_2022", &shapefile_members(&shp));

        let store =
            GeometryStore::from_records(load_zipped_shapefile(&zip_path, "CD_MUN").unwrap());
        assert_eq!(store.len(), 1);
        let found = store.get_by_code("3550308").expect("geometry");
        assert_eq!(found.geometry.0.len(), 1);
    }

    #[test]
    fn bare_shapefile_with_numeric_codes() {
        let dir = tempfile::tempdir().unwrap();
        let shp = write_shapefile(dir.path(), "municipios", CodeField::Numeric(1200401.0));

        let store = GeometryStore::from_records(load_shapefile(&shp, "CD_MUN").unwrap());
        assert_eq!(store.get_by_code("1200401").unwrap().code, "1200401");
    }

    #[test]
    fn shapefile_without_code_column_fails() {
        let dir = tempfile::tempdir().unwrap();
        let shp = write_shapefile(dir.path(), "municipios", CodeField::Character("3550308"));
        let err = load_shapefile(&shp, "COD_IBGE").unwrap_err();
        assert!(err.to_string().contains("COD_IBGE"));
    }

    #[test]
    fn zip_with_two_shapefiles_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let first = write_shapefile(dir.path(), "a", CodeField::Character("3550308"));
        let second = write_shapefile(dir.path(), "b", CodeField::Character("1200401"));
        let mut members = shapefile_members(&first);
        members.extend(shapefile_members(&second));
        let zip_path = dir.path().join("bundle.zip");
        zip_files(&zip_path, "bundle", &members);

        let err = load_zipped_shapefile(&zip_path, "CD_MUN").unwrap_err();
        assert!(err.to_string().contains("more than one .shp"));
    }

    #[test]
    fn zip_without_shapefile_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let readme = dir.path().join("README.txt");
        std::fs::write(&readme, "no shapes here").unwrap();
        let zip_path = dir.path().join("empty.zip");
        zip_files(&zip_path, "docs", &[readme]);

        let err = load_zipped_shapefile(&zip_path, "CD_MUN").unwrap_err();
        assert!(err.to_string().contains("No .shp file"));
    }
}
