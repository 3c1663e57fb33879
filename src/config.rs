use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub input: InputConfig,
    #[serde(default)]
    pub columns: ColumnConfig,
    #[serde(default)]
    pub display: DisplayConfig,
    #[serde(default)]
    pub server: ServerConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct InputConfig {
    /// DuckDB or SQLite database, or `.csv` file, with one row per municipality.
    pub attributes: PathBuf,
    #[serde(default)]
    pub engine: AttributeEngine,
    #[serde(default = "default_table")]
    pub table: String,
    /// Zipped shapefile bundle, bare `.shp`, or GeoJSON FeatureCollection.
    pub geometry: PathBuf,
    #[serde(default = "default_geometry_code_column")]
    pub geometry_code_column: String,
}

/// How the attribute file is read. `Auto` goes by extension, then file header.
#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum AttributeEngine {
    #[default]
    Auto,
    Duckdb,
    Sqlite,
    Csv,
}

/// Names of the attribute columns backing each municipality field.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct ColumnConfig {
    pub region: String,
    pub state: String,
    pub name: String,
    pub population: String,
    pub code: String,
}

impl Default for ColumnConfig {
    fn default() -> Self {
        Self {
            region: "REGIAO".to_string(),
            state: "UF".to_string(),
            name: "MUNICIPIO".to_string(),
            population: "POPULACAO".to_string(),
            code: "COD_IBGE".to_string(),
        }
    }
}

impl ColumnConfig {
    pub fn all(&self) -> [&str; 5] {
        [
            self.region.as_str(),
            self.state.as_str(),
            self.name.as_str(),
            self.population.as_str(),
            self.code.as_str(),
        ]
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DisplayConfig {
    pub title: String,
    pub subtitle: String,
    /// Rows shown in the main table when no city is selected.
    pub table_rows: usize,
    /// Text for the right-hand column next to the map.
    pub placeholder: String,
    pub geometry_source_url: String,
    pub attributes_source_url: String,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self {
            title: "Finding Home".to_string(),
            subtitle: "Finding Home: Brazilian Cities Overview".to_string(),
            table_rows: 15,
            placeholder: "Testando".to_string(),
            geometry_source_url: "https://www.ibge.gov.br/geociencias/organizacao-do-territorio/malhas-territoriais/15774-malhas.html".to_string(),
            attributes_source_url: "https://github.com/duckdb/duckdb/tree/master/examples/data"
                .to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8501,
        }
    }
}

fn default_table() -> String {
    "city_info".to_string()
}

fn default_geometry_code_column() -> String {
    "CD_MUN".to_string()
}

impl AppConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {:?}", path))?;
        let config = Self::from_toml_str(&content)?;

        // Relative data paths are resolved against the config file's directory.
        let base = path.parent().unwrap_or_else(|| Path::new(""));
        Ok(config.resolve_paths(base))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: AppConfig =
            toml::from_str(content).with_context(|| "Failed to parse TOML configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(mut self, base: &Path) -> Self {
        if self.input.attributes.is_relative() {
            self.input.attributes = base.join(&self.input.attributes);
        }
        if self.input.geometry.is_relative() {
            self.input.geometry = base.join(&self.input.geometry);
        }
        self
    }

    fn validate(&self) -> Result<()> {
        ensure_identifier("input.table", &self.input.table)?;
        ensure_identifier("input.geometry_code_column", &self.input.geometry_code_column)?;
        for column in self.columns.all() {
            ensure_identifier("columns", column)?;
        }
        if self.display.table_rows == 0 {
            return Err(anyhow!("display.table_rows must be greater than zero"));
        }
        Ok(())
    }
}

/// Column and table names are spliced into SQL, so only plain identifiers are accepted.
pub fn ensure_identifier(field: &str, value: &str) -> Result<()> {
    let valid = !value.is_empty()
        && !value.starts_with(|c: char| c.is_ascii_digit())
        && value.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(anyhow!("{} has an invalid identifier: '{}'", field, value))
    }
}
