use crate::config::{AppConfig, AttributeEngine, ColumnConfig};
use crate::types::Municipality;
use anyhow::{anyhow, Context, Result};
use csv::ReaderBuilder;
use rusqlite::types::ValueRef;
use rusqlite::{Connection, OpenFlags};
use std::collections::{BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

/// Read-only access to municipality records.
pub trait AttributeStore: Send + Sync {
    /// Distinct municipality names, ascending.
    fn list_names(&self) -> &[String];
    /// Every record, sorted by state then name.
    fn get_all(&self) -> &[Municipality];
    /// Records whose upper-cased name equals the upper-cased `name`.
    fn get_by_name(&self, name: &str) -> Vec<&Municipality>;
}

/// The municipality table, read once at startup and sorted by state then name.
#[derive(Debug, Default)]
pub struct AttributeTable {
    records: Vec<Municipality>,
    names: Vec<String>,
    by_name: HashMap<String, Vec<usize>>,
}

impl AttributeTable {
    pub fn from_records(mut records: Vec<Municipality>) -> Self {
        records.sort_by(|a, b| a.state.cmp(&b.state).then_with(|| a.name.cmp(&b.name)));

        let names: BTreeSet<String> = records.iter().map(|r| r.name.clone()).collect();

        let mut by_name: HashMap<String, Vec<usize>> = HashMap::new();
        for (i, record) in records.iter().enumerate() {
            by_name.entry(name_key(&record.name)).or_default().push(i);
        }

        Self {
            records,
            names: names.into_iter().collect(),
            by_name,
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl AttributeStore for AttributeTable {
    fn list_names(&self) -> &[String] {
        &self.names
    }

    fn get_all(&self) -> &[Municipality] {
        &self.records
    }

    fn get_by_name(&self, name: &str) -> Vec<&Municipality> {
        self.by_name
            .get(&name_key(name))
            .map(|indices| indices.iter().map(|&i| &self.records[i]).collect())
            .unwrap_or_default()
    }
}

fn name_key(name: &str) -> String {
    name.trim().to_uppercase()
}

const SQLITE_MAGIC: &[u8; 16] = b"SQLite format 3\0";
const DUCKDB_MAGIC: &[u8; 4] = b"DUCK";

pub fn load_attributes(config: &AppConfig) -> Result<AttributeTable> {
    let path = &config.input.attributes;
    let started_at = Instant::now();

    let engine = resolve_engine(path, config.input.engine)?;
    let records = match engine {
        AttributeEngine::Duckdb => load_duckdb(path, &config.input.table, &config.columns)?,
        AttributeEngine::Sqlite => load_sqlite(path, &config.input.table, &config.columns)?,
        AttributeEngine::Csv => load_csv(path, &config.columns)?,
        AttributeEngine::Auto => {
            return Err(anyhow!("Could not determine attribute engine for {:?}", path))
        }
    };

    let table = AttributeTable::from_records(records);
    info!(
        engine = ?engine,
        records = table.len(),
        names = table.list_names().len(),
        duration_ms = started_at.elapsed().as_millis() as u64,
        "loaded attribute table from {:?}",
        path
    );
    Ok(table)
}

/// `.csv` is read as CSV; anything else is identified by its file header.
fn resolve_engine(path: &Path, configured: AttributeEngine) -> Result<AttributeEngine> {
    if configured != AttributeEngine::Auto {
        return Ok(configured);
    }
    let is_csv = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("csv"));
    if is_csv {
        return Ok(AttributeEngine::Csv);
    }
    sniff_database(path)
}

fn sniff_database(path: &Path) -> Result<AttributeEngine> {
    let file = File::open(path)
        .with_context(|| format!("Attribute database not found: {:?}", path))?;
    let mut header = Vec::with_capacity(16);
    file.take(16).read_to_end(&mut header)?;

    if header.as_slice() == SQLITE_MAGIC {
        Ok(AttributeEngine::Sqlite)
    } else if header.get(8..12) == Some(DUCKDB_MAGIC.as_slice()) {
        Ok(AttributeEngine::Duckdb)
    } else {
        Err(anyhow!(
            "Unrecognised attribute database {:?}: neither DuckDB nor SQLite",
            path
        ))
    }
}

fn load_duckdb(path: &Path, table: &str, columns: &ColumnConfig) -> Result<Vec<Municipality>> {
    if !path.is_file() {
        return Err(anyhow!("Attribute database not found: {:?}", path));
    }
    let db_config = duckdb::Config::default().access_mode(duckdb::AccessMode::ReadOnly)?;
    let conn = duckdb::Connection::open_with_flags(path, db_config)
        .with_context(|| format!("Failed to open attribute database: {:?}", path))?;
    read_duckdb_table(&conn, table, columns)
}

/// Reads every row of a DuckDB `table`, each column cast to text.
pub fn read_duckdb_table(
    conn: &duckdb::Connection,
    table: &str,
    columns: &ColumnConfig,
) -> Result<Vec<Municipality>> {
    let mut stmt = conn.prepare(
        "SELECT column_name FROM information_schema.columns
         WHERE lower(table_name) = lower(?)
         ORDER BY ordinal_position",
    )?;
    let headers = stmt
        .query_map(duckdb::params![table], |row| row.get::<_, String>(0))?
        .collect::<Result<Vec<String>, _>>()?;
    if headers.is_empty() {
        return Err(anyhow!("Table '{}' not found in attribute database", table));
    }
    let layout = ColumnLayout::resolve(&headers, columns)?;

    let select_list = headers
        .iter()
        .map(|h| format!("CAST(\"{}\" AS VARCHAR)", h.replace('"', "\"\"")))
        .collect::<Vec<_>>()
        .join(", ");
    let sql = format!("SELECT {} FROM \"{}\"", select_list, table);
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to query table '{}'", table))?;

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(headers.len());
        for i in 0..headers.len() {
            cells.push(row.get::<_, Option<String>>(i)?.unwrap_or_default());
        }
        if let Some(record) = layout.build(&headers, cells) {
            records.push(record);
        }
    }
    Ok(records)
}

fn load_sqlite(path: &Path, table: &str, columns: &ColumnConfig) -> Result<Vec<Municipality>> {
    // SQLite would otherwise create an empty database at a missing path.
    if !path.is_file() {
        return Err(anyhow!("Attribute database not found: {:?}", path));
    }
    let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)
        .with_context(|| format!("Failed to open attribute database: {:?}", path))?;
    read_sqlite_table(&conn, table, columns)
}

/// Reads every row of `table` into municipality records.
pub fn read_sqlite_table(
    conn: &Connection,
    table: &str,
    columns: &ColumnConfig,
) -> Result<Vec<Municipality>> {
    let sql = format!("SELECT * FROM \"{}\"", table);
    let mut stmt = conn
        .prepare(&sql)
        .with_context(|| format!("Failed to query table '{}'", table))?;
    let headers: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let layout = ColumnLayout::resolve(&headers, columns)?;

    let mut rows = stmt.query([])?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut cells = Vec::with_capacity(headers.len());
        for i in 0..headers.len() {
            cells.push(cell_to_string(row.get_ref(i)?));
        }
        if let Some(record) = layout.build(&headers, cells) {
            records.push(record);
        }
    }
    Ok(records)
}

fn load_csv(path: &Path, columns: &ColumnConfig) -> Result<Vec<Municipality>> {
    let file =
        File::open(path).with_context(|| format!("Failed to open CSV file: {:?}", path))?;
    let mut rdr = ReaderBuilder::new().from_reader(file);
    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();
    let layout = ColumnLayout::resolve(&headers, columns)?;

    let mut records = Vec::new();
    for result in rdr.records() {
        let row = result.with_context(|| format!("Malformed CSV row in {:?}", path))?;
        let cells = row.iter().map(|c| c.trim().to_string()).collect();
        if let Some(record) = layout.build(&headers, cells) {
            records.push(record);
        }
    }
    Ok(records)
}

fn cell_to_string(value: ValueRef<'_>) -> String {
    match value {
        ValueRef::Null => String::new(),
        ValueRef::Integer(i) => i.to_string(),
        ValueRef::Real(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{:.0}", f),
        ValueRef::Real(f) => f.to_string(),
        ValueRef::Text(bytes) => String::from_utf8_lossy(bytes).into_owned(),
        ValueRef::Blob(bytes) => format!("<{} bytes>", bytes.len()),
    }
}

/// Header positions of the five core columns.
struct ColumnLayout {
    region: usize,
    state: usize,
    name: usize,
    population: usize,
    code: usize,
}

impl ColumnLayout {
    fn resolve(headers: &[String], columns: &ColumnConfig) -> Result<Self> {
        let find = |column: &str| {
            headers
                .iter()
                .position(|h| h.eq_ignore_ascii_case(column))
                .ok_or_else(|| anyhow!("Column '{}' not found in attribute table", column))
        };
        Ok(Self {
            region: find(columns.region.as_str())?,
            state: find(columns.state.as_str())?,
            name: find(columns.name.as_str())?,
            population: find(columns.population.as_str())?,
            code: find(columns.code.as_str())?,
        })
    }

    fn is_core(&self, idx: usize) -> bool {
        [self.region, self.state, self.name, self.population, self.code].contains(&idx)
    }

    fn build(&self, headers: &[String], mut cells: Vec<String>) -> Option<Municipality> {
        cells.resize(headers.len(), String::new());

        let name = cells[self.name].clone();
        if name.is_empty() {
            return None;
        }

        let population = parse_population(&cells[self.population]);
        if population.is_none() && !cells[self.population].is_empty() {
            warn!(
                municipality = %name,
                value = %cells[self.population],
                "population is not a whole number, leaving it blank"
            );
        }

        let extra = headers
            .iter()
            .zip(cells.iter())
            .enumerate()
            .filter(|(i, _)| !self.is_core(*i))
            .map(|(_, (h, c))| (h.clone(), c.clone()))
            .collect();

        Some(Municipality {
            region: cells[self.region].clone(),
            state: cells[self.state].clone(),
            name,
            population,
            ibge_code: cells[self.code].clone(),
            extra,
        })
    }
}

fn parse_population(raw: &str) -> Option<u64> {
    let cleaned: String = raw.chars().filter(|c| !matches!(c, ',' | '_' | ' ')).collect();
    if cleaned.is_empty() {
        return None;
    }
    // DuckDB renders DOUBLE and DECIMAL columns as "11451999.0" / "11451999.000".
    let whole = match cleaned.split_once('.') {
        Some((int, frac)) if frac.chars().all(|c| c == '0') => int,
        Some(_) => return None,
        None => cleaned.as_str(),
    };
    whole.parse::<u64>().ok()
}
