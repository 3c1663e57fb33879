use rusqlite::{params, Connection};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub const SAO_PAULO_POPULATION: i64 = 11_451_999;

/// Writes a SQLite attribute table, a GeoJSON boundary file and a config
/// pointing at both (relative paths) into a fresh temp dir.
pub fn fixture_dir() -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("data");
    std::fs::create_dir_all(&data).expect("data dir");

    write_attributes(&data.join("DW.db"));
    write_geometry(&data.join("municipios.geojson"));

    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
[input]
attributes = "data/DW.db"
geometry = "data/municipios.geojson"

[server]
port = 0
"#,
    )
    .expect("write config");

    (dir, config_path)
}

fn write_attributes(path: &Path) {
    let conn = Connection::open(path).expect("create db");
    conn.execute_batch(
        "CREATE TABLE city_info (
            REGIAO TEXT NOT NULL,
            UF TEXT NOT NULL,
            MUNICIPIO TEXT NOT NULL,
            POPULACAO INTEGER,
            COD_IBGE INTEGER NOT NULL
        );",
    )
    .expect("create table");

    let mut insert = conn
        .prepare("INSERT INTO city_info VALUES (?1, ?2, ?3, ?4, ?5)")
        .expect("prepare insert");
    insert
        .execute(params!["Sudeste", "SP", "SÃO PAULO", SAO_PAULO_POPULATION, 3550308])
        .expect("insert");
    insert
        .execute(params!["Sudeste", "SP", "CAMPINAS", 1_139_047, 3509502])
        .expect("insert");
    insert
        .execute(params!["Sudeste", "SP", "SEM MAPA", 10, 3599999])
        .expect("insert");
    insert
        .execute(params!["Sudeste", "RJ", "RIO DE JANEIRO", 6_211_423, 3304557])
        .expect("insert");
    insert
        .execute(params!["Norte", "AC", "RIO BRANCO", 364_756, 1200401])
        .expect("insert");
    for i in 0..15 {
        insert
            .execute(params![
                "Sudeste",
                "MG",
                format!("CIDADE {i:02}"),
                1000 + i,
                3100000 + i
            ])
            .expect("insert");
    }
}

fn write_geometry(path: &Path) {
    std::fs::write(
        path,
        r#"{"type":"FeatureCollection","features":[
  {"type":"Feature","properties":{"CD_MUN":"3550308","NM_MUN":"São Paulo"},
   "geometry":{"type":"Polygon","coordinates":[[[-46.83,-23.36],[-46.36,-23.36],[-46.36,-24.01],[-46.83,-24.01],[-46.83,-23.36]]]}},
  {"type":"Feature","properties":{"CD_MUN":"1200401","NM_MUN":"Rio Branco"},
   "geometry":{"type":"Polygon","coordinates":[[[-68.0,-9.8],[-67.6,-9.8],[-67.6,-10.2],[-68.0,-10.2],[-68.0,-9.8]]]}}
]}"#,
    )
    .expect("write geojson");
}
