use geo::MultiPolygon;
use serde::Serialize;

/// One row of the attribute table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Municipality {
    pub region: String,
    pub state: String,
    pub name: String,
    pub population: Option<u64>,
    pub ibge_code: String,
    // Remaining columns in table order, rendered as text.
    pub extra: Vec<(String, String)>,
}

impl Municipality {
    pub fn formatted_population(&self) -> String {
        match self.population {
            Some(p) => format_thousands(p),
            None => "-".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MunicipalityGeometry {
    pub code: String,
    pub geometry: MultiPolygon<f64>,
}

/// `11451999` -> `"11,451,999"`.
pub fn format_thousands(value: u64) -> String {
    let digits = value.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(ch);
    }
    out
}

/// Canonical form of an IBGE code: surrounding whitespace and leading zeros dropped.
///
/// Codes arrive as integers from the attribute table and as zero-padded text
/// from the shapefile, so both sides are normalized before comparing.
pub fn normalize_code(code: &str) -> String {
    let trimmed = code.trim();
    let trimmed = trimmed.strip_suffix(".0").unwrap_or(trimmed);
    let stripped = trimmed.trim_start_matches('0');
    if stripped.is_empty() && !trimmed.is_empty() {
        "0".to_string()
    } else {
        stripped.to_string()
    }
}
