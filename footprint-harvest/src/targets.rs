//! Target list loading
//!
//! Accepts `;`- or `,`-separated CSV with an id column plus either a
//! latitude/longitude pair or a `wkt_geom` `POINT(lng lat)` column. Header
//! names are matched case-insensitively. Rows without a finite coordinate
//! pair are skipped with a warning.

use crate::error::TargetLoadError;
use crate::models::Target;
use footprint_common::LatLng;
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

const ID_COLUMNS: &[&str] = &["id", "chk", "codice"];
const LAT_COLUMNS: &[&str] = &["lat", "latitude", "latitudine"];
const LNG_COLUMNS: &[&str] = &["lng", "lon", "longitude", "longitudine"];
const WKT_COLUMNS: &[&str] = &["wkt_geom", "wkt", "geometry"];

#[derive(Debug, Clone, Copy)]
enum Position {
    Columns { lat: usize, lng: usize },
    Wkt(usize),
}

pub fn load_targets(path: &Path) -> Result<Vec<Target>, TargetLoadError> {
    let content = std::fs::read_to_string(path).map_err(|source| TargetLoadError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let targets = parse_targets(&content)?;
    info!(path = %path.display(), targets = targets.len(), "Targets loaded");
    Ok(targets)
}

/// Parse target list text (see module docs for the accepted layout)
pub fn parse_targets(content: &str) -> Result<Vec<Target>, TargetLoadError> {
    let content = content.trim_start_matches('\u{feff}');
    let delimiter = sniff_delimiter(content);

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let headers: Vec<String> = reader
        .headers()?
        .iter()
        .map(|h| h.trim_matches('"').to_lowercase())
        .collect();

    let find = |names: &[&str]| headers.iter().position(|h| names.contains(&h.as_str()));

    let id_col = find(ID_COLUMNS);
    let position = match (find(LAT_COLUMNS), find(LNG_COLUMNS), find(WKT_COLUMNS)) {
        (Some(lat), Some(lng), _) => Some(Position::Columns { lat, lng }),
        (_, _, Some(wkt)) => Some(Position::Wkt(wkt)),
        _ => None,
    };
    let (Some(id_col), Some(position)) = (id_col, position) else {
        return Err(TargetLoadError::NoUsableColumns(headers.join(", ")));
    };

    let mut targets = Vec::new();
    let mut seen = HashSet::new();

    for (index, record) in reader.records().enumerate() {
        let record = record?;
        // Header is line 1
        let line = index + 2;

        let id = record.get(id_col).unwrap_or("").to_string();
        if id.is_empty() {
            warn!(line, "Skipping row without id");
            continue;
        }

        let coordinate = match position {
            Position::Columns { lat, lng } => record
                .get(lat)
                .and_then(parse_number)
                .zip(record.get(lng).and_then(parse_number))
                .map(|(lat, lng)| LatLng::new(lat, lng)),
            Position::Wkt(col) => record.get(col).and_then(parse_wkt_point),
        };

        let Some(coordinate) = coordinate.filter(|c| c.is_finite()) else {
            warn!(line, target_id = %id, "Skipping row without a finite coordinate");
            continue;
        };

        if !seen.insert(id.clone()) {
            warn!(line, target_id = %id, "Duplicate target id, it will be processed again");
        }
        targets.push(Target::new(id, coordinate.lat, coordinate.lng));
    }

    Ok(targets)
}

/// `;` when the header line has one, otherwise `,`
fn sniff_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or("");
    if header.contains(';') {
        b';'
    } else if header.contains('\t') && !header.contains(',') {
        b'\t'
    } else {
        b','
    }
}

/// Decimal number, accepting a comma as decimal separator
fn parse_number(text: &str) -> Option<f64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    text.parse::<f64>()
        .ok()
        .or_else(|| text.replace(',', ".").parse::<f64>().ok())
}

/// Parse `POINT(lng lat)` (also `POINT Z (lng lat z)`)
pub fn parse_wkt_point(text: &str) -> Option<LatLng> {
    let text = text.trim();
    if !text.get(..5)?.eq_ignore_ascii_case("point") {
        return None;
    }
    let open = text.find('(')?;
    let close = text.rfind(')')?;
    if close <= open {
        return None;
    }

    let mut numbers = text[open + 1..close]
        .split_whitespace()
        .map(|n| n.parse::<f64>().ok());
    let lng = numbers.next()??;
    let lat = numbers.next()??;
    Some(LatLng::new(lat, lng))
}
