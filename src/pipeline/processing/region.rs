use crate::domain::{Region, StationRegion};

/// Normalizes a state code: keeps the leading digits (so `"35.0"` and
/// `"35 "` both become `"35"`) and left-pads single digits.
pub fn normalize_uf_code(code: &str) -> Option<String> {
    let digits: String = code
        .trim()
        .chars()
        .take_while(|c| c.is_ascii_digit())
        .collect();
    match digits.len() {
        1 => Some(format!("0{digits}")),
        2 => Some(digits),
        _ => None,
    }
}

/// Maps an IBGE state code to its macro-region.
///
/// Total over all inputs: anything that is not a known state code maps to
/// `None`, displayed as "undefined".
pub fn region_for_uf(code: &str) -> Option<Region> {
    let normalized = normalize_uf_code(code)?;
    let numeric: u8 = normalized.parse().ok()?;
    match numeric {
        11..=17 => Some(Region::Norte),
        21..=29 => Some(Region::Nordeste),
        31 | 32 | 33 | 35 => Some(Region::Sudeste),
        41..=43 => Some(Region::Sul),
        50..=53 => Some(Region::CentroOeste),
        _ => None,
    }
}

/// Region prefix tokens used in INMET station file names
fn region_for_token(token: &str) -> Option<Region> {
    match token.to_ascii_uppercase().as_str() {
        "N" => Some(Region::Norte),
        "NE" => Some(Region::Nordeste),
        "CO" => Some(Region::CentroOeste),
        "SE" => Some(Region::Sudeste),
        "S" => Some(Region::Sul),
        _ => None,
    }
}

/// Infers a station's region from its file name, e.g.
/// `INMET_CO_DF_A001_BRASILIA_01-01-2019_A_31-12-2019.CSV` is Centro-Oeste.
/// The first `_`-separated segment that is a region token wins.
pub fn station_region_from_filename(file_name: &str) -> StationRegion {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    base.split('_')
        .find_map(region_for_token)
        .map(StationRegion::Known)
        .unwrap_or(StationRegion::Other)
}

/// Station identifier: the file name without directories or extension
pub fn station_id_from_filename(file_name: &str) -> String {
    let base = file_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(file_name);
    match base.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}
