//! Candidate strategies for reading a station file body into a table and
//! locating its columns. The parser tries them in order and keeps the
//! first combination that yields a date column.

use tracing::{debug, warn};

use crate::domain::{ClimateValues, ClimateVariable};

/// Header plus rows of string cells
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RawTable {
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    fn new(headers: Vec<String>, rows: Vec<Vec<String>>) -> Option<Self> {
        let headers: Vec<String> = headers.into_iter().map(|h| h.trim().to_string()).collect();
        (headers.len() > 1 && !rows.is_empty()).then_some(Self { headers, rows })
    }

    pub fn column(&self, idx: usize) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.get(idx).map(String::as_str).unwrap_or(""))
            .collect()
    }
}

/// Turns the body of a station file (metadata lines removed) into a table
pub trait TableStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn read(&self, body: &str) -> Option<RawTable>;
}

fn read_delimited(body: &str) -> (Vec<String>, Vec<Vec<String>>) {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .from_reader(body.as_bytes());

    let headers = match reader.headers() {
        Ok(h) => h.iter().map(str::to_string).collect(),
        Err(e) => {
            debug!("Station header unreadable: {}", e);
            return (Vec::new(), Vec::new());
        }
    };
    // Bad lines are skipped
    let rows = reader
        .records()
        .filter_map(|r| r.ok())
        .map(|r| r.iter().map(str::to_string).collect())
        .collect();
    (headers, rows)
}

/// Plain `;`-separated reading with a header row
pub struct DelimitedStrategy;

impl TableStrategy for DelimitedStrategy {
    fn name(&self) -> &'static str {
        "delimited"
    }

    fn read(&self, body: &str) -> Option<RawTable> {
        let (headers, rows) = read_delimited(body);
        RawTable::new(headers, rows)
    }
}

/// Legacy files where every line was quoted as a whole, so the reader
/// sees a single column holding `;`-joined values
pub struct ResplitConcatenatedStrategy;

impl TableStrategy for ResplitConcatenatedStrategy {
    fn name(&self) -> &'static str {
        "resplit_concatenated"
    }

    fn read(&self, body: &str) -> Option<RawTable> {
        let (headers, rows) = read_delimited(body);
        if headers.len() != 1 || !headers[0].contains(';') {
            return None;
        }
        let split = |value: &str| value.split(';').map(str::to_string).collect::<Vec<_>>();
        let rows = rows
            .iter()
            .filter_map(|row| row.first())
            .map(|value| split(value))
            .collect();
        RawTable::new(split(&headers[0]), rows)
    }
}

/// Last resort: split raw lines on `;` ignoring any quoting
pub struct RawLineSplitStrategy;

impl TableStrategy for RawLineSplitStrategy {
    fn name(&self) -> &'static str {
        "raw_line_split"
    }

    fn read(&self, body: &str) -> Option<RawTable> {
        let mut lines = body.lines().filter(|l| !l.trim().is_empty());
        let split = |line: &str| {
            line.trim()
                .trim_matches('"')
                .split(';')
                .map(|cell| cell.trim_matches('"').to_string())
                .collect::<Vec<_>>()
        };
        let headers = split(lines.next()?);
        let rows = lines.map(split).collect();
        RawTable::new(headers, rows)
    }
}

/// Column positions located in a table
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnMap {
    pub date: usize,
    pub values: ClimateValues<Option<usize>>,
}

impl ColumnMap {
    pub fn is_complete(&self) -> bool {
        ClimateVariable::ALL
            .iter()
            .all(|v| self.values.get(*v).is_some())
    }

    fn uses(&self, idx: usize) -> bool {
        idx == self.date
            || ClimateVariable::ALL
                .iter()
                .any(|v| *self.values.get(*v) == Some(idx))
    }

    /// Takes the variables this map lacks from `other`, provided both agree
    /// on the date column and the column is not assigned yet. Returns the
    /// variables filled.
    pub fn fill_missing_from(&mut self, other: &ColumnMap) -> Vec<ClimateVariable> {
        let mut filled = Vec::new();
        if other.date != self.date {
            return filled;
        }
        for variable in ClimateVariable::ALL {
            if self.values.get(variable).is_some() {
                continue;
            }
            let Some(idx) = *other.values.get(variable) else {
                continue;
            };
            if self.uses(idx) {
                continue;
            }
            *self.values.get_mut(variable) = Some(idx);
            filled.push(variable);
        }
        filled
    }
}

/// Locates the date and variable columns of a table
pub trait ColumnStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn locate(&self, headers: &[String]) -> Option<ColumnMap>;
}

const DATE_KEYWORDS: [&str; 4] = ["DATA", "Data", "data", "DT_MEDICAO"];
const PRECIPITATION_KEYWORDS: [&str; 6] = [
    "PRECIPITAÇÃO",
    "PRECIPITACAO",
    "Precipitacao",
    "precipitacao",
    "CHUVA",
    "Chuva",
];
const TEMPERATURE_KEYWORDS: [&str; 6] = [
    "TEMPERATURA",
    "Temperatura",
    "temperatura",
    "BULBO SECO",
    "BULBO_SECO",
    "TEMPERATURA DO AR",
];
const HUMIDITY_KEYWORDS: [&str; 7] = [
    "UMIDADE RELATIVA DO AR",
    "UMIDADE_RELATIVA",
    "UMIDADE RELATIVA",
    "UMIDADE",
    "Umidade",
    "umidade",
    "RELATIVA",
];

/// Marker of hourly readings, preferred when several columns match
const HOURLY_MARKER: &str = "HORARIA";

fn keywords_for(variable: ClimateVariable) -> &'static [&'static str] {
    match variable {
        ClimateVariable::Precipitation => &PRECIPITATION_KEYWORDS,
        ClimateVariable::Temperature => &TEMPERATURE_KEYWORDS,
        ClimateVariable::Humidity => &HUMIDITY_KEYWORDS,
    }
}

/// Case-insensitive substring match against a keyword dictionary
pub struct KeywordMatchStrategy;

impl KeywordMatchStrategy {
    fn find(headers: &[String], keywords: &[&str], taken: &[usize]) -> Option<usize> {
        let candidates: Vec<usize> = headers
            .iter()
            .enumerate()
            .filter(|(idx, _)| !taken.contains(idx))
            .filter(|(_, header)| {
                let upper = header.to_uppercase();
                keywords.iter().any(|k| upper.contains(&k.to_uppercase()))
            })
            .map(|(idx, _)| idx)
            .collect();

        candidates
            .iter()
            .copied()
            .find(|idx| headers[*idx].to_uppercase().contains(HOURLY_MARKER))
            .or_else(|| candidates.first().copied())
    }
}

impl ColumnStrategy for KeywordMatchStrategy {
    fn name(&self) -> &'static str {
        "keyword_match"
    }

    fn locate(&self, headers: &[String]) -> Option<ColumnMap> {
        let date = Self::find(headers, &DATE_KEYWORDS, &[])?;
        let mut taken = vec![date];
        let mut values = ClimateValues::default();
        for variable in ClimateVariable::ALL {
            let found = Self::find(headers, keywords_for(variable), &taken);
            if let Some(idx) = found {
                taken.push(idx);
            }
            *values.get_mut(variable) = found;
        }
        Some(ColumnMap { date, values })
    }
}

/// Known legacy header sets: date, precipitation, temperature, humidity
const ALTERNATE_HEADER_SETS: [[&str; 4]; 2] = [
    [
        "DATA (YYYY-MM-DD)",
        "PRECIPITAÇÃO TOTAL, HORÁRIO (mm)",
        "TEMPERATURA DO AR - BULBO SECO, HORARIA (°C)",
        "UMIDADE RELATIVA DO AR, HORARIA (%)",
    ],
    ["Data", "Precipitacao", "TempBulboSeco", "UmidadeRelativa"],
];

/// Exact match against fixed legacy header lists.
///
/// These lists come from a handful of historical files and can assign the
/// wrong column on an unseen variant, so every use is logged as a heuristic.
pub struct AlternateHeadersStrategy;

impl ColumnStrategy for AlternateHeadersStrategy {
    fn name(&self) -> &'static str {
        "alternate_headers"
    }

    fn locate(&self, headers: &[String]) -> Option<ColumnMap> {
        let position = |name: &str| headers.iter().position(|h| h == name);
        for set in ALTERNATE_HEADER_SETS {
            let Some(date) = position(set[0]) else {
                continue;
            };
            let values = ClimateValues {
                precipitation_mm: position(set[1]),
                temperature_c: position(set[2]),
                humidity_pct: position(set[3]),
            };
            warn!(
                "Heuristic column assignment from legacy header list {:?}; verify the station layout",
                set
            );
            return Some(ColumnMap { date, values });
        }
        None
    }
}
