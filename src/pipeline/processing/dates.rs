//! Date parsing with ordered format fallbacks.

use chrono::NaiveDate;

/// The date part of a timestamp-like value (`2019-01-01 00:00` or
/// `2019-01-01T00:00` both yield `2019-01-01`)
pub fn leading_date_token(value: &str) -> &str {
    let trimmed = value.trim();
    trimmed
        .split(|c: char| c.is_whitespace() || c == 'T')
        .next()
        .unwrap_or(trimmed)
}

/// Parse a date string with multiple format attempts
pub fn parse_date_string(value: &str, formats: &[&str]) -> Option<NaiveDate> {
    let token = leading_date_token(value);
    if token.is_empty() {
        return None;
    }
    formats
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(token, format).ok())
}

/// ISO first, then slash-separated and month-first layouts
const CASE_DATE_FORMATS: [&str; 4] = ["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%Y%m%d"];

/// Notification date of a case record
pub fn parse_case_date(value: &str) -> Option<NaiveDate> {
    parse_date_string(value, &CASE_DATE_FORMATS)
}

/// One stage of a column-wide date cascade
#[derive(Debug, Clone)]
pub struct DateStage {
    pub name: &'static str,
    pub formats: &'static [&'static str],
}

/// Ordered list of stages applied to a whole column. The first stage that
/// parses at least one value decides the column; later stages are not
/// consulted even for the values it could not parse.
#[derive(Debug, Clone)]
pub struct DateCascade {
    stages: Vec<DateStage>,
}

impl DateCascade {
    pub fn new(stages: Vec<DateStage>) -> Self {
        Self { stages }
    }

    /// Layout of pre-2019 INMET files
    pub fn legacy() -> Self {
        Self::new(vec![
            DateStage {
                name: "iso",
                formats: &["%Y-%m-%d"],
            },
            DateStage {
                name: "day_first",
                formats: &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y/%m/%d", "%Y-%m-%d"],
            },
            DateStage {
                name: "dmy",
                formats: &["%d/%m/%Y"],
            },
        ])
    }

    /// Layout of 2019+ INMET files
    pub fn modern() -> Self {
        Self::new(vec![DateStage {
            name: "modern",
            formats: &["%Y/%m/%d", "%Y-%m-%d", "%m/%d/%Y"],
        }])
    }

    /// Parses every value, returning the per-row dates and the stage used
    pub fn parse_column<S: AsRef<str>>(&self, values: &[S]) -> (Vec<Option<NaiveDate>>, Option<&'static str>) {
        for stage in &self.stages {
            let parsed: Vec<Option<NaiveDate>> = values
                .iter()
                .map(|v| parse_date_string(v.as_ref(), stage.formats))
                .collect();
            if parsed.iter().any(Option::is_some) {
                return (parsed, Some(stage.name));
            }
        }
        (vec![None; values.len()], None)
    }
}
