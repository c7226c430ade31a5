use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::constants::{
    case_columns, COL_AGE, COL_CLASSIFICATION, COL_MUNICIPALITY, COL_NOTIFICATION_DATE, COL_SEX,
    COL_UF,
};
use crate::domain::Disease;
use crate::error::Result;

use super::decode_latin1;

/// A notification row as read from the source file, before any cleaning
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawCaseRecord {
    pub notification_date: Option<String>,
    pub uf_code: Option<String>,
    pub municipality: Option<String>,
    pub sex: Option<String>,
    pub age: Option<String>,
    pub classification: Option<String>,
}

/// Rows read from one notification file
#[derive(Debug, Clone, Default)]
pub struct CaseIngest {
    pub records: Vec<RawCaseRecord>,
    /// Rows the CSV reader could not decode
    pub skipped: usize,
    /// Columns of interest absent from the header
    pub missing_columns: Vec<String>,
}

/// Reads a yearly notification file keeping only the columns of interest.
/// Missing columns become null fields; malformed rows are skipped and counted.
pub fn read_case_csv(bytes: &[u8], disease: Disease) -> Result<CaseIngest> {
    let text = decode_latin1(bytes);
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    let position = |column: &str| {
        headers
            .iter()
            .position(|h| h.trim().eq_ignore_ascii_case(column))
    };

    let wanted = case_columns(disease.has_classification());
    let missing_columns: Vec<String> = wanted
        .iter()
        .filter(|c| position(c).is_none())
        .map(|c| c.to_string())
        .collect();
    if !missing_columns.is_empty() {
        warn!(
            "{} source is missing columns {:?}; they will be null",
            disease, missing_columns
        );
    }

    let date_idx = position(COL_NOTIFICATION_DATE);
    let uf_idx = position(COL_UF);
    let municipality_idx = position(COL_MUNICIPALITY);
    let sex_idx = position(COL_SEX);
    let age_idx = position(COL_AGE);
    let classification_idx = if disease.has_classification() {
        position(COL_CLASSIFICATION)
    } else {
        None
    };

    let mut ingest = CaseIngest {
        missing_columns,
        ..CaseIngest::default()
    };

    for (row, result) in reader.records().enumerate() {
        match result {
            Ok(record) => {
                let field = |idx: Option<usize>| {
                    idx.and_then(|i| record.get(i))
                        .map(str::trim)
                        .filter(|v| !v.is_empty())
                        .map(str::to_string)
                };
                ingest.records.push(RawCaseRecord {
                    notification_date: field(date_idx),
                    uf_code: field(uf_idx),
                    municipality: field(municipality_idx),
                    sex: field(sex_idx),
                    age: field(age_idx),
                    classification: field(classification_idx),
                });
            }
            Err(e) => {
                ingest.skipped += 1;
                debug!("Skipped {} row {}: {}", disease, row + 1, e);
            }
        }
    }

    info!(
        "Read {} {} notifications ({} rows skipped)",
        ingest.records.len(),
        disease,
        ingest.skipped
    );
    Ok(ingest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_columns_of_interest() {
        let csv = "DT_NOTIFIC,SG_UF,ID_MUNICIP,CS_SEXO,NU_IDADE_N,CLASSI_FIN,EXTRA\n\
                   2023-01-05,35,355030,F,4025,5,x\n\
                   2023-01-06,,,,,13,y\n";
        let ingest = read_case_csv(csv.as_bytes(), Disease::Chikungunya).unwrap();
        assert_eq!(ingest.records.len(), 2);
        assert!(ingest.missing_columns.is_empty());
        let first = &ingest.records[0];
        assert_eq!(first.notification_date.as_deref(), Some("2023-01-05"));
        assert_eq!(first.uf_code.as_deref(), Some("35"));
        assert_eq!(first.classification.as_deref(), Some("5"));
        let second = &ingest.records[1];
        assert_eq!(second.uf_code, None);
        assert_eq!(second.classification.as_deref(), Some("13"));
    }

    #[test]
    fn test_dengue_ignores_classification() {
        let csv = "DT_NOTIFIC,SG_UF,CLASSI_FIN\n2023-01-05,35,5\n";
        let ingest = read_case_csv(csv.as_bytes(), Disease::Dengue).unwrap();
        assert_eq!(ingest.records[0].classification, None);
        assert_eq!(
            ingest.missing_columns,
            vec![COL_MUNICIPALITY.to_string(), COL_SEX.to_string(), COL_AGE.to_string()]
        );
    }

    #[test]
    fn test_latin1_bytes_are_accepted() {
        let mut bytes = b"DT_NOTIFIC,SG_UF,ID_MUNICIP\n2023-02-01,31,S".to_vec();
        bytes.push(0xC3); // Ã
        bytes.extend_from_slice(b"O\n");
        let ingest = read_case_csv(&bytes, Disease::Dengue).unwrap();
        assert_eq!(ingest.records[0].municipality.as_deref(), Some("SÃO"));
    }
}
