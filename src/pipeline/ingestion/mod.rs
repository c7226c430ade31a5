// Pipeline ingestion: decoding and reading raw source files

pub mod cases;

pub use cases::{read_case_csv, CaseIngest, RawCaseRecord};

/// Decodes ISO-8859-1 bytes. Every byte maps to the code point of the
/// same value, so decoding never fails.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_latin1_accents() {
        // "PRECIPITAÇÃO" in ISO-8859-1
        let bytes = [
            b'P', b'R', b'E', b'C', b'I', b'P', b'I', b'T', b'A', 0xC7, 0xC3, b'O',
        ];
        assert_eq!(decode_latin1(&bytes), "PRECIPITAÇÃO");
    }
}
