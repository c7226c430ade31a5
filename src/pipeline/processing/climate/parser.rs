use std::collections::BTreeMap;

use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, info};

use crate::constants::{LEGACY_FORMAT_CUTOFF_YEAR, STATION_METADATA_LINES};
use crate::domain::{ClimateValues, ClimateVariable, StationMonthlyAggregate, YearMonth};
use crate::pipeline::processing::dates::DateCascade;
use crate::pipeline::processing::region::{station_id_from_filename, station_region_from_filename};

use super::strategies::{
    AlternateHeadersStrategy, ColumnMap, ColumnStrategy, DelimitedStrategy, KeywordMatchStrategy,
    RawLineSplitStrategy, RawTable, ResplitConcatenatedStrategy, TableStrategy,
};

static NON_NUMERIC: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\d\.,\-]").expect("valid regex"));

/// Station file layout, decided by the target year
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatEra {
    Legacy,
    Modern,
}

impl FormatEra {
    pub fn for_year(year: i32) -> Self {
        if year < LEGACY_FORMAT_CUTOFF_YEAR {
            FormatEra::Legacy
        } else {
            FormatEra::Modern
        }
    }
}

/// Strips everything but digits, sign and separators, turns the decimal
/// comma into a point and keeps the value only inside `variable`'s range.
pub fn clean_numeric(raw: &str, variable: ClimateVariable) -> Option<f64> {
    let kept = NON_NUMERIC.replace_all(raw, "");
    let value: f64 = kept.replace(',', ".").parse().ok()?;
    let (min, max) = variable.plausible_range();
    (value.is_finite() && value >= min && value <= max).then_some(value)
}

/// Parser for one INMET station file, configured for a format era
pub struct StationFileParser {
    era: FormatEra,
    table_strategies: Vec<Box<dyn TableStrategy>>,
    column_strategies: Vec<Box<dyn ColumnStrategy>>,
    dates: DateCascade,
}

impl StationFileParser {
    pub fn for_year(year: i32) -> Self {
        Self::new(FormatEra::for_year(year))
    }

    pub fn new(era: FormatEra) -> Self {
        match era {
            FormatEra::Legacy => Self {
                era,
                table_strategies: vec![
                    Box::new(DelimitedStrategy),
                    Box::new(ResplitConcatenatedStrategy),
                    Box::new(RawLineSplitStrategy),
                ],
                column_strategies: vec![
                    Box::new(KeywordMatchStrategy),
                    Box::new(AlternateHeadersStrategy),
                ],
                dates: DateCascade::legacy(),
            },
            FormatEra::Modern => Self {
                era,
                table_strategies: vec![Box::new(DelimitedStrategy)],
                column_strategies: vec![Box::new(KeywordMatchStrategy)],
                dates: DateCascade::modern(),
            },
        }
    }

    pub fn era(&self) -> FormatEra {
        self.era
    }

    /// First table strategy whose columns yield a date. The first column
    /// strategy that finds a date decides the layout; later ones only fill
    /// variables it left unassigned.
    fn locate(&self, body: &str) -> Option<(RawTable, ColumnMap)> {
        for table_strategy in &self.table_strategies {
            let Some(table) = table_strategy.read(body) else {
                continue;
            };
            let mut resolved: Option<ColumnMap> = None;
            for column_strategy in &self.column_strategies {
                if resolved.as_ref().is_some_and(ColumnMap::is_complete) {
                    break;
                }
                let Some(candidate) = column_strategy.locate(&table.headers) else {
                    continue;
                };
                match resolved.as_mut() {
                    None => {
                        debug!(
                            "Station layout resolved by {} + {}",
                            table_strategy.name(),
                            column_strategy.name()
                        );
                        resolved = Some(candidate);
                    }
                    Some(map) => {
                        let filled = map.fill_missing_from(&candidate);
                        if !filled.is_empty() {
                            debug!("{} filled {:?}", column_strategy.name(), filled);
                        }
                    }
                }
            }
            if let Some(map) = resolved {
                return Some((table, map));
            }
        }
        None
    }

    /// Parses one station file into monthly aggregates for `year`.
    ///
    /// Returns `None` when no date column can be located, when no row falls
    /// in the target year, or when no variable has a usable reading.
    pub fn parse(&self, file_name: &str, content: &str, year: i32) -> Option<Vec<StationMonthlyAggregate>> {
        let body: String = content
            .lines()
            .skip(STATION_METADATA_LINES)
            .collect::<Vec<_>>()
            .join("\n");

        let Some((table, columns)) = self.locate(&body) else {
            debug!("No date column found in {}", file_name);
            return None;
        };

        let (dates, stage) = self.dates.parse_column(&table.column(columns.date));
        if stage.is_none() {
            debug!("No parseable date in {}", file_name);
            return None;
        }

        // Per month: precipitation sum, temperature and humidity sum + count
        let mut months: BTreeMap<YearMonth, ClimateValues<(f64, usize)>> = BTreeMap::new();
        let mut rows_in_year = 0usize;
        for (row, date) in table.rows.iter().zip(dates) {
            let Some(date) = date.filter(|d| d.year() == year) else {
                continue;
            };
            rows_in_year += 1;
            let bucket = months.entry(YearMonth::from_date(date)).or_default();
            for variable in ClimateVariable::ALL {
                let Some(idx) = *columns.values.get(variable) else {
                    continue;
                };
                let cell = row.get(idx).map(String::as_str).unwrap_or("");
                if let Some(value) = clean_numeric(cell, variable) {
                    let slot = bucket.get_mut(variable);
                    slot.0 += value;
                    slot.1 += 1;
                }
            }
        }

        if rows_in_year == 0 {
            debug!("{} has no rows in {}", file_name, year);
            return None;
        }

        let station = station_id_from_filename(file_name);
        let region = station_region_from_filename(file_name);
        let aggregates: Vec<StationMonthlyAggregate> = months
            .into_iter()
            .map(|(month, sums)| StationMonthlyAggregate {
                station: station.clone(),
                region,
                month,
                values: sums.map(|variable, (sum, count)| {
                    (count > 0).then(|| match variable {
                        ClimateVariable::Precipitation => sum,
                        _ => sum / count as f64,
                    })
                }),
            })
            .collect();

        if aggregates.iter().all(|a| a.values.is_empty()) {
            debug!("{} has no usable readings", file_name);
            return None;
        }

        info!(
            "Parsed {} ({}): {} rows in {}, {} months",
            station,
            region,
            rows_in_year,
            year,
            aggregates.len()
        );
        Some(aggregates)
    }
}

/// Parses one station file with the layout implied by `year`
pub fn parse_station_file(file_name: &str, content: &str, year: i32) -> Option<Vec<StationMonthlyAggregate>> {
    StationFileParser::for_year(year).parse(file_name, content, year)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{Region, StationRegion};

    const METADATA: &str = "REGIAO:;CO\nUF:;DF\nESTACAO:;BRASILIA\nCODIGO (WMO):;A001\nLATITUDE:;-15,78\nLONGITUDE:;-47,92\nALTITUDE:;1160,96\nDATA DE FUNDACAO:;07/05/00\n";

    fn modern_file() -> String {
        let mut content = METADATA.to_string();
        content.push_str("Data;Hora UTC;PRECIPITAÇÃO TOTAL, HORÁRIO (mm);TEMPERATURA DO AR - BULBO SECO, HORARIA (°C);UMIDADE RELATIVA DO AR, HORARIA (%);\n");
        content.push_str("2020/01/01;0000 UTC;1,5;20,0;80;\n");
        content.push_str("2020/01/01;0100 UTC;0,5;22,0;90;\n");
        content.push_str("2020/02/01;0000 UTC;-9999;24,0;;\n");
        content.push_str("2019/12/31;2300 UTC;9,0;30,0;50;\n");
        content
    }

    #[test]
    fn test_clean_numeric() {
        assert_eq!(clean_numeric("25,4", ClimateVariable::Temperature), Some(25.4));
        assert_eq!(clean_numeric(" 12.5 °C", ClimateVariable::Temperature), Some(12.5));
        assert_eq!(clean_numeric("-9999", ClimateVariable::Precipitation), None);
        assert_eq!(clean_numeric("101", ClimateVariable::Humidity), None);
        assert_eq!(clean_numeric("", ClimateVariable::Humidity), None);
        assert_eq!(clean_numeric("-5", ClimateVariable::Temperature), Some(-5.0));
    }

    #[test]
    fn test_non_numeric_pattern_keeps_separators() {
        assert_eq!(NON_NUMERIC.replace_all("-1a2,5 mm", ""), "-12,5");
        assert_eq!(clean_numeric("1.013,2 hPa", ClimateVariable::Precipitation), None);
    }

    #[test]
    fn test_era_cutoff() {
        assert_eq!(FormatEra::for_year(2018), FormatEra::Legacy);
        assert_eq!(FormatEra::for_year(2019), FormatEra::Modern);
    }

    #[test]
    fn test_parses_modern_file() {
        let name = "INMET_CO_DF_A001_BRASILIA_01-01-2020_A_31-12-2020.CSV";
        let months = parse_station_file(name, &modern_file(), 2020).unwrap();
        assert_eq!(months.len(), 2);

        let jan = &months[0];
        assert_eq!(jan.month, YearMonth::new(2020, 1).unwrap());
        assert_eq!(jan.region, StationRegion::Known(Region::CentroOeste));
        assert_eq!(jan.station, "INMET_CO_DF_A001_BRASILIA_01-01-2020_A_31-12-2020");
        assert_eq!(jan.values.precipitation_mm, Some(2.0));
        assert_eq!(jan.values.temperature_c, Some(21.0));
        assert_eq!(jan.values.humidity_pct, Some(85.0));

        // Out-of-range and empty cells are nulled, the row still counts
        let feb = &months[1];
        assert_eq!(feb.values.precipitation_mm, None);
        assert_eq!(feb.values.temperature_c, Some(24.0));
        assert_eq!(feb.values.humidity_pct, None);
    }

    #[test]
    fn test_other_year_yields_none() {
        assert!(parse_station_file("INMET_S_X.CSV", &modern_file(), 2021).is_none());
    }

    #[test]
    fn test_missing_date_column_yields_none() {
        let mut content = METADATA.to_string();
        content.push_str("HORA;CHUVA\n0000;1,0\n");
        assert!(parse_station_file("INMET_N_X.CSV", &content, 2020).is_none());
    }

    #[test]
    fn test_parses_concatenated_legacy_file() {
        let mut content = METADATA.to_string();
        content.push_str("\"DATA (YYYY-MM-DD);HORA (UTC);PRECIPITACAO;TEMPERATURA DO AR - BULBO SECO, HORARIA (°C);UMIDADE RELATIVA DO AR, HORARIA (%)\"\n");
        content.push_str("\"2015-03-01;00:00;2,0;26,0;70\"\n");
        content.push_str("\"2015-03-02;00:00;3,0;28,0;74\"\n");
        let months = parse_station_file("INMET_NE_BA_A401.CSV", &content, 2015).unwrap();
        assert_eq!(months.len(), 1);
        assert_eq!(months[0].values.precipitation_mm, Some(5.0));
        assert_eq!(months[0].values.temperature_c, Some(27.0));
        assert_eq!(months[0].region, StationRegion::Known(Region::Nordeste));
    }

    #[test]
    fn test_legacy_day_first_dates() {
        let mut content = METADATA.to_string();
        content.push_str("Data;Precipitacao;TempBulboSeco;UmidadeRelativa\n");
        content.push_str("05/04/2016;1,0;20,0;60\n");
        let months = parse_station_file("S_A801.csv", &content, 2016).unwrap();
        assert_eq!(months[0].month, YearMonth::new(2016, 4).unwrap());
        assert_eq!(months[0].values.precipitation_mm, Some(1.0));
        assert_eq!(months[0].values.humidity_pct, Some(60.0));
        // No keyword matches TempBulboSeco; the legacy header list supplies it
        assert_eq!(months[0].values.temperature_c, Some(20.0));
    }
}
