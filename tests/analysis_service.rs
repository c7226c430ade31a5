use std::fs;
use std::path::Path;

use arbo_climate::analysis::{correlate, prepare_correlation};
use arbo_climate::app::{AnalysisOutcome, AnalysisRequest, AnalysisService};
use arbo_climate::config::Config;
use arbo_climate::domain::{
    ClimateGrid, ClimateValues, ClimateVariable, Disease, Region, RegionMonthlyCases, RegionMonthlyClimate,
    StationRegion, ValueSource, YearMonth,
};
use arbo_climate::gateway::{CacheKey, DatasetKind, FsArtifactCache};
use tempfile::TempDir;

const METADATA: &str = "REGIAO:;NE\nUF:;BA\nESTACAO:;SALVADOR\nCODIGO (WMO):;A401\nLATITUDE:;-13,0\nLONGITUDE:;-38,5\nALTITUDE:;51,41\nDATA DE FUNDACAO:;13/05/00\n";
const HEADER: &str = "Data;Hora UTC;PRECIPITAÇÃO TOTAL, HORÁRIO (mm);TEMPERATURA DO AR - BULBO SECO, HORARIA (°C);UMIDADE RELATIVA DO AR, HORARIA (%);\n";

/// INMET files are ISO-8859-1
fn latin1(text: &str) -> Vec<u8> {
    text.chars().map(|c| c as u8).collect()
}

/// Nordeste notifications growing month over month, and a station whose
/// temperature grows with them
fn write_sources(root: &Path) {
    fs::create_dir_all(root.join("cases")).unwrap();
    let mut cases = String::from("DT_NOTIFIC,SG_UF,ID_MUNICIP,CS_SEXO,NU_IDADE_N\n");
    for month in 1..=12u32 {
        for i in 0..month * 2 {
            cases.push_str(&format!("2021-{:02}-{:02},29,2927{:03},M,{}\n", month, 1 + i % 28, i, 18 + i));
        }
    }
    fs::write(root.join("cases/DENGBR21.csv"), cases).unwrap();

    let year_dir = root.join("climate/2021");
    fs::create_dir_all(&year_dir).unwrap();
    let mut station = format!("{METADATA}{HEADER}");
    for month in 1..=12u32 {
        station.push_str(&format!("2021/{:02}/20;1200 UTC;{},0;{},0;{};\n", month, month * 3, 20 + month, 90 - month));
    }
    fs::write(year_dir.join("INMET_NE_BA_A401_SALVADOR_01-01-2021_A_31-12-2021.CSV"), latin1(&station)).unwrap();
}

fn service(dir: &TempDir) -> AnalysisService {
    write_sources(&dir.path().join("data"));
    let mut config = Config::default();
    config.cache.dir = dir.path().join("cache");
    config.sources.root = dir.path().join("data");
    AnalysisService::from_config(config)
}

fn request(variable: ClimateVariable, lag: i64) -> AnalysisRequest {
    AnalysisRequest {
        disease: Disease::Dengue,
        year: 2021,
        variable,
        lag,
        use_cache: true,
    }
}

#[test]
fn test_end_to_end_analysis_is_cached() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);

    let (report, from_cache) = service.analyze(request(ClimateVariable::Temperature, 1)).unwrap();
    assert!(!from_cache);
    let AnalysisOutcome::Computed { dataset, result, report: summary } = &report.outcome else {
        panic!("expected a computed outcome");
    };
    // January cases would need December 2020 climate
    assert_eq!(dataset.len(), 11);
    assert_eq!(dataset.records[0].label, "Jan → Feb");
    assert!(result.by_region.contains_key(&Region::Nordeste));
    let finding = summary.principal_finding.as_ref().unwrap();
    assert!(finding.rho > 0.9);
    assert!(finding.significant);

    let (cached, from_cache) = service.analyze(request(ClimateVariable::Temperature, 1)).unwrap();
    assert!(from_cache);
    assert_eq!(cached, report);

    let cache_dir = dir.path().join("cache");
    assert!(cache_dir.join("arboviruses/dengue_2021.json").is_file());
    assert!(cache_dir.join("climate/climate_2021.json").is_file());
    assert!(cache_dir.join("correlation/dengue_temperature_c_lag1_2021.json").is_file());
}

#[test]
fn test_corrupt_artifact_is_recomputed() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    let (_, from_cache) = service.climate_grid(2021, true).unwrap();
    assert!(!from_cache);

    let cache = FsArtifactCache::new(dir.path().join("cache"), std::time::Duration::from_secs(3600));
    fs::write(cache.path_for(&CacheKey::climate(2021)), b"{\"year\":2021,\"rows\":[]}").unwrap();

    let (grid, from_cache) = service.climate_grid(2021, true).unwrap();
    assert!(!from_cache);
    assert_eq!(grid.rows.len(), 12);
}

#[test]
fn test_clear_cache_by_kind() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    service.analyze(request(ClimateVariable::Precipitation, 0)).unwrap();
    service.analyze(request(ClimateVariable::Humidity, 2)).unwrap();

    assert_eq!(service.clear_cache(Some(DatasetKind::Correlation)).unwrap(), 2);
    let (_, from_cache) = service.cleaned_cases(Disease::Dengue, 2021, true).unwrap();
    assert!(from_cache);
    assert_eq!(service.clear_cache(None).unwrap(), 2);
}

#[test]
fn test_missing_sources_are_errors() {
    let dir = TempDir::new().unwrap();
    let service = service(&dir);
    assert!(service.cleaned_cases(Disease::Zika, 2021, true).is_err());
    assert!(service.climate_grid(2019, true).is_err());
}

#[test]
fn test_sampling_change_misses_case_cache() {
    let dir = TempDir::new().unwrap();
    let data = dir.path().join("data");
    write_sources(&data);
    let mut chikungunya = String::from("DT_NOTIFIC,SG_UF,ID_MUNICIP,CS_SEXO,NU_IDADE_N,CLASSI_FIN\n");
    for i in 0..40u32 {
        chikungunya.push_str(&format!("2021-05-{:02},29,2927{:03},F,30,13\n", 1 + i % 28, i));
    }
    fs::write(data.join("cases/CHIKBR21.csv"), chikungunya).unwrap();

    let service_with_seed = |seed: u64| {
        let mut config = Config::default();
        config.cache.dir = dir.path().join("cache");
        config.sources.root = data.clone();
        config.sampling.seed = seed;
        AnalysisService::from_config(config)
    };

    let original = service_with_seed(42);
    let (records, from_cache) = original.cleaned_cases(Disease::Chikungunya, 2021, true).unwrap();
    assert!(!from_cache);
    assert_eq!(records.len(), 27);
    let (_, from_cache) = original.cleaned_cases(Disease::Chikungunya, 2021, true).unwrap();
    assert!(from_cache);
    let (_, from_cache) = original.analyze(AnalysisRequest {
        disease: Disease::Chikungunya,
        ..request(ClimateVariable::Temperature, 0)
    })
    .unwrap();
    assert!(!from_cache);

    let reseeded = service_with_seed(7);
    let (again, from_cache) = reseeded.cleaned_cases(Disease::Chikungunya, 2021, true).unwrap();
    assert!(!from_cache);
    assert_eq!(again.len(), 27);
    let (_, from_cache) = reseeded
        .analyze(AnalysisRequest {
            disease: Disease::Chikungunya,
            ..request(ClimateVariable::Temperature, 0)
        })
        .unwrap();
    assert!(!from_cache);

    // Dengue does not depend on the sampling calibration
    original.cleaned_cases(Disease::Dengue, 2021, true).unwrap();
    let (_, from_cache) = reseeded.cleaned_cases(Disease::Dengue, 2021, true).unwrap();
    assert!(from_cache);

    let cases_dir = dir.path().join("cache/arboviruses");
    assert!(cases_dir.join("chikungunya_r0.68_s42_2021.json").is_file());
    assert!(cases_dir.join("chikungunya_r0.68_s7_2021.json").is_file());
}

fn climate_row(region: Region, month: u32, temp: f64) -> RegionMonthlyClimate {
    RegionMonthlyClimate {
        region: StationRegion::Known(region),
        month: YearMonth::new(2023, month).unwrap(),
        values: ClimateValues {
            precipitation_mm: 150.0,
            temperature_c: temp,
            humidity_pct: 80.0,
        },
        provenance: ClimateValues::from_fn(|_| ValueSource::Observed),
    }
}

#[test]
fn test_lag_one_joins_previous_month() {
    let march = YearMonth::new(2023, 3).unwrap();
    let cases = vec![RegionMonthlyCases {
        region: Region::Norte,
        month: march,
        cases: 50,
        label: march.short_label(),
    }];
    let grid = ClimateGrid {
        year: 2023,
        rows: vec![climate_row(Region::Norte, 2, 28.0), climate_row(Region::Norte, 3, 31.0)],
    };

    let dataset = prepare_correlation(&cases, &grid, Disease::Dengue, 2023, 1).unwrap();
    assert_eq!(dataset.len(), 1);
    let record = &dataset.records[0];
    assert_eq!(record.case_month, march);
    assert_eq!(record.climate_month, YearMonth::new(2023, 2).unwrap());
    assert_eq!(record.climate.temperature_c, 28.0);
    assert_eq!(record.label, "Feb → Mar");

    let same_month = prepare_correlation(&cases, &grid, Disease::Dengue, 2023, 0).unwrap();
    assert_eq!(same_month.records[0].climate.temperature_c, 31.0);
}

#[test]
fn test_correlation_ignores_row_order() {
    let cases: Vec<RegionMonthlyCases> = (1..=12)
        .flat_map(|m| {
            let month = YearMonth::new(2023, m).unwrap();
            [Region::Sul, Region::Nordeste].map(|region| RegionMonthlyCases {
                region,
                month,
                cases: (m as u64 * 7) % 11,
                label: month.short_label(),
            })
        })
        .collect();
    let rows: Vec<RegionMonthlyClimate> = (1..=12)
        .flat_map(|m| [climate_row(Region::Sul, m, 15.0 + m as f64), climate_row(Region::Nordeste, m, 30.0 - m as f64)])
        .collect();
    let grid = ClimateGrid { year: 2023, rows };

    let forward = prepare_correlation(&cases, &grid, Disease::Zika, 2023, 0).unwrap();
    let mut reversed = forward.clone();
    reversed.records.reverse();

    let a = correlate(&forward, ClimateVariable::Temperature);
    let b = correlate(&reversed, ClimateVariable::Temperature);
    let (oa, ob) = (a.overall.unwrap(), b.overall.unwrap());
    assert!((oa.rho - ob.rho).abs() < 1e-12);
    assert!((oa.p_value - ob.p_value).abs() < 1e-12);
    assert_eq!(a.by_region.len(), 2);
    for (region, stat) in &a.by_region {
        assert!((stat.rho - b.by_region[region].rho).abs() < 1e-12);
    }
}
