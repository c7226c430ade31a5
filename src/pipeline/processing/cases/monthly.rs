use std::collections::HashMap;

use tracing::debug;

use crate::domain::{CaseRecord, Region, RegionMonthlyCases, YearMonth};

/// Counts validated cases per region and month of `year`. Every region and
/// month is present, zero-filled, sorted by region then month.
pub fn group_monthly(records: &[CaseRecord], year: i32) -> Vec<RegionMonthlyCases> {
    let mut counts: HashMap<(Region, YearMonth), u64> = HashMap::new();
    let mut undated = 0usize;

    for record in records {
        let (Some(region), Some(month)) = (record.region, record.notification_month()) else {
            undated += 1;
            continue;
        };
        if month.year == year {
            *counts.entry((region, month)).or_insert(0) += 1;
        }
    }
    if undated > 0 {
        debug!("{} records without date or region left out of the monthly grid", undated);
    }

    Region::ALL
        .iter()
        .flat_map(|region| {
            let counts = &counts;
            YearMonth::months_of(year).map(move |month| RegionMonthlyCases {
                region: *region,
                month,
                cases: counts.get(&(*region, month)).copied().unwrap_or(0),
                label: month.short_label(),
            })
        })
        .collect()
}
