use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{
    AdPerformanceRecord, AdSetSeries, DashboardAggregate, DashboardData, DashboardFilter,
    MonthlySeries,
};
use chrono::{Datelike, NaiveDate};
use rust_decimal::Decimal;
use std::collections::HashMap;
use tracing::info;

/// Summary totals, guarded ratios and the two per-ad-set groupings for one
/// filtered record set. Pure; an empty set yields an all-zero aggregate.
pub fn summarize(records: &[AdPerformanceRecord]) -> DashboardAggregate {
    let mut aggregate = DashboardAggregate::default();
    if records.is_empty() {
        return aggregate;
    }

    for record in records {
        aggregate.total_spend += record.amount_spent.unwrap_or(Decimal::ZERO);
        aggregate.total_reach += record.reach.unwrap_or(0);
        aggregate.total_impressions += record.impressions.unwrap_or(0);
        aggregate.total_results += record.results.unwrap_or(0);

        *aggregate
            .budget_by_ad_set
            .entry(record.ad_set_name.clone())
            .or_insert(Decimal::ZERO) += record.budget_amount.unwrap_or(Decimal::ZERO);
        *aggregate
            .spend_by_ad_set
            .entry(record.ad_set_name.clone())
            .or_insert(Decimal::ZERO) += record.amount_spent.unwrap_or(Decimal::ZERO);
    }

    aggregate.avg_cost_per_result =
        guarded_div(aggregate.total_spend, Decimal::from(aggregate.total_results));
    aggregate.reach_over_impressions = guarded_div(
        Decimal::from(aggregate.total_reach),
        Decimal::from(aggregate.total_impressions),
    );
    aggregate.conversion_rate = guarded_div(
        Decimal::from(aggregate.total_results),
        Decimal::from(aggregate.total_impressions),
    );
    aggregate.cost_per_thousand_impressions = guarded_div(
        aggregate.total_spend,
        Decimal::from(aggregate.total_impressions),
    ) * Decimal::ONE_THOUSAND;

    aggregate
}

/// Per-month sums for the chart metrics, bucketed by `report_start` month.
/// Every metric always has twelve entries, index 0 = January; records from
/// other years are ignored.
pub fn monthly_series(records: &[AdPerformanceRecord], year: i32) -> MonthlySeries {
    let mut series = MonthlySeries::new();
    for metric in ["amountSpent", "reach", "impressions", "results"] {
        series.insert(metric.to_string(), vec![Decimal::ZERO; 12]);
    }

    for record in records {
        if record.report_start.year() != year {
            continue;
        }
        let month = record.report_start.month0() as usize;
        add_month(&mut series, "amountSpent", month, record.amount_spent.unwrap_or(Decimal::ZERO));
        add_month(&mut series, "reach", month, Decimal::from(record.reach.unwrap_or(0)));
        add_month(&mut series, "impressions", month, Decimal::from(record.impressions.unwrap_or(0)));
        add_month(&mut series, "results", month, Decimal::from(record.results.unwrap_or(0)));
    }

    series
}

fn add_month(series: &mut MonthlySeries, metric: &str, month: usize, value: Decimal) {
    if let Some(values) = series.get_mut(metric) {
        values[month] += value;
    }
}

/// Per-ad-set sums over the whole record set, plus a per-group cost per
/// result (zero when the group has no results).
pub fn per_ad_set_series(records: &[AdPerformanceRecord]) -> AdSetSeries {
    #[derive(Default)]
    struct Group {
        spent: Decimal,
        reach: i64,
        impressions: i64,
        results: i64,
    }

    let mut groups: HashMap<String, Group> = HashMap::new();
    for record in records {
        let group = groups.entry(record.ad_set_name.clone()).or_default();
        group.spent += record.amount_spent.unwrap_or(Decimal::ZERO);
        group.reach += record.reach.unwrap_or(0);
        group.impressions += record.impressions.unwrap_or(0);
        group.results += record.results.unwrap_or(0);
    }

    let mut series = AdSetSeries::new();
    let mut spent = HashMap::new();
    let mut reach = HashMap::new();
    let mut impressions = HashMap::new();
    let mut results = HashMap::new();
    let mut cost_per_result = HashMap::new();

    for (ad_set, group) in &groups {
        spent.insert(ad_set.clone(), group.spent);
        reach.insert(ad_set.clone(), Decimal::from(group.reach));
        impressions.insert(ad_set.clone(), Decimal::from(group.impressions));
        results.insert(ad_set.clone(), Decimal::from(group.results));
        cost_per_result.insert(
            ad_set.clone(),
            guarded_div(group.spent, Decimal::from(group.results)),
        );
    }

    series.insert("amountSpent".to_string(), spent);
    series.insert("reach".to_string(), reach);
    series.insert("impressions".to_string(), impressions);
    series.insert("results".to_string(), results);
    series.insert("costPerResult".to_string(), cost_per_result);
    series
}

fn guarded_div(numerator: Decimal, denominator: Decimal) -> Decimal {
    if denominator > Decimal::ZERO {
        numerator / denominator
    } else {
        Decimal::ZERO
    }
}

/// Assembles the view-ready dashboard payload for one filter: the filtered
/// aggregate, the selectable ad-set names and the last upload timestamp.
pub fn dashboard_data(db: &Database, filter: DashboardFilter) -> AppResult<DashboardData> {
    let records = db.records_in_range(
        filter.start_date,
        filter.end_date,
        filter.ad_set_name.as_deref(),
    )?;
    let available_ad_sets = db.all_ad_set_names()?;
    let last_upload = db.last_upload_timestamp()?;

    info!(
        records = records.len(),
        ad_sets = available_ad_sets.len(),
        "assembled dashboard data"
    );

    Ok(DashboardData {
        aggregate: summarize(&records),
        filter,
        available_ad_sets,
        last_upload,
    })
}

/// Monthly chart payload for one calendar year.
pub fn monthly_chart_data(db: &Database, year: i32) -> AppResult<MonthlySeries> {
    let start = NaiveDate::from_ymd_opt(year, 1, 1);
    let end = NaiveDate::from_ymd_opt(year, 12, 31);
    let records = db.records_in_range(start, end, None)?;
    Ok(monthly_series(&records, year))
}

/// Per-ad-set chart payload over the full data set.
pub fn ad_set_chart_data(db: &Database) -> AppResult<AdSetSeries> {
    let records = db.all_records()?;
    Ok(per_ad_set_series(&records))
}
