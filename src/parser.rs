use crate::errors::{AppError, AppResult};
use crate::models::{AdPerformanceRecord, ParseBatch, RowOutcome};
use chrono::{NaiveDate, NaiveDateTime};
use csv::{ReaderBuilder, StringRecord, Trim};
use once_cell::sync::Lazy;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::str::FromStr;
use tracing::{debug, warn};

/// Column headers as they appear in the Meta export (Spanish, case-sensitive),
/// mapped to internal fields. Columns not in this table are ignored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Column {
    ReportStart,
    ReportEnd,
    AdSetName,
    DeliveryStatus,
    BidAmount,
    BidType,
    BudgetAmount,
    BudgetType,
    LastSignificantChange,
    AttributionSetting,
    Results,
    ResultIndicator,
    Reach,
    Impressions,
    CostPerResult,
    AmountSpent,
    CompletionStatus,
    CampaignStart,
}

static HEADER_TABLE: Lazy<HashMap<&'static str, Column>> = Lazy::new(|| {
    HashMap::from([
        ("Inicio del informe", Column::ReportStart),
        ("Fin del informe", Column::ReportEnd),
        ("Nombre del conjunto de anuncios", Column::AdSetName),
        ("Entrega del conjunto de anuncios", Column::DeliveryStatus),
        ("Puja", Column::BidAmount),
        ("Tipo de puja", Column::BidType),
        ("Presupuesto del conjunto de anuncios", Column::BudgetAmount),
        (
            "Tipo de presupuesto del conjunto de anuncios",
            Column::BudgetType,
        ),
        ("Último cambio significativo", Column::LastSignificantChange),
        ("Configuración de atribución", Column::AttributionSetting),
        ("Resultados", Column::Results),
        ("Indicador de resultado", Column::ResultIndicator),
        ("Alcance", Column::Reach),
        ("Impresiones", Column::Impressions),
        ("Costo por resultados", Column::CostPerResult),
        ("Importe gastado (USD)", Column::AmountSpent),
        ("Finalización", Column::CompletionStatus),
        ("Inicio", Column::CampaignStart),
    ])
});

/// Field positions resolved from one file's header row.
#[derive(Debug, Default)]
struct ColumnIndex {
    by_column: HashMap<Column, usize>,
}

impl ColumnIndex {
    fn from_headers(headers: &StringRecord) -> Self {
        let mut by_column = HashMap::new();
        for (idx, name) in headers.iter().enumerate() {
            if let Some(column) = HEADER_TABLE.get(name.trim()) {
                by_column.entry(*column).or_insert(idx);
            }
        }
        Self { by_column }
    }

    fn get<'r>(&self, column: Column, record: &'r StringRecord) -> Option<&'r str> {
        let idx = *self.by_column.get(&column)?;
        let value = record.get(idx)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value)
        }
    }
}

/// Parse an exported report into per-row outcomes, preserving input order.
///
/// Rows whose required fields (report window, ad-set name) do not parse are
/// skipped with a warning; unparseable optional fields become `None`. The
/// whole call fails only when the header row is missing or unreadable.
pub fn parse_report(text: &str) -> AppResult<ParseBatch> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(Trim::All)
        .from_reader(text.as_bytes());

    let headers = reader.headers()?.clone();
    if headers.iter().all(|field| field.trim().is_empty()) {
        return Err(AppError::Parse("missing header row".to_string()));
    }

    let index = ColumnIndex::from_headers(&headers);
    debug!(columns = index.by_column.len(), "resolved report columns");

    let mut batch = ParseBatch::default();
    for (row_number, result) in reader.records().enumerate() {
        let line = (row_number + 2) as u64;
        let record = match result {
            Ok(record) => record,
            Err(err) => {
                warn!(line, error = %err, "skipping unreadable row");
                batch.skipped.push((line, err.to_string()));
                continue;
            }
        };

        match parse_row(&index, &record, line) {
            RowOutcome::Parsed(record) => batch.records.push(record),
            RowOutcome::Skipped { line, reason } => {
                warn!(line, %reason, "skipping row");
                batch.skipped.push((line, reason));
            }
        }
    }

    Ok(batch)
}

fn parse_row(index: &ColumnIndex, record: &StringRecord, line: u64) -> RowOutcome {
    let report_start = match index.get(Column::ReportStart, record).and_then(parse_date) {
        Some(date) => date,
        None => return skipped(line, "missing or invalid report start date"),
    };
    let report_end = match index.get(Column::ReportEnd, record).and_then(parse_date) {
        Some(date) => date,
        None => return skipped(line, "missing or invalid report end date"),
    };
    let ad_set_name = match index.get(Column::AdSetName, record) {
        Some(name) => name.to_string(),
        None => return skipped(line, "missing ad-set name"),
    };

    let mut parsed = AdPerformanceRecord::new(report_start, report_end, ad_set_name);
    parsed.delivery_status = index.get(Column::DeliveryStatus, record).map(str::to_string);
    parsed.bid_amount = index.get(Column::BidAmount, record).and_then(parse_int);
    parsed.bid_type = index.get(Column::BidType, record).map(str::to_string);
    parsed.budget_amount = index.get(Column::BudgetAmount, record).and_then(parse_decimal);
    parsed.budget_type = index.get(Column::BudgetType, record).map(str::to_string);
    parsed.last_significant_change = index
        .get(Column::LastSignificantChange, record)
        .and_then(parse_datetime);
    parsed.attribution_setting = index
        .get(Column::AttributionSetting, record)
        .map(str::to_string);
    parsed.results = index.get(Column::Results, record).and_then(parse_int);
    parsed.result_indicator = index.get(Column::ResultIndicator, record).map(str::to_string);
    parsed.reach = index.get(Column::Reach, record).and_then(parse_int);
    parsed.impressions = index.get(Column::Impressions, record).and_then(parse_int);
    parsed.cost_per_result = index.get(Column::CostPerResult, record).and_then(parse_decimal);
    parsed.amount_spent = index.get(Column::AmountSpent, record).and_then(parse_decimal);
    parsed.completion_status = index
        .get(Column::CompletionStatus, record)
        .map(str::to_string);
    parsed.campaign_start = index.get(Column::CampaignStart, record).and_then(parse_date);

    RowOutcome::Parsed(parsed)
}

fn skipped(line: u64, reason: &str) -> RowOutcome {
    RowOutcome::Skipped {
        line,
        reason: reason.to_string(),
    }
}

/// Exports carry ISO dates; older ones use day-first slashes.
fn parse_date(value: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(value, "%d/%m/%Y"))
        .ok()
}

fn parse_datetime(value: &str) -> Option<NaiveDateTime> {
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S")
        .or_else(|_| NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S"))
        .ok()
        .or_else(|| parse_date(value).and_then(|date| date.and_hms_opt(0, 0, 0)))
}

fn parse_int(value: &str) -> Option<i64> {
    let value = parse_decimal(value)?;
    if value.is_integer() {
        value.to_i64()
    } else {
        None
    }
}

/// Lenient money parse: tolerates a currency prefix and thousands grouping.
/// Commas are accepted only as grouping (followed by exactly three digits),
/// so a decimal-comma value like `1,5` degrades to `None` instead of a
/// wrong number.
fn parse_decimal(value: &str) -> Option<Decimal> {
    let core = value
        .trim_start_matches(|c: char| !(c.is_ascii_digit() || c == '-'))
        .trim_end_matches(|c: char| !c.is_ascii_digit());
    let (sign, digits) = match core.strip_prefix('-') {
        Some(rest) => ("-", rest),
        None => ("", core),
    };

    let mut groups = digits.split(',');
    let mut joined = groups.next()?.to_string();
    if joined.is_empty() {
        return None;
    }
    for group in groups {
        let int_digits = group.split_once('.').map_or(group, |(int_part, _)| int_part);
        if int_digits.len() != 3 || !int_digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        joined.push_str(group);
    }

    Decimal::from_str(&format!("{sign}{joined}")).ok()
}
