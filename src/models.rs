use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// One row of imported ad-set performance data. Required fields are the
/// report window and the ad-set name; everything else survives a failed
/// parse as `None` and is treated as zero during aggregation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdPerformanceRecord {
    #[serde(default)]
    pub id: i64,
    pub report_start: NaiveDate,
    pub report_end: NaiveDate,
    pub ad_set_name: String,
    pub delivery_status: Option<String>,
    pub bid_amount: Option<i64>,
    pub bid_type: Option<String>,
    pub budget_amount: Option<Decimal>,
    pub budget_type: Option<String>,
    pub last_significant_change: Option<NaiveDateTime>,
    pub attribution_setting: Option<String>,
    pub results: Option<i64>,
    pub result_indicator: Option<String>,
    pub reach: Option<i64>,
    pub impressions: Option<i64>,
    pub cost_per_result: Option<Decimal>,
    pub amount_spent: Option<Decimal>,
    pub completion_status: Option<String>,
    pub campaign_start: Option<NaiveDate>,
    /// Stamped by the data access layer at insert time, never by callers.
    pub uploaded_at: Option<DateTime<Utc>>,
    pub uploaded_by_user_id: Option<i64>,
}

impl AdPerformanceRecord {
    pub fn new(report_start: NaiveDate, report_end: NaiveDate, ad_set_name: impl Into<String>) -> Self {
        Self {
            id: 0,
            report_start,
            report_end,
            ad_set_name: ad_set_name.into(),
            delivery_status: None,
            bid_amount: None,
            bid_type: None,
            budget_amount: None,
            budget_type: None,
            last_significant_change: None,
            attribution_setting: None,
            results: None,
            result_indicator: None,
            reach: None,
            impressions: None,
            cost_per_result: None,
            amount_spent: None,
            completion_status: None,
            campaign_start: None,
            uploaded_at: None,
            uploaded_by_user_id: None,
        }
    }
}

/// Durable record of one upload attempt's outcome.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadAudit {
    pub id: i64,
    pub file_name: String,
    pub uploaded_by_user_id: Option<i64>,
    pub uploaded_at: DateTime<Utc>,
    pub records_processed: Option<i64>,
    pub status: String,
}

/// Outcome of one `import_csv` call, rendered inline on the upload screen.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImportOutcome {
    pub success: bool,
    pub message: String,
    pub records_processed: i64,
}

impl ImportOutcome {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            records_processed: 0,
        }
    }
}

/// Per-row parse result. Row-level failures are data, not errors: a row
/// missing a required field is skipped with a reason and the batch goes on.
#[derive(Debug, Clone)]
pub enum RowOutcome {
    Parsed(AdPerformanceRecord),
    Skipped { line: u64, reason: String },
}

/// Everything one parse pass produced, in input order.
#[derive(Debug, Clone, Default)]
pub struct ParseBatch {
    pub records: Vec<AdPerformanceRecord>,
    pub skipped: Vec<(u64, String)>,
}

/// Filter parameters handed in by the dashboard screen.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardFilter {
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub ad_set_name: Option<String>,
}

/// Computed, non-persisted summary metrics for one filter. All divisions
/// are guarded; an empty record set produces an all-zero aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardAggregate {
    pub total_spend: Decimal,
    pub total_reach: i64,
    pub total_impressions: i64,
    pub total_results: i64,
    pub avg_cost_per_result: Decimal,
    pub reach_over_impressions: Decimal,
    pub conversion_rate: Decimal,
    pub cost_per_thousand_impressions: Decimal,
    pub budget_by_ad_set: HashMap<String, Decimal>,
    pub spend_by_ad_set: HashMap<String, Decimal>,
}

impl Default for DashboardAggregate {
    fn default() -> Self {
        Self {
            total_spend: Decimal::ZERO,
            total_reach: 0,
            total_impressions: 0,
            total_results: 0,
            avg_cost_per_result: Decimal::ZERO,
            reach_over_impressions: Decimal::ZERO,
            conversion_rate: Decimal::ZERO,
            cost_per_thousand_impressions: Decimal::ZERO,
            budget_by_ad_set: HashMap::new(),
            spend_by_ad_set: HashMap::new(),
        }
    }
}

/// View-ready payload for the dashboard screen: the echoed filter, the
/// selectable ad-set names, the last upload timestamp and the aggregate.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardData {
    pub filter: DashboardFilter,
    pub available_ad_sets: Vec<String>,
    pub last_upload: Option<DateTime<Utc>>,
    pub aggregate: DashboardAggregate,
}

impl DashboardData {
    /// Fallback payload rendered with an error banner when retrieval fails.
    pub fn empty(filter: DashboardFilter) -> Self {
        Self {
            filter,
            available_ad_sets: Vec::new(),
            last_upload: None,
            aggregate: DashboardAggregate::default(),
        }
    }
}

/// Monthly chart series: metric name to twelve per-month sums, index 0 = January.
pub type MonthlySeries = BTreeMap<String, Vec<Decimal>>;

/// Per-ad-set chart series: metric name to ad-set-keyed sums.
pub type AdSetSeries = BTreeMap<String, HashMap<String, Decimal>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Role {
    Admin,
    Viewer,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Viewer => "viewer",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "admin" => Some(Self::Admin),
            "viewer" => Some(Self::Viewer),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub is_active: bool,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    pub role: Role,
}
