//! CSV ingestion and metrics-aggregation core for the ads performance
//! dashboard. The web layer hands uploads and filter parameters to this
//! crate and renders what comes back; it owns no domain logic of its own.

mod auth;
mod dashboard;
mod db;
mod errors;
mod format;
mod ingest;
mod models;
mod parser;

pub use auth::{authenticate, hash_password, register, verify_password};
pub use dashboard::{
    ad_set_chart_data, dashboard_data, monthly_chart_data, monthly_series, per_ad_set_series,
    summarize,
};
pub use db::Database;
pub use errors::{AppError, AppResult};
pub use format::FormatConfig;
pub use ingest::ImportService;
pub use models::{
    AdPerformanceRecord, AdSetSeries, DashboardAggregate, DashboardData, DashboardFilter,
    ImportOutcome, MonthlySeries, NewUser, ParseBatch, Role, RowOutcome, UploadAudit, User,
};
pub use parser::parse_report;

/// Installs the process-wide tracing subscriber. Respects `RUST_LOG`,
/// defaulting to `info`.
pub fn init_logging() -> Result<(), String> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .try_init()
        .map_err(|error| error.to_string())
}
