use crate::errors::{AppError, AppResult};
use crate::models::{AdPerformanceRecord, Role, UploadAudit, User};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection, OptionalExtension, Row};
use rust_decimal::Decimal;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Mutex;
use tracing::debug;

const SCHEMA_SQL: &str = include_str!("schema.sql");

/// Owns all persisted state: imported performance rows, upload audit rows
/// and user accounts. Monetary columns are stored as TEXT and parsed into
/// `Decimal` on read so currency never round-trips through floats.
#[derive(Debug)]
pub struct Database {
    conn: Mutex<Connection>,
    db_path: PathBuf,
}

impl Database {
    pub fn new(path: &Path) -> AppResult<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|err| AppError::Io(err.to_string()))?;
        }
        let conn = Connection::open(path).map_err(AppError::from)?;
        conn.execute_batch(SCHEMA_SQL).map_err(AppError::from)?;

        Ok(Self {
            conn: Mutex::new(conn),
            db_path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.db_path
    }

    fn lock(&self) -> AppResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| AppError::Internal("database mutex poisoned".to_string()))
    }

    /// Records whose report window falls inside the optional bounds,
    /// optionally restricted to one ad-set. `start` bounds `report_start`,
    /// `end` bounds `report_end`.
    pub fn records_in_range(
        &self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
        ad_set: Option<&str>,
    ) -> AppResult<Vec<AdPerformanceRecord>> {
        let conn = self.lock()?;
        let mut query = String::from(
            "SELECT id, report_start, report_end, ad_set_name, delivery_status, bid_amount,
                    bid_type, budget_amount, budget_type, last_significant_change,
                    attribution_setting, results, result_indicator, reach, impressions,
                    cost_per_result, amount_spent, completion_status, campaign_start,
                    uploaded_at, uploaded_by_user_id
             FROM ad_performance WHERE 1 = 1",
        );

        let mut params_vec: Vec<String> = Vec::new();
        if let Some(start) = start {
            query.push_str(" AND report_start >= ?");
            params_vec.push(start.format("%Y-%m-%d").to_string());
        }
        if let Some(end) = end {
            query.push_str(" AND report_end <= ?");
            params_vec.push(end.format("%Y-%m-%d").to_string());
        }
        if let Some(ad_set) = ad_set {
            query.push_str(" AND ad_set_name = ?");
            params_vec.push(ad_set.to_string());
        }
        query.push_str(" ORDER BY report_start, id");

        let mut statement = conn.prepare(&query)?;
        let dyn_params: Vec<&dyn rusqlite::ToSql> = params_vec
            .iter()
            .map(|param| param as &dyn rusqlite::ToSql)
            .collect();
        let rows = statement.query_map(dyn_params.as_slice(), record_from_row)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    pub fn all_records(&self) -> AppResult<Vec<AdPerformanceRecord>> {
        self.records_in_range(None, None, None)
    }

    pub fn all_ad_set_names(&self) -> AppResult<Vec<String>> {
        let conn = self.lock()?;
        let mut statement =
            conn.prepare("SELECT DISTINCT ad_set_name FROM ad_performance ORDER BY ad_set_name")?;
        let rows = statement.query_map([], |row| row.get::<_, String>(0))?;
        let mut names = Vec::new();
        for row in rows {
            names.push(row?);
        }
        Ok(names)
    }

    pub fn last_upload_timestamp(&self) -> AppResult<Option<DateTime<Utc>>> {
        let conn = self.lock()?;
        let value: Option<DateTime<Utc>> = conn
            .query_row(
                "SELECT uploaded_at FROM upload_audit ORDER BY uploaded_at DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .optional()?;
        Ok(value)
    }

    /// Inserts one upload's records in a single transaction, stamping
    /// `uploaded_at` on every row. Returns the inserted count.
    pub fn bulk_insert(&self, records: &[AdPerformanceRecord]) -> AppResult<i64> {
        if records.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let now = Utc::now();
        let tx = conn.transaction()?;
        {
            let mut statement = tx.prepare(
                "INSERT INTO ad_performance (
                   report_start, report_end, ad_set_name, delivery_status, bid_amount,
                   bid_type, budget_amount, budget_type, last_significant_change,
                   attribution_setting, results, result_indicator, reach, impressions,
                   cost_per_result, amount_spent, completion_status, campaign_start,
                   uploaded_at, uploaded_by_user_id
                 ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
            )?;
            for record in records {
                statement.execute(params![
                    record.report_start.format("%Y-%m-%d").to_string(),
                    record.report_end.format("%Y-%m-%d").to_string(),
                    record.ad_set_name,
                    record.delivery_status,
                    record.bid_amount,
                    record.bid_type,
                    record.budget_amount.map(|value| value.to_string()),
                    record.budget_type,
                    record
                        .last_significant_change
                        .map(|value| value.format("%Y-%m-%dT%H:%M:%S").to_string()),
                    record.attribution_setting,
                    record.results,
                    record.result_indicator,
                    record.reach,
                    record.impressions,
                    record.cost_per_result.map(|value| value.to_string()),
                    record.amount_spent.map(|value| value.to_string()),
                    record.completion_status,
                    record
                        .campaign_start
                        .map(|value| value.format("%Y-%m-%d").to_string()),
                    now.to_rfc3339(),
                    record.uploaded_by_user_id,
                ])?;
            }
        }
        tx.commit()?;

        debug!(count = records.len(), "bulk insert committed");
        Ok(records.len() as i64)
    }

    pub fn insert_audit(
        &self,
        file_name: &str,
        uploaded_by_user_id: Option<i64>,
        records_processed: Option<i64>,
        status: &str,
    ) -> AppResult<UploadAudit> {
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO upload_audit (file_name, uploaded_by_user_id, uploaded_at, records_processed, status)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                file_name,
                uploaded_by_user_id,
                now.to_rfc3339(),
                records_processed,
                status
            ],
        )?;

        Ok(UploadAudit {
            id: conn.last_insert_rowid(),
            file_name: file_name.to_string(),
            uploaded_by_user_id,
            uploaded_at: now,
            records_processed,
            status: status.to_string(),
        })
    }

    pub fn list_audits(&self) -> AppResult<Vec<UploadAudit>> {
        let conn = self.lock()?;
        let mut statement = conn.prepare(
            "SELECT id, file_name, uploaded_by_user_id, uploaded_at, records_processed, status
             FROM upload_audit ORDER BY uploaded_at DESC, id DESC",
        )?;
        let rows = statement.query_map([], |row| {
            Ok(UploadAudit {
                id: row.get(0)?,
                file_name: row.get(1)?,
                uploaded_by_user_id: row.get(2)?,
                uploaded_at: row.get(3)?,
                records_processed: row.get(4)?,
                status: row.get(5)?,
            })
        })?;
        let mut audits = Vec::new();
        for row in rows {
            audits.push(row?);
        }
        Ok(audits)
    }

    pub fn insert_user(
        &self,
        username: &str,
        email: &str,
        password_hash: &str,
        role: Role,
    ) -> AppResult<User> {
        let now = Utc::now();
        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO users (username, email, password_hash, role, created_at, is_active)
             VALUES (?1, ?2, ?3, ?4, ?5, 1)",
            params![username, email, password_hash, role.as_str(), now.to_rfc3339()],
        )?;

        Ok(User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            email: email.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at: now,
            last_login: None,
            is_active: true,
        })
    }

    pub fn user_by_username(&self, username: &str) -> AppResult<Option<User>> {
        self.user_by("username", username)
    }

    pub fn user_by_email(&self, email: &str) -> AppResult<Option<User>> {
        self.user_by("email", email)
    }

    pub fn user_by_id(&self, id: i64) -> AppResult<Option<User>> {
        let conn = self.lock()?;
        let user = conn
            .query_row(
                "SELECT id, username, email, password_hash, role, created_at, last_login, is_active
                 FROM users WHERE id = ?1",
                [id],
                user_from_row,
            )
            .optional()?;
        Ok(user)
    }

    fn user_by(&self, column: &str, value: &str) -> AppResult<Option<User>> {
        let conn = self.lock()?;
        let query = format!(
            "SELECT id, username, email, password_hash, role, created_at, last_login, is_active
             FROM users WHERE {column} = ?1"
        );
        let user = conn.query_row(&query, [value], user_from_row).optional()?;
        Ok(user)
    }

    pub fn touch_last_login(&self, user_id: i64) -> AppResult<()> {
        let conn = self.lock()?;
        conn.execute(
            "UPDATE users SET last_login = ?1 WHERE id = ?2",
            params![Utc::now().to_rfc3339(), user_id],
        )?;
        Ok(())
    }

    pub fn set_user_active(&self, user_id: i64, is_active: bool) -> AppResult<()> {
        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE users SET is_active = ?1 WHERE id = ?2",
            params![is_active as i64, user_id],
        )?;
        if changed == 0 {
            return Err(AppError::NotFound(format!("user {user_id} not found")));
        }
        Ok(())
    }
}

fn record_from_row(row: &Row<'_>) -> rusqlite::Result<AdPerformanceRecord> {
    Ok(AdPerformanceRecord {
        id: row.get(0)?,
        report_start: parse_date_column(row, 1)?,
        report_end: parse_date_column(row, 2)?,
        ad_set_name: row.get(3)?,
        delivery_status: row.get(4)?,
        bid_amount: row.get(5)?,
        bid_type: row.get(6)?,
        budget_amount: parse_decimal_column(row, 7)?,
        budget_type: row.get(8)?,
        last_significant_change: row
            .get::<_, Option<String>>(9)?
            .and_then(|value| {
                chrono::NaiveDateTime::parse_from_str(&value, "%Y-%m-%dT%H:%M:%S").ok()
            }),
        attribution_setting: row.get(10)?,
        results: row.get(11)?,
        result_indicator: row.get(12)?,
        reach: row.get(13)?,
        impressions: row.get(14)?,
        cost_per_result: parse_decimal_column(row, 15)?,
        amount_spent: parse_decimal_column(row, 16)?,
        completion_status: row.get(17)?,
        campaign_start: row
            .get::<_, Option<String>>(18)?
            .and_then(|value| NaiveDate::parse_from_str(&value, "%Y-%m-%d").ok()),
        uploaded_at: Some(row.get(19)?),
        uploaded_by_user_id: row.get(20)?,
    })
}

fn parse_date_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<NaiveDate> {
    let value: String = row.get(idx)?;
    NaiveDate::parse_from_str(&value, "%Y-%m-%d").map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(
            idx,
            rusqlite::types::Type::Text,
            Box::new(err),
        )
    })
}

fn parse_decimal_column(row: &Row<'_>, idx: usize) -> rusqlite::Result<Option<Decimal>> {
    let value: Option<String> = row.get(idx)?;
    Ok(value.and_then(|text| Decimal::from_str(&text).ok()))
}

fn user_from_row(row: &Row<'_>) -> rusqlite::Result<User> {
    let role_text: String = row.get(4)?;
    Ok(User {
        id: row.get(0)?,
        username: row.get(1)?,
        email: row.get(2)?,
        password_hash: row.get(3)?,
        role: Role::parse(&role_text).unwrap_or(Role::Viewer),
        created_at: row.get(5)?,
        last_login: row.get(6)?,
        is_active: row.get::<_, i64>(7)? != 0,
    })
}

#[cfg(test)]
mod tests {
    use super::Database;
    use crate::models::{AdPerformanceRecord, Role};
    use chrono::NaiveDate;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    fn date(year: i32, month: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(year, month, day).unwrap()
    }

    fn record(start: NaiveDate, end: NaiveDate, ad_set: &str, spent: &str) -> AdPerformanceRecord {
        let mut record = AdPerformanceRecord::new(start, end, ad_set);
        record.amount_spent = Some(Decimal::from_str(spent).unwrap());
        record
    }

    #[test]
    fn bulk_insert_stamps_uploaded_at_and_round_trips() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let records = vec![
            record(date(2024, 1, 1), date(2024, 1, 31), "Set A", "100.50"),
            record(date(2024, 2, 1), date(2024, 2, 29), "Set B", "50.25"),
        ];
        let count = db.bulk_insert(&records).expect("insert");
        assert_eq!(count, 2);

        let loaded = db.all_records().expect("read back");
        assert_eq!(loaded.len(), 2);
        assert!(loaded.iter().all(|record| record.uploaded_at.is_some()));
        assert_eq!(
            loaded[0].amount_spent,
            Some(Decimal::from_str("100.50").unwrap())
        );
    }

    #[test]
    fn bulk_insert_of_nothing_is_a_no_op() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        assert_eq!(db.bulk_insert(&[]).expect("insert"), 0);
        assert!(db.all_records().expect("read").is_empty());
    }

    #[test]
    fn range_query_filters_by_window_and_ad_set() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.bulk_insert(&[
            record(date(2024, 1, 1), date(2024, 1, 31), "Set A", "1.00"),
            record(date(2024, 3, 1), date(2024, 3, 31), "Set A", "2.00"),
            record(date(2024, 3, 1), date(2024, 3, 31), "Set B", "4.00"),
        ])
        .expect("insert");

        let march = db
            .records_in_range(Some(date(2024, 2, 1)), None, None)
            .expect("query");
        assert_eq!(march.len(), 2);

        let march_b = db
            .records_in_range(Some(date(2024, 2, 1)), None, Some("Set B"))
            .expect("query");
        assert_eq!(march_b.len(), 1);
        assert_eq!(march_b[0].ad_set_name, "Set B");

        let january = db
            .records_in_range(None, Some(date(2024, 2, 1)), None)
            .expect("query");
        assert_eq!(january.len(), 1);
        assert_eq!(january[0].ad_set_name, "Set A");
    }

    #[test]
    fn ad_set_names_are_distinct() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        db.bulk_insert(&[
            record(date(2024, 1, 1), date(2024, 1, 31), "Set A", "1.00"),
            record(date(2024, 2, 1), date(2024, 2, 29), "Set A", "2.00"),
            record(date(2024, 2, 1), date(2024, 2, 29), "Set B", "3.00"),
        ])
        .expect("insert");

        assert_eq!(db.all_ad_set_names().expect("names"), vec!["Set A", "Set B"]);
    }

    #[test]
    fn audit_rows_drive_last_upload_timestamp() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        assert!(db.last_upload_timestamp().expect("empty").is_none());

        let audit = db
            .insert_audit("report.csv", Some(7), Some(42), "Completed")
            .expect("audit");
        assert_eq!(audit.records_processed, Some(42));

        let last = db.last_upload_timestamp().expect("some");
        assert_eq!(last, Some(audit.uploaded_at));
        assert_eq!(db.list_audits().expect("list").len(), 1);
    }

    #[test]
    fn user_round_trip_and_last_login() {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");

        let user = db
            .insert_user("ana", "ana@example.com", "hash", Role::Admin)
            .expect("insert user");
        assert!(user.is_active);
        assert!(user.last_login.is_none());

        db.touch_last_login(user.id).expect("touch");
        let loaded = db
            .user_by_username("ana")
            .expect("query")
            .expect("user exists");
        assert_eq!(loaded.id, user.id);
        assert_eq!(loaded.role, Role::Admin);
        assert!(loaded.last_login.is_some());

        let by_email = db.user_by_email("ana@example.com").expect("query");
        assert!(by_email.is_some());
    }
}
