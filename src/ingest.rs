use crate::db::Database;
use crate::errors::AppResult;
use crate::models::{AdPerformanceRecord, ImportOutcome};
use crate::parser;
use tracing::{error, info, warn};

/// Imports uploaded performance exports: parse, persist, record one audit
/// row per attempt that reaches persistence.
pub struct ImportService<'a> {
    db: &'a Database,
}

impl<'a> ImportService<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Runs one upload through the pipeline and reports the outcome the
    /// upload screen renders inline. Never returns an error: every failure
    /// is folded into the outcome message.
    ///
    /// Audit policy: precondition failures and zero-extracted-rows write no
    /// audit row; once persistence is attempted, exactly one audit row is
    /// written ("Completed" with the count, or "Error: <detail>" with 0).
    pub fn import_csv(
        &self,
        bytes: &[u8],
        file_name: &str,
        uploader_id: Option<i64>,
    ) -> ImportOutcome {
        if bytes.is_empty() {
            warn!(file_name, "rejected empty upload");
            return ImportOutcome::failure("The selected file is empty.");
        }
        if !has_csv_extension(file_name) {
            warn!(file_name, "rejected upload with unsupported extension");
            return ImportOutcome::failure("The file must be a CSV export.");
        }

        info!(file_name, size = bytes.len(), "starting CSV import");

        let text = String::from_utf8_lossy(bytes);
        let batch = match parser::parse_report(&text) {
            Ok(batch) => batch,
            Err(err) => {
                // Header-level failure happens before any persistence
                // attempt, so it follows the no-data audit policy.
                warn!(file_name, error = %err, "report could not be parsed");
                return ImportOutcome::failure(format!(
                    "No data could be extracted from the CSV file: {err}"
                ));
            }
        };

        if !batch.skipped.is_empty() {
            warn!(
                file_name,
                skipped = batch.skipped.len(),
                "some rows were dropped during parsing"
            );
        }

        if batch.records.is_empty() {
            warn!(file_name, "no records survived parsing");
            return ImportOutcome::failure(
                "No data could be extracted from the CSV file. Check the format.",
            );
        }

        let mut records = batch.records;
        for record in &mut records {
            record.uploaded_by_user_id = uploader_id;
        }

        match self.persist(&records, file_name, uploader_id) {
            Ok(count) => {
                info!(file_name, count, "import completed");
                ImportOutcome {
                    success: true,
                    message: format!("Imported {count} records successfully."),
                    records_processed: count,
                }
            }
            Err(err) => {
                error!(file_name, error = %err, "import failed during persistence");
                let detail = err.to_string();
                if let Err(audit_err) =
                    self.db
                        .insert_audit(file_name, uploader_id, Some(0), &format!("Error: {detail}"))
                {
                    // Best effort only; the original failure is the one
                    // reported to the user.
                    error!(file_name, error = %audit_err, "failed to record upload failure");
                }
                ImportOutcome::failure(format!("Failed to import the file: {detail}"))
            }
        }
    }

    fn persist(
        &self,
        records: &[AdPerformanceRecord],
        file_name: &str,
        uploader_id: Option<i64>,
    ) -> AppResult<i64> {
        let count = self.db.bulk_insert(records)?;
        self.db
            .insert_audit(file_name, uploader_id, Some(count), "Completed")?;
        Ok(count)
    }
}

fn has_csv_extension(file_name: &str) -> bool {
    std::path::Path::new(file_name)
        .extension()
        .map(|ext| ext.eq_ignore_ascii_case("csv"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::{has_csv_extension, ImportService};
    use crate::db::Database;
    use tempfile::TempDir;

    const HEADER: &str = "Inicio del informe,Fin del informe,Nombre del conjunto de anuncios,Importe gastado (USD),Alcance,Impresiones,Resultados";

    fn test_db() -> (TempDir, Database) {
        let dir = tempfile::tempdir().expect("tempdir");
        let db = Database::new(&dir.path().join("test.db")).expect("db");
        (dir, db)
    }

    #[test]
    fn well_formed_upload_persists_and_audits() {
        let (_dir, db) = test_db();
        let service = ImportService::new(&db);

        let csv = format!(
            "{HEADER}\n2024-01-01,2024-01-31,Set A,100.00,2000,5000,10\n2024-02-01,2024-02-29,Set B,50.00,1000,2500,5\n"
        );
        let outcome = service.import_csv(csv.as_bytes(), "report.csv", Some(3));

        assert!(outcome.success);
        assert_eq!(outcome.records_processed, 2);
        assert!(outcome.message.contains("2"));

        let records = db.all_records().expect("records");
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|record| record.uploaded_by_user_id == Some(3)));

        let audits = db.list_audits().expect("audits");
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].status, "Completed");
        assert_eq!(audits[0].records_processed, Some(2));
        assert_eq!(audits[0].uploaded_by_user_id, Some(3));
    }

    #[test]
    fn rows_missing_required_fields_are_dropped_from_the_count() {
        let (_dir, db) = test_db();
        let service = ImportService::new(&db);

        let mut csv = String::from(HEADER);
        for _ in 0..97 {
            csv.push_str("\n2024-01-01,2024-01-31,Set A,1.00,1,1,1");
        }
        for _ in 0..3 {
            csv.push_str("\n2024-01-01,2024-01-31,,1.00,1,1,1");
        }
        let outcome = service.import_csv(csv.as_bytes(), "report.csv", None);

        assert!(outcome.success);
        assert_eq!(outcome.records_processed, 97);
        assert_eq!(db.all_records().expect("records").len(), 97);

        let audits = db.list_audits().expect("audits");
        assert_eq!(audits.len(), 1);
        assert_eq!(audits[0].status, "Completed");
        assert_eq!(audits[0].records_processed, Some(97));
    }

    #[test]
    fn empty_file_fails_without_an_audit_row() {
        let (_dir, db) = test_db();
        let service = ImportService::new(&db);

        let outcome = service.import_csv(b"", "report.csv", Some(1));

        assert!(!outcome.success);
        assert_eq!(outcome.records_processed, 0);
        assert!(db.list_audits().expect("audits").is_empty());
        assert!(db.all_records().expect("records").is_empty());
    }

    #[test]
    fn wrong_extension_fails_without_an_audit_row() {
        let (_dir, db) = test_db();
        let service = ImportService::new(&db);

        let outcome = service.import_csv(b"anything", "report.xlsx", Some(1));

        assert!(!outcome.success);
        assert!(outcome.message.contains("CSV"));
        assert!(db.list_audits().expect("audits").is_empty());
    }

    #[test]
    fn all_rows_invalid_behaves_like_the_empty_file() {
        let (_dir, db) = test_db();
        let service = ImportService::new(&db);

        let csv = format!(
            "{HEADER}\nbad,2024-01-31,Set A,1.00,1,1,1\n2024-01-01,bad,Set B,1.00,1,1,1\n"
        );
        let outcome = service.import_csv(csv.as_bytes(), "report.csv", Some(1));

        assert!(!outcome.success);
        assert_eq!(outcome.records_processed, 0);
        assert!(outcome.message.contains("No data could be extracted"));
        assert!(db.list_audits().expect("audits").is_empty());
        assert!(db.all_records().expect("records").is_empty());
    }

    #[test]
    fn persistence_failure_writes_one_error_audit_row() {
        let (_dir, db) = test_db();

        // Break the data table from a second connection so the bulk insert
        // fails while the audit table stays writable.
        let raw = rusqlite::Connection::open(db.path()).expect("open raw connection");
        raw.execute_batch("DROP TABLE ad_performance;").expect("drop table");
        drop(raw);

        let service = ImportService::new(&db);
        let csv = format!("{HEADER}\n2024-01-01,2024-01-31,Set A,1.00,1,1,1\n");
        let outcome = service.import_csv(csv.as_bytes(), "report.csv", Some(5));

        assert!(!outcome.success);
        assert_eq!(outcome.records_processed, 0);
        assert!(outcome.message.contains("no such table"));

        let audits = db.list_audits().expect("audits");
        assert_eq!(audits.len(), 1);
        assert!(audits[0].status.starts_with("Error: "));
        assert!(audits[0].status.contains("no such table"));
        assert_eq!(audits[0].records_processed, Some(0));
        assert_eq!(audits[0].uploaded_by_user_id, Some(5));
    }

    #[test]
    fn extension_check_is_case_insensitive() {
        assert!(has_csv_extension("Report.CSV"));
        assert!(has_csv_extension("export.csv"));
        assert!(!has_csv_extension("export.tsv"));
        assert!(!has_csv_extension("noextension"));
    }
}
