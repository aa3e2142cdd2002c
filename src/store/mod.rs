//! SQLite persistence for catalog scans.

use crate::model::ModelSummary;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use std::path::Path;

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS scans (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    case_dir TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS scan_cases (
    scan_id INTEGER NOT NULL REFERENCES scans(id),
    stem TEXT NOT NULL,
    summary_json TEXT,
    error TEXT,
    PRIMARY KEY (scan_id, stem)
);

CREATE INDEX IF NOT EXISTS idx_scan_cases_scan ON scan_cases(scan_id);
";

/// Outcome of loading one case during a scan.
#[derive(Debug, Clone)]
pub enum CaseOutcome {
    Loaded(Box<ModelSummary>),
    Failed { stem: String, error: String },
}

impl CaseOutcome {
    pub fn stem(&self) -> &str {
        match self {
            CaseOutcome::Loaded(s) => &s.case_name,
            CaseOutcome::Failed { stem, .. } => stem,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRow {
    pub id: i64,
    pub case_dir: String,
    pub created_at: String,
}

pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self, String> {
        let conn = Connection::open(path).map_err(|e| e.to_string())?;
        conn.execute_batch(SCHEMA).map_err(|e| e.to_string())?;
        Ok(Store { conn })
    }

    /// Write the scan row and all of its case rows in one transaction.
    pub fn insert_scan(&mut self, case_dir: &str, cases: &[CaseOutcome]) -> Result<i64, String> {
        let now: DateTime<Utc> = Utc::now();
        let created = now.to_rfc3339();
        let tx = self.conn.transaction().map_err(|e| e.to_string())?;
        tx.execute(
            "INSERT INTO scans (case_dir, created_at) VALUES (?1, ?2)",
            params![case_dir, created],
        )
        .map_err(|e| e.to_string())?;
        let id = tx.last_insert_rowid();
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO scan_cases (scan_id, stem, summary_json, error) VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(|e| e.to_string())?;
            for c in cases {
                let (json, error) = match c {
                    CaseOutcome::Loaded(s) => {
                        (Some(serde_json::to_string(s).map_err(|e| e.to_string())?), None)
                    }
                    CaseOutcome::Failed { error, .. } => (None, Some(error.as_str())),
                };
                stmt.execute(params![id, c.stem(), json, error])
                    .map_err(|e| e.to_string())?;
            }
        }
        tx.commit().map_err(|e| e.to_string())?;
        Ok(id)
    }

    /// Newest first.
    pub fn list_scans(&self) -> Result<Vec<ScanRow>, String> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, case_dir, created_at FROM scans ORDER BY id DESC")
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map([], |r| {
                Ok(ScanRow {
                    id: r.get(0)?,
                    case_dir: r.get(1)?,
                    created_at: r.get(2)?,
                })
            })
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row.map_err(|e| e.to_string())?);
        }
        Ok(out)
    }

    pub fn get_scan_cases(&self, scan_id: i64) -> Result<Vec<CaseOutcome>, String> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT stem, summary_json, error FROM scan_cases WHERE scan_id = ?1 ORDER BY stem",
            )
            .map_err(|e| e.to_string())?;
        let rows = stmt
            .query_map(params![scan_id], |r| {
                Ok((
                    r.get::<_, String>(0)?,
                    r.get::<_, Option<String>>(1)?,
                    r.get::<_, Option<String>>(2)?,
                ))
            })
            .map_err(|e| e.to_string())?;
        let mut out = Vec::new();
        for row in rows {
            let (stem, json, error) = row.map_err(|e| e.to_string())?;
            let outcome = match json {
                Some(json) => {
                    let s: ModelSummary = serde_json::from_str(&json).map_err(|e| e.to_string())?;
                    CaseOutcome::Loaded(Box::new(s))
                }
                None => CaseOutcome::Failed {
                    stem,
                    error: error.unwrap_or_default(),
                },
            };
            out.push(outcome);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn failed_cases_round_trip_through_store() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("scan.sqlite")).unwrap();
        let cases = vec![CaseOutcome::Failed {
            stem: "tank_run1_45-300-0".to_string(),
            error: "case not usable".to_string(),
        }];
        let id = store.insert_scan("/cases", &cases).unwrap();
        let scans = store.list_scans().unwrap();
        assert_eq!(scans.len(), 1);
        assert_eq!(scans[0].id, id);
        assert_eq!(scans[0].case_dir, "/cases");
        let back = store.get_scan_cases(id).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].stem(), "tank_run1_45-300-0");
        assert!(matches!(&back[0], CaseOutcome::Failed { error, .. } if error == "case not usable"));
    }

    #[test]
    fn failed_insert_leaves_no_partial_scan() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = Store::open(&dir.path().join("scan.sqlite")).unwrap();
        let failed = |stem: &str| CaseOutcome::Failed {
            stem: stem.to_string(),
            error: "case not usable".to_string(),
        };
        let cases = vec![failed("a_run1_45-300-0"), failed("b_run1_45-300-0"), failed("a_run1_45-300-0")];
        assert!(store.insert_scan("/cases", &cases).is_err());
        assert!(store.list_scans().unwrap().is_empty());
        let rows: i64 = store
            .conn
            .query_row("SELECT COUNT(*) FROM scan_cases", [], |r| r.get(0))
            .unwrap();
        assert_eq!(rows, 0);

        let id = store.insert_scan("/cases", &cases[..2]).unwrap();
        assert_eq!(store.get_scan_cases(id).unwrap().len(), 2);
    }
}
