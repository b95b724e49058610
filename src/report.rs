//! Repair report.
//!
//! Every stage appends timestamped actions and errors to a [`RepairReport`].
//! The report is written once at the end of a run; [`RepairReport::finish`]
//! consumes it and hands back a [`FinalReport`] that can only be read.

use crate::error::{ErrorKind, Result};
use chrono::{SecondsFormat, Utc};
use serde::Serialize;
use std::ops::Deref;
use std::path::{Path, PathBuf};

/// Number of trailing actions carried in a [`RepairSummary`].
pub const SUMMARY_ACTIONS: usize = 5;

/// What an action recorded on the report did.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum ActionKind {
    BackupCreated,
    ScratchCreated,
    Extracted,
    MetadataSkipped,
    MetadataRewritten,
    MetadataFieldInserted,
    MetadataNormalized,
    MetadataSynthesized,
    PartMissing,
    PartSanitized,
    PartUnrecoverable,
    SanitizeSkipped,
    CustomXmlQuarantined,
    ReferencesPruned,
    Rebuilt,
    ValidationStarted,
    ValidationPassed,
    FallbackStarted,
    ConverterFound,
    Converting,
    FallbackSucceeded,
    ReportSaved,
}

/// A timestamped log line.
///
/// The kind is kept in memory for comparisons but is not part of the
/// persisted schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entry<K> {
    pub time: String,
    pub msg: String,
    #[serde(skip)]
    pub kind: K,
}

impl<K> Entry<K> {
    fn now(kind: K, msg: String) -> Self {
        Self {
            time: now_timestamp(),
            msg,
            kind,
        }
    }
}

/// Current UTC time, ISO-8601 with microseconds.
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Append-only log of one repair run.
#[derive(Debug, Clone, Serialize)]
pub struct RepairReport {
    input_path: String,
    backup_path: Option<String>,
    timestamp: String,
    actions: Vec<Entry<ActionKind>>,
    errors: Vec<Entry<ErrorKind>>,
    final_docx: Option<String>,
    final_docx_ok: Option<bool>,
}

impl RepairReport {
    /// Start a report for `input`.
    pub fn new(input: &Path) -> Self {
        Self {
            input_path: input.display().to_string(),
            backup_path: None,
            timestamp: now_timestamp(),
            actions: Vec::new(),
            errors: Vec::new(),
            final_docx: None,
            final_docx_ok: None,
        }
    }

    /// Record an action.
    pub fn add_action(&mut self, kind: ActionKind, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::info!(kind = ?kind, "{}", msg);
        self.actions.push(Entry::now(kind, msg));
    }

    /// Record an error.
    pub fn add_error(&mut self, kind: ErrorKind, msg: impl Into<String>) {
        let msg = msg.into();
        tracing::error!(kind = %kind, "{}", msg);
        self.errors.push(Entry::now(kind, msg));
    }

    pub fn set_backup_path(&mut self, path: &Path) {
        self.backup_path = Some(path.display().to_string());
    }

    pub fn set_final_docx(&mut self, path: &Path) {
        self.final_docx = Some(path.display().to_string());
    }

    pub fn set_final_docx_ok(&mut self, ok: bool) {
        self.final_docx_ok = Some(ok);
    }

    pub fn input_path(&self) -> &str {
        &self.input_path
    }

    pub fn backup_path(&self) -> Option<&str> {
        self.backup_path.as_deref()
    }

    pub fn timestamp(&self) -> &str {
        &self.timestamp
    }

    pub fn actions(&self) -> &[Entry<ActionKind>] {
        &self.actions
    }

    pub fn errors(&self) -> &[Entry<ErrorKind>] {
        &self.errors
    }

    pub fn final_docx(&self) -> Option<&str> {
        self.final_docx.as_deref()
    }

    pub fn final_docx_ok(&self) -> Option<bool> {
        self.final_docx_ok
    }

    /// Kinds of all recorded actions, in order.
    pub fn action_kinds(&self) -> Vec<ActionKind> {
        self.actions.iter().map(|a| a.kind).collect()
    }

    /// Kinds of all recorded errors, in order.
    pub fn error_kinds(&self) -> Vec<ErrorKind> {
        self.errors.iter().map(|e| e.kind).collect()
    }

    /// Whether any action of `kind` was recorded.
    pub fn has_action(&self, kind: ActionKind) -> bool {
        self.actions.iter().any(|a| a.kind == kind)
    }

    /// Pretty JSON in the persisted schema.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn save(&self, path: &Path) -> Result<()> {
        let json = self.to_json().map_err(std::io::Error::other)?;
        std::fs::write(path, json)?;
        Ok(())
    }

    /// Persist the report to `path` and freeze it.
    ///
    /// The file holds everything recorded so far. The outcome of the save
    /// itself is only kept in memory.
    pub fn finish(mut self, path: &Path) -> FinalReport {
        let saved_to = match self.save(path) {
            Ok(()) => {
                self.add_action(
                    ActionKind::ReportSaved,
                    format!("Saved repair report to {}", path.display()),
                );
                Some(path.to_path_buf())
            }
            Err(e) => {
                self.add_error(
                    ErrorKind::Io,
                    format!("Failed to save repair report to {}: {}", path.display(), e),
                );
                None
            }
        };
        FinalReport {
            report: self,
            saved_to,
        }
    }

    /// Freeze the report without writing it anywhere.
    pub fn unsaved(self) -> FinalReport {
        FinalReport {
            report: self,
            saved_to: None,
        }
    }
}

/// A report that has been persisted (or deliberately not) and can no longer
/// change.
#[derive(Debug, Clone)]
pub struct FinalReport {
    report: RepairReport,
    saved_to: Option<PathBuf>,
}

impl FinalReport {
    /// Where the report file was written, if it was.
    pub fn saved_to(&self) -> Option<&Path> {
        self.saved_to.as_deref()
    }

    /// Condensed view for printing.
    pub fn summary(&self) -> RepairSummary {
        let actions = &self.report.actions;
        let tail = actions.len().saturating_sub(SUMMARY_ACTIONS);
        RepairSummary {
            input: self.report.input_path.clone(),
            backup: self.report.backup_path.clone(),
            final_docx: self.report.final_docx.clone(),
            ok: self.report.final_docx_ok,
            errors: self.report.errors.clone(),
            actions: actions[tail..].to_vec(),
        }
    }
}

impl Deref for FinalReport {
    type Target = RepairReport;

    fn deref(&self) -> &RepairReport {
        &self.report
    }
}

/// Summary printed after a run: all errors and the last few actions.
#[derive(Debug, Clone, Serialize)]
pub struct RepairSummary {
    pub input: String,
    pub backup: Option<String>,
    #[serde(rename = "final")]
    pub final_docx: Option<String>,
    pub ok: Option<bool>,
    pub errors: Vec<Entry<ErrorKind>>,
    pub actions: Vec<Entry<ActionKind>>,
}

impl RepairSummary {
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_schema() {
        let mut report = RepairReport::new(Path::new("in.docx"));
        report.add_action(ActionKind::Extracted, "Extracted docx zip to temp dir");
        report.add_error(ErrorKind::PartParseError, "bad part");
        report.set_final_docx(Path::new("in.repaired.docx"));
        report.set_final_docx_ok(false);

        let value: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();
        let keys: Vec<&str> = value.as_object().unwrap().keys().map(|k| k.as_str()).collect();
        for key in [
            "input_path",
            "backup_path",
            "timestamp",
            "actions",
            "errors",
            "final_docx",
            "final_docx_ok",
        ] {
            assert!(keys.contains(&key), "missing {}", key);
        }
        assert_eq!(value["backup_path"], serde_json::Value::Null);
        assert_eq!(value["actions"][0]["msg"], "Extracted docx zip to temp dir");
        assert!(value["actions"][0].get("kind").is_none());
        assert!(value["errors"][0]["time"].as_str().unwrap().ends_with('Z'));
        assert_eq!(value["final_docx_ok"], false);
    }

    #[test]
    fn test_finish_persists_then_freezes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("in.repair_report.json");

        let mut report = RepairReport::new(Path::new("in.docx"));
        report.add_action(ActionKind::Rebuilt, "Rebuilt docx");
        let done = report.finish(&path);

        assert_eq!(done.saved_to(), Some(path.as_path()));
        assert_eq!(
            done.action_kinds(),
            vec![ActionKind::Rebuilt, ActionKind::ReportSaved]
        );

        let saved: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(saved["actions"].as_array().unwrap().len(), 1);
    }

    #[test]
    fn test_finish_records_save_failure() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("report.json");

        let done = RepairReport::new(Path::new("in.docx")).finish(&path);
        assert!(done.saved_to().is_none());
        assert_eq!(done.error_kinds(), vec![ErrorKind::Io]);
    }

    #[test]
    fn test_summary_keeps_last_actions() {
        let mut report = RepairReport::new(Path::new("in.docx"));
        for i in 0..8 {
            report.add_action(ActionKind::PartSanitized, format!("step {}", i));
        }
        let summary = report.unsaved().summary();
        assert_eq!(summary.actions.len(), SUMMARY_ACTIONS);
        assert_eq!(summary.actions[0].msg, "step 3");

        let json: serde_json::Value = serde_json::from_str(&summary.to_json().unwrap()).unwrap();
        assert!(json.get("final").is_some());
        assert!(json.get("final_docx").is_none());
    }
}
