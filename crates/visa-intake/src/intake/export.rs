use std::collections::BTreeSet;
use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use tracing::info;

use super::domain::Submission;

const LEADING_COLUMNS: [&str; 3] = ["booking_reference", "status", "rejected_fields"];
const REJECTED_FIELDS_SEPARATOR: &str = ", ";
pub const LEDGER_HEADER: [&str; 4] = ["Booking Number", "User Name", "Document Type", "Status"];

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error("no submissions to export")]
    NoData,
    #[error("failed to render csv: {0}")]
    Csv(#[from] csv::Error),
    #[error("failed to finish csv buffer: {0}")]
    Buffer(String),
}

/// Flattens submissions into CSV bytes.
///
/// Columns are `booking_reference,status,rejected_fields` followed by the
/// sorted union of every field key present; missing values are empty cells.
/// Field keys that shadow a leading column are not repeated.
pub fn export_csv(submissions: &[Submission]) -> Result<Vec<u8>, ExportError> {
    if submissions.is_empty() {
        return Err(ExportError::NoData);
    }

    let field_columns: BTreeSet<&str> = submissions
        .iter()
        .flat_map(|submission| submission.fields.keys())
        .filter(|key| !LEADING_COLUMNS.contains(key))
        .collect();

    let mut writer = csv::WriterBuilder::new()
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    writer.write_record(LEADING_COLUMNS.iter().copied().chain(field_columns.iter().copied()))?;

    for submission in submissions {
        let rejected = submission.rejected_fields.join(REJECTED_FIELDS_SEPARATOR);
        let leading = [
            submission.booking_reference.as_str(),
            submission.status.label(),
            rejected.as_str(),
        ];
        let values = field_columns
            .iter()
            .map(|column| submission.fields.get(column).unwrap_or(""));
        writer.write_record(leading.into_iter().chain(values))?;
    }

    writer
        .into_inner()
        .map_err(|err| ExportError::Buffer(err.error().to_string()))
}

/// One externally computed per-document status row.
///
/// Cells accept any JSON scalar: numbers and booleans are written as their
/// JSON text, `null` or a missing key as an empty cell.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SummaryRow {
    #[serde(default, deserialize_with = "cell_text")]
    pub booking: String,
    #[serde(default, deserialize_with = "cell_text")]
    pub name: String,
    #[serde(default, rename = "docType", deserialize_with = "cell_text")]
    pub doc_type: String,
    #[serde(default, deserialize_with = "cell_text")]
    pub status: String,
}

fn cell_text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Value::deserialize(deserializer)? {
        Value::Null => String::new(),
        Value::String(text) => text,
        other => other.to_string(),
    })
}

#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("ledger io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to render ledger rows: {0}")]
    Csv(#[from] csv::Error),
    #[error("ledger gate poisoned")]
    Poisoned,
}

/// Append-only CSV file with a fixed header written once at creation.
#[derive(Debug)]
pub struct SummaryLedger {
    path: PathBuf,
    gate: Mutex<()>,
}

impl SummaryLedger {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, LedgerError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let ledger = Self {
            path,
            gate: Mutex::new(()),
        };
        ledger.ensure_header()?;
        Ok(ledger)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Appends rows without reading existing content. Values are quoted only
    /// when they contain a comma, quote, or line break.
    pub fn append(&self, rows: &[SummaryRow]) -> Result<(), LedgerError> {
        let _guard = self.gate.lock().map_err(|_| LedgerError::Poisoned)?;
        self.ensure_header()?;

        let mut buffer = csv::WriterBuilder::new()
            .has_headers(false)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());
        for row in rows {
            buffer.write_record([
                row.booking.as_str(),
                row.name.as_str(),
                row.doc_type.as_str(),
                row.status.as_str(),
            ])?;
        }
        let bytes = buffer
            .into_inner()
            .map_err(|err| LedgerError::Io(std::io::Error::other(err.error().to_string())))?;

        let mut file = OpenOptions::new().append(true).open(&self.path)?;
        file.write_all(&bytes)?;
        file.sync_all()?;
        info!(rows = rows.len(), "summary ledger appended");
        Ok(())
    }

    fn ensure_header(&self) -> Result<(), LedgerError> {
        let needs_header = match fs::metadata(&self.path) {
            Ok(meta) => meta.len() == 0,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => true,
            Err(err) => return Err(err.into()),
        };
        if needs_header {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&self.path)?;
            writeln!(file, "{}", LEDGER_HEADER.join(","))?;
        }
        Ok(())
    }
}
