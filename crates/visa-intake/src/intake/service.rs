use std::sync::Arc;

use serde_json::Value;
use tracing::{error, info, warn};

use super::attachments::{AttachmentError, AttachmentRegistry, UploadedFile};
use super::domain::{BookingReference, Submission, SubmissionFields, SubmissionStatus};
use super::export::{export_csv, ExportError, LedgerError, SummaryLedger, SummaryRow};
use super::reference::{next_submission_id, ReferenceGenerator, TimestampReferenceGenerator};
use super::repository::{RepositoryError, SubmissionRepository};

const MAX_REFERENCE_ATTEMPTS: usize = 5;

/// Service composing reference generation, the submission store, uploads,
/// and the CSV outputs.
pub struct IntakeService<R> {
    repository: Arc<R>,
    attachments: AttachmentRegistry,
    ledger: SummaryLedger,
    references: Box<dyn ReferenceGenerator>,
}

impl<R> IntakeService<R>
where
    R: SubmissionRepository + 'static,
{
    pub fn new(repository: Arc<R>, attachments: AttachmentRegistry, ledger: SummaryLedger) -> Self {
        Self::with_generator(
            repository,
            attachments,
            ledger,
            Box::new(TimestampReferenceGenerator),
        )
    }

    pub fn with_generator(
        repository: Arc<R>,
        attachments: AttachmentRegistry,
        ledger: SummaryLedger,
        references: Box<dyn ReferenceGenerator>,
    ) -> Self {
        Self {
            repository,
            attachments,
            ledger,
            references,
        }
    }

    pub fn attachments(&self) -> &AttachmentRegistry {
        &self.attachments
    }

    /// Store uploads, assign a booking reference, and persist a pending submission.
    /// When the record cannot be persisted its uploads are removed again.
    pub fn submit(
        &self,
        fields: SubmissionFields,
        files: Vec<UploadedFile>,
    ) -> Result<BookingReference, IntakeServiceError> {
        let files = self.attachments.register(files)?;
        let mut record = Submission::pending(
            next_submission_id(),
            self.references.generate(),
            fields,
            files,
        );

        match self.append_with_fresh_references(&mut record) {
            Ok(()) => {
                info!(
                    booking_reference = %record.booking_reference,
                    attachments = record.files.len(),
                    "submission stored"
                );
                Ok(record.booking_reference)
            }
            Err(err) => {
                self.attachments.discard(&record.files);
                Err(err.into())
            }
        }
    }

    fn append_with_fresh_references(&self, record: &mut Submission) -> Result<(), RepositoryError> {
        for attempt in 1..=MAX_REFERENCE_ATTEMPTS {
            match self.repository.append(record.clone()) {
                Ok(()) => return Ok(()),
                Err(RepositoryError::Conflict) if attempt < MAX_REFERENCE_ATTEMPTS => {
                    warn!(
                        booking_reference = %record.booking_reference,
                        attempt,
                        "booking reference collided, regenerating"
                    );
                    record.booking_reference = self.references.generate();
                }
                Err(err) => return Err(err),
            }
        }
        Err(RepositoryError::Conflict)
    }

    pub fn list_all(&self) -> Result<Vec<Submission>, IntakeServiceError> {
        Ok(self.repository.all()?)
    }

    pub fn lookup_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Submission, IntakeServiceError> {
        self.repository
            .find_by_reference(reference)?
            .ok_or(IntakeServiceError::NotFound)
    }

    pub fn lookup_by_id_number(&self, id_number: &str) -> Result<Submission, IntakeServiceError> {
        self.repository
            .find_by_id_number(id_number)?
            .ok_or(IntakeServiceError::NotFound)
    }

    /// Apply a reviewer decision. A blank or absent status keeps the current
    /// one; the rejected field list is always replaced (empty when absent).
    pub fn review(
        &self,
        reference: &BookingReference,
        status: Option<&str>,
        rejected_fields: Option<Vec<String>>,
    ) -> Result<Submission, IntakeServiceError> {
        let status = status.and_then(SubmissionStatus::parse);
        let updated = self.repository.update_status(
            reference,
            status,
            rejected_fields.unwrap_or_default(),
        )?;
        info!(
            booking_reference = %reference,
            status = %updated.status,
            rejected = updated.rejected_fields.len(),
            "submission reviewed"
        );
        Ok(updated)
    }

    pub fn export_csv(&self) -> Result<Vec<u8>, IntakeServiceError> {
        let submissions = self.repository.all()?;
        let bytes = export_csv(&submissions)?;
        info!(rows = submissions.len(), "submission export rendered");
        Ok(bytes)
    }

    pub fn append_summary(&self, rows: &[SummaryRow]) -> Result<(), IntakeServiceError> {
        self.ledger.append(rows)?;
        Ok(())
    }

    /// Validates a `{ "docs": [...] }` payload before appending it to the ledger.
    pub fn append_summary_payload(&self, payload: &Value) -> Result<usize, IntakeServiceError> {
        let rows = parse_summary_docs(payload)?;
        self.append_summary(&rows)?;
        Ok(rows.len())
    }
}

pub fn parse_summary_docs(payload: &Value) -> Result<Vec<SummaryRow>, IntakeServiceError> {
    let docs = match payload.get("docs") {
        Some(Value::Array(docs)) => docs,
        Some(_) => {
            return Err(IntakeServiceError::InvalidInput(
                "docs must be an array".to_string(),
            ))
        }
        None => return Err(IntakeServiceError::InvalidInput("docs is required".to_string())),
    };

    docs.iter()
        .map(|doc| {
            if !doc.is_object() {
                return Err(IntakeServiceError::InvalidInput(
                    "doc entries must be objects".to_string(),
                ));
            }
            serde_json::from_value::<SummaryRow>(doc.clone())
                .map_err(|err| IntakeServiceError::InvalidInput(format!("invalid doc entry: {err}")))
        })
        .collect()
}

/// Error raised by the intake service.
#[derive(Debug, thiserror::Error)]
pub enum IntakeServiceError {
    #[error("submission not found")]
    NotFound,
    #[error("no submissions")]
    NoData,
    #[error("invalid input: {0}")]
    InvalidInput(String),
    #[error("storage failure: {0}")]
    Storage(String),
}

impl From<RepositoryError> for IntakeServiceError {
    fn from(value: RepositoryError) -> Self {
        match value {
            RepositoryError::NotFound => Self::NotFound,
            other => {
                error!(error = %other, "submission repository failure");
                Self::Storage(other.to_string())
            }
        }
    }
}

impl From<AttachmentError> for IntakeServiceError {
    fn from(value: AttachmentError) -> Self {
        error!(error = %value, "attachment storage failure");
        Self::Storage(value.to_string())
    }
}

impl From<LedgerError> for IntakeServiceError {
    fn from(value: LedgerError) -> Self {
        error!(error = %value, "summary ledger failure");
        Self::Storage(value.to_string())
    }
}

impl From<ExportError> for IntakeServiceError {
    fn from(value: ExportError) -> Self {
        match value {
            ExportError::NoData => Self::NoData,
            other => {
                error!(error = %other, "submission export failure");
                Self::Storage(other.to_string())
            }
        }
    }
}
