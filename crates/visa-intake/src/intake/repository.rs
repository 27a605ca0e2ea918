use super::domain::{BookingReference, Submission, SubmissionStatus};

/// Storage abstraction so the service module can be exercised in isolation.
///
/// Implementations keep insertion order: `all` and `find_by_id_number` observe
/// records in the order they were appended.
pub trait SubmissionRepository: Send + Sync {
    fn append(&self, record: Submission) -> Result<(), RepositoryError>;
    fn all(&self) -> Result<Vec<Submission>, RepositoryError>;
    fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Submission>, RepositoryError>;
    fn find_by_id_number(&self, id_number: &str) -> Result<Option<Submission>, RepositoryError>;
    fn update_status(
        &self,
        reference: &BookingReference,
        status: Option<SubmissionStatus>,
        rejected_fields: Vec<String>,
    ) -> Result<Submission, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("booking reference already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("submission storage failed: {0}")]
    Storage(#[from] StorageError),
}

/// Durable-medium failure while reading or writing the collection.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("io failure: {0}")]
    Io(#[from] std::io::Error),
    #[error("corrupt submission document: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("storage gate poisoned")]
    Poisoned,
}
