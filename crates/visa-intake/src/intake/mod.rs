//! Visa application intake: booking references, the submission store,
//! uploaded attachments, staff review, and CSV reporting.
//!
//! `IntakeService` is the boundary the HTTP router and CLI call into; the
//! store and ledger types can also be used directly.

pub mod attachments;
pub mod domain;
pub mod export;
pub mod reference;
pub mod repository;
pub mod router;
pub mod service;
pub mod store;

#[cfg(test)]
mod tests;

pub use attachments::{AttachmentError, AttachmentRegistry, UploadedFile};
pub use domain::{
    Attachment, BookingReference, KnownFields, Submission, SubmissionFields, SubmissionId,
    SubmissionStatus,
};
pub use export::{export_csv, ExportError, LedgerError, SummaryLedger, SummaryRow};
pub use reference::{ReferenceGenerator, TimestampReferenceGenerator};
pub use repository::{RepositoryError, StorageError, SubmissionRepository};
pub use router::intake_router;
pub use service::{IntakeService, IntakeServiceError};
pub use store::JsonFileStore;
