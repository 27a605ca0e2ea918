use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use axum::response::Response;
use serde_json::Value;
use tempfile::TempDir;

use crate::intake::attachments::{AttachmentRegistry, UploadedFile};
use crate::intake::domain::{BookingReference, Submission, SubmissionFields, SubmissionStatus};
use crate::intake::export::SummaryLedger;
use crate::intake::reference::ReferenceGenerator;
use crate::intake::repository::{RepositoryError, StorageError, SubmissionRepository};
use crate::intake::service::IntakeService;
use crate::intake::store::JsonFileStore;

pub(super) const BOUNDARY: &str = "visa-intake-test-boundary";

/// Service wired to throwaway files; keep the harness alive for the test's duration.
pub(super) struct Harness {
    pub(super) dir: TempDir,
    pub(super) store: Arc<JsonFileStore>,
    pub(super) service: Arc<IntakeService<JsonFileStore>>,
}

impl Harness {
    pub(super) fn ledger_contents(&self) -> String {
        std::fs::read_to_string(self.dir.path().join("csv").join("CSV.csv")).expect("ledger")
    }
}

pub(super) fn harness() -> Harness {
    build_harness(None)
}

pub(super) fn harness_with_references(references: &[&str]) -> Harness {
    build_harness(Some(Box::new(ScriptedReferences::new(references))))
}

fn build_harness(references: Option<Box<dyn ReferenceGenerator>>) -> Harness {
    let dir = TempDir::new().expect("tempdir");
    let store = Arc::new(JsonFileStore::open(dir.path().join("submissions.json")).expect("store"));
    let attachments = AttachmentRegistry::open(dir.path().join("uploads")).expect("uploads");
    let ledger = SummaryLedger::open(dir.path().join("csv").join("CSV.csv")).expect("ledger");
    let service = match references {
        Some(references) => {
            IntakeService::with_generator(store.clone(), attachments, ledger, references)
        }
        None => IntakeService::new(store.clone(), attachments, ledger),
    };
    Harness {
        dir,
        store,
        service: Arc::new(service),
    }
}

pub(super) fn applicant_fields(id_number: &str, email: &str) -> SubmissionFields {
    [
        ("id_number", id_number),
        ("full_names", "Thandi Grace"),
        ("surname", "Mokoena"),
        ("email", email),
        ("phone", "+27 82 555 0101"),
    ]
    .into_iter()
    .collect()
}

pub(super) fn passport_upload() -> UploadedFile {
    UploadedFile::new("passport.pdf", b"%PDF-1.7 passport".to_vec())
}

/// Replays a fixed list of references, then repeats the last one.
pub(super) struct ScriptedReferences {
    queue: Mutex<VecDeque<String>>,
    last: String,
}

impl ScriptedReferences {
    pub(super) fn new(references: &[&str]) -> Self {
        Self {
            queue: Mutex::new(references.iter().map(|r| r.to_string()).collect()),
            last: references.last().map(|r| r.to_string()).unwrap_or_default(),
        }
    }
}

impl ReferenceGenerator for ScriptedReferences {
    fn generate(&self) -> BookingReference {
        let next = self.queue.lock().expect("queue mutex poisoned").pop_front();
        BookingReference(next.unwrap_or_else(|| self.last.clone()))
    }
}

pub(super) struct UnavailableRepository;

impl UnavailableRepository {
    fn offline() -> RepositoryError {
        RepositoryError::Storage(StorageError::Io(std::io::Error::new(
            std::io::ErrorKind::PermissionDenied,
            "/srv/visa/submissions.json is read-only",
        )))
    }
}

impl SubmissionRepository for UnavailableRepository {
    fn append(&self, _record: Submission) -> Result<(), RepositoryError> {
        Err(Self::offline())
    }

    fn all(&self) -> Result<Vec<Submission>, RepositoryError> {
        Err(Self::offline())
    }

    fn find_by_reference(
        &self,
        _reference: &BookingReference,
    ) -> Result<Option<Submission>, RepositoryError> {
        Err(Self::offline())
    }

    fn find_by_id_number(&self, _id_number: &str) -> Result<Option<Submission>, RepositoryError> {
        Err(Self::offline())
    }

    fn update_status(
        &self,
        _reference: &BookingReference,
        _status: Option<SubmissionStatus>,
        _rejected_fields: Vec<String>,
    ) -> Result<Submission, RepositoryError> {
        Err(Self::offline())
    }
}

pub(super) fn unavailable_service(dir: &TempDir) -> Arc<IntakeService<UnavailableRepository>> {
    let attachments = AttachmentRegistry::open(dir.path().join("uploads")).expect("uploads");
    let ledger = SummaryLedger::open(dir.path().join("CSV.csv")).expect("ledger");
    Arc::new(IntakeService::new(
        Arc::new(UnavailableRepository),
        attachments,
        ledger,
    ))
}

pub(super) async fn read_body(response: Response) -> Vec<u8> {
    axum::body::to_bytes(response.into_body(), 1024 * 1024)
        .await
        .expect("read body")
        .to_vec()
}

pub(super) async fn read_json_body(response: Response) -> Value {
    serde_json::from_slice(&read_body(response).await).expect("json payload")
}

/// Encodes text fields and `(field, file name, bytes)` parts as multipart/form-data.
pub(super) fn multipart_body(fields: &[(&str, &str)], files: &[(&str, &str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"\r\n\r\n{value}\r\n"
            )
            .as_bytes(),
        );
    }
    for (name, file_name, bytes) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"{name}\"; filename=\"{file_name}\"\r\nContent-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(bytes);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}
