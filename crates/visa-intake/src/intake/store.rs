use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing::{debug, error};

use super::domain::{BookingReference, Submission, SubmissionStatus};
use super::repository::{RepositoryError, StorageError, SubmissionRepository};

/// Submission collection persisted as one pretty-printed JSON array.
///
/// Every mutation reads the whole document, applies the change, and replaces
/// the file through a temp-file rename. Mutations are serialized by an
/// in-process gate; separate processes sharing the file still race and the
/// last writer wins.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    gate: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        Ok(Self {
            path,
            gate: Mutex::new(()),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_collection(&self) -> Result<Vec<Submission>, StorageError> {
        if !self.path.exists() {
            return Ok(Vec::new());
        }
        let raw = fs::read_to_string(&self.path)?;
        if raw.trim().is_empty() {
            return Ok(Vec::new());
        }
        Ok(serde_json::from_str(&raw)?)
    }

    fn write_collection(&self, records: &[Submission]) -> Result<(), StorageError> {
        let serialized = serde_json::to_vec_pretty(records)?;
        atomic_write(&self.path, &serialized)?;
        debug!(records = records.len(), "submission collection written");
        Ok(())
    }

    fn mutate<T>(
        &self,
        apply: impl FnOnce(&mut Vec<Submission>) -> Result<T, RepositoryError>,
    ) -> Result<T, RepositoryError> {
        let _guard = self.gate.lock().map_err(|_| StorageError::Poisoned)?;
        let mut records = self.read_collection()?;
        let outcome = apply(&mut records)?;
        self.write_collection(&records).map_err(|err| {
            error!(error = %err, "failed to persist submission collection");
            err
        })?;
        Ok(outcome)
    }
}

impl SubmissionRepository for JsonFileStore {
    fn append(&self, record: Submission) -> Result<(), RepositoryError> {
        self.mutate(|records| {
            if records
                .iter()
                .any(|existing| existing.booking_reference == record.booking_reference)
            {
                return Err(RepositoryError::Conflict);
            }
            records.push(record);
            Ok(())
        })
    }

    fn all(&self) -> Result<Vec<Submission>, RepositoryError> {
        Ok(self.read_collection()?)
    }

    fn find_by_reference(
        &self,
        reference: &BookingReference,
    ) -> Result<Option<Submission>, RepositoryError> {
        Ok(self
            .read_collection()?
            .into_iter()
            .find(|record| &record.booking_reference == reference))
    }

    fn find_by_id_number(&self, id_number: &str) -> Result<Option<Submission>, RepositoryError> {
        Ok(self
            .read_collection()?
            .into_iter()
            .find(|record| record.id_number() == Some(id_number)))
    }

    fn update_status(
        &self,
        reference: &BookingReference,
        status: Option<SubmissionStatus>,
        rejected_fields: Vec<String>,
    ) -> Result<Submission, RepositoryError> {
        self.mutate(|records| {
            let record = records
                .iter_mut()
                .find(|record| &record.booking_reference == reference)
                .ok_or(RepositoryError::NotFound)?;
            record.apply_review(status, rejected_fields);
            Ok(record.clone())
        })
    }
}

/// Writes through a hidden sibling named after the full target file name, so
/// `a.json` and `a.tmp` never share a scratch file. The scratch file is removed
/// when any step before the rename fails.
fn atomic_write(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let tmp = scratch_path(path);
    let written = write_synced(&tmp, data).and_then(|()| fs::rename(&tmp, path));
    if written.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    written
}

fn write_synced(path: &Path, data: &[u8]) -> Result<(), std::io::Error> {
    let mut file = File::create(path)?;
    file.write_all(data)?;
    file.sync_all()
}

fn scratch_path(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{file_name}.{}.tmp", std::process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intake::domain::{Attachment, SubmissionFields, SubmissionId};
    use std::sync::Arc;
    use tempfile::TempDir;

    fn record(reference: &str, id_number: &str) -> Submission {
        let fields: SubmissionFields = [("id_number", id_number), ("email", "a@example.org")]
            .into_iter()
            .collect();
        Submission::pending(
            SubmissionId(reference.len() as i64),
            BookingReference::from(reference),
            fields,
            vec![Attachment {
                original: "id.jpg".to_string(),
                path: PathBuf::from("uploads/1-1.jpg"),
            }],
        )
    }

    fn store(dir: &TempDir) -> JsonFileStore {
        JsonFileStore::open(dir.path().join("data").join("submissions.json")).expect("store opens")
    }

    #[test]
    fn missing_or_blank_document_reads_as_empty() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        assert!(store.all().expect("read").is_empty());

        fs::write(store.path(), "  \n").expect("write blank");
        assert!(store.all().expect("read").is_empty());
    }

    #[test]
    fn append_preserves_insertion_order_and_persists() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        store.append(record("BOOK-1", "111")).expect("append");
        store.append(record("BOOK-2", "222")).expect("append");

        let reopened = JsonFileStore::open(store.path()).expect("reopen");
        let references: Vec<String> = reopened
            .all()
            .expect("read")
            .into_iter()
            .map(|record| record.booking_reference.0)
            .collect();
        assert_eq!(references, vec!["BOOK-1", "BOOK-2"]);
        assert!(!scratch_path(store.path()).exists());
    }

    #[test]
    fn writes_leave_same_stem_siblings_alone() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        let sibling = store.path().with_extension("tmp");
        fs::write(&sibling, "operator notes").expect("write sibling");

        store.append(record("BOOK-1", "111")).expect("append");

        assert_eq!(fs::read_to_string(&sibling).expect("sibling"), "operator notes");
        let leftovers: Vec<_> = fs::read_dir(store.path().parent().expect("parent"))
            .expect("list")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(leftovers.len(), 2, "unexpected files: {leftovers:?}");
    }

    #[test]
    fn failed_rename_removes_scratch_file() {
        let dir = TempDir::new().expect("tempdir");
        let target = dir.path().join("occupied");
        fs::create_dir_all(target.join("child")).expect("non-empty dir");

        assert!(atomic_write(&target, b"[]").is_err());
        assert!(!scratch_path(&target).exists());
        assert!(target.join("child").is_dir());
    }

    #[test]
    fn append_rejects_duplicate_reference() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        store.append(record("BOOK-1", "111")).expect("append");
        match store.append(record("BOOK-1", "999")) {
            Err(RepositoryError::Conflict) => {}
            other => panic!("expected conflict, got {other:?}"),
        }
        assert_eq!(store.all().expect("read").len(), 1);
    }

    #[test]
    fn find_by_id_number_returns_first_match() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        store.append(record("BOOK-first", "777")).expect("append");
        store.append(record("BOOK-second", "777")).expect("append");

        let found = store
            .find_by_id_number("777")
            .expect("read")
            .expect("match present");
        assert_eq!(found.booking_reference.as_str(), "BOOK-first");
        assert!(store.find_by_id_number("000").expect("read").is_none());
    }

    #[test]
    fn update_status_on_missing_reference_leaves_document_untouched() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        store.append(record("BOOK-1", "111")).expect("append");
        let before = fs::read(store.path()).expect("read bytes");

        match store.update_status(
            &BookingReference::from("BOOK-missing"),
            Some(SubmissionStatus::Accepted),
            Vec::new(),
        ) {
            Err(RepositoryError::NotFound) => {}
            other => panic!("expected not found, got {other:?}"),
        }
        assert_eq!(fs::read(store.path()).expect("read bytes"), before);
    }

    #[test]
    fn corrupt_document_surfaces_storage_error() {
        let dir = TempDir::new().expect("tempdir");
        let store = store(&dir);
        fs::write(store.path(), "{not json").expect("write");
        match store.append(record("BOOK-1", "111")) {
            Err(RepositoryError::Storage(StorageError::Corrupt(_))) => {}
            other => panic!("expected corrupt storage error, got {other:?}"),
        }
        assert_eq!(
            fs::read_to_string(store.path()).expect("read"),
            "{not json"
        );
    }

    #[test]
    fn concurrent_appends_through_the_gate_are_not_lost() {
        let dir = TempDir::new().expect("tempdir");
        let store = Arc::new(store(&dir));
        let handles: Vec<_> = (0..8)
            .map(|worker| {
                let store = Arc::clone(&store);
                std::thread::spawn(move || {
                    for n in 0..5 {
                        store
                            .append(record(&format!("BOOK-{worker}-{n}"), "1"))
                            .expect("append");
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().expect("worker finished");
        }
        assert_eq!(store.all().expect("read").len(), 40);
    }
}
