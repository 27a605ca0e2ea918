use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Component, Path, PathBuf};

use tracing::{debug, warn};

use super::domain::Attachment;
use super::reference::stored_file_name;

const MAX_NAME_ATTEMPTS: usize = 8;

/// A file received alongside a submission request, before it is stored.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadedFile {
    pub original_name: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(original_name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            original_name: original_name.into(),
            bytes: bytes.into(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum AttachmentError {
    #[error("failed to store upload: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not allocate a unique storage name for upload")]
    NameExhausted,
}

/// Writes uploads under one directory and pairs each with its display name.
#[derive(Debug, Clone)]
pub struct AttachmentRegistry {
    uploads_dir: PathBuf,
}

impl AttachmentRegistry {
    pub fn open(uploads_dir: impl Into<PathBuf>) -> Result<Self, AttachmentError> {
        let uploads_dir = uploads_dir.into();
        fs::create_dir_all(&uploads_dir)?;
        Ok(Self { uploads_dir })
    }

    pub fn uploads_dir(&self) -> &Path {
        &self.uploads_dir
    }

    /// Stores every file, returning attachments in the order received. If any
    /// file fails, the ones already written are removed again.
    pub fn register(&self, files: Vec<UploadedFile>) -> Result<Vec<Attachment>, AttachmentError> {
        let mut stored = Vec::with_capacity(files.len());
        for file in files {
            match self.store_one(file) {
                Ok(attachment) => stored.push(attachment),
                Err(err) => {
                    self.discard(&stored);
                    return Err(err);
                }
            }
        }
        Ok(stored)
    }

    /// Deletes stored uploads that no submission will reference.
    pub fn discard(&self, attachments: &[Attachment]) {
        for attachment in attachments {
            match fs::remove_file(&attachment.path) {
                Ok(()) => debug!(path = %attachment.path.display(), "upload discarded"),
                Err(err) if err.kind() == ErrorKind::NotFound => {}
                Err(err) => warn!(
                    path = %attachment.path.display(),
                    error = %err,
                    "failed to discard upload"
                ),
            }
        }
    }

    /// Resolves a stored name for read-only retrieval. Anything that is not a
    /// single plain file name inside the uploads directory yields `None`.
    pub fn resolve(&self, stored_name: &str) -> Option<PathBuf> {
        let mut components = Path::new(stored_name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(name)), None) => {
                let candidate = self.uploads_dir.join(name);
                candidate.is_file().then_some(candidate)
            }
            _ => None,
        }
    }

    fn store_one(&self, file: UploadedFile) -> Result<Attachment, AttachmentError> {
        for _ in 0..MAX_NAME_ATTEMPTS {
            let path = self.uploads_dir.join(stored_file_name(&file.original_name));
            // create_new refuses to clobber a same-named upload from a parallel request
            let mut handle = match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(handle) => handle,
                Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
                Err(err) => return Err(err.into()),
            };
            handle.write_all(&file.bytes)?;
            handle.sync_all()?;
            debug!(path = %path.display(), bytes = file.bytes.len(), "upload stored");
            return Ok(Attachment {
                original: file.original_name,
                path,
            });
        }
        Err(AttachmentError::NameExhausted)
    }
}
