use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use visa_intake::config::StorageConfig;
use visa_intake::error::AppError;
use visa_intake::intake::{AttachmentRegistry, IntakeService, JsonFileStore, SummaryLedger};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
    pub(crate) uploads: AttachmentRegistry,
}

/// Opens the submission store, uploads directory, and ledger, creating any
/// missing directories and the ledger header.
pub(crate) fn build_service(
    storage: &StorageConfig,
) -> Result<IntakeService<JsonFileStore>, AppError> {
    let store = JsonFileStore::open(&storage.data_file)?;
    let attachments = AttachmentRegistry::open(&storage.uploads_dir)?;
    let ledger = SummaryLedger::open(&storage.ledger_path)?;
    Ok(IntakeService::new(Arc::new(store), attachments, ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn build_service_prepares_storage_layout() {
        let dir = TempDir::new().expect("tempdir");
        let storage = StorageConfig {
            data_file: dir.path().join("db").join("submissions.json"),
            uploads_dir: dir.path().join("uploads"),
            ledger_path: dir.path().join("csv").join("CSV.csv"),
        };

        let service = build_service(&storage).expect("service builds");
        assert!(service.list_all().expect("empty store").is_empty());
        assert!(storage.uploads_dir.is_dir());
        assert!(storage.data_file.parent().expect("parent").is_dir());
        assert_eq!(
            std::fs::read_to_string(&storage.ledger_path).expect("ledger"),
            "Booking Number,User Name,Document Type,Status\n"
        );
    }
}
