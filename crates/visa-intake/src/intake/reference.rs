use std::path::Path;
use std::sync::atomic::{AtomicI64, Ordering};

use chrono::Utc;
use rand::Rng;

use super::domain::{BookingReference, SubmissionId};

const REFERENCE_PREFIX: &str = "BOOK";

/// Source of booking references. Implementations must not consult the store.
pub trait ReferenceGenerator: Send + Sync {
    fn generate(&self) -> BookingReference;
}

/// `BOOK-<unix millis>-<100..=999>` references.
#[derive(Debug, Default, Clone, Copy)]
pub struct TimestampReferenceGenerator;

impl ReferenceGenerator for TimestampReferenceGenerator {
    fn generate(&self) -> BookingReference {
        let suffix: u16 = rand::thread_rng().gen_range(100..=999);
        BookingReference(format!(
            "{REFERENCE_PREFIX}-{}-{suffix}",
            Utc::now().timestamp_millis()
        ))
    }
}

static LAST_SUBMISSION_ID: AtomicI64 = AtomicI64::new(0);

/// Millisecond creation timestamp, bumped so ids strictly increase within the process.
pub fn next_submission_id() -> SubmissionId {
    let now = Utc::now().timestamp_millis();
    let mut last = LAST_SUBMISSION_ID.load(Ordering::Relaxed);
    loop {
        let candidate = now.max(last + 1);
        match LAST_SUBMISSION_ID.compare_exchange_weak(
            last,
            candidate,
            Ordering::AcqRel,
            Ordering::Relaxed,
        ) {
            Ok(_) => return SubmissionId(candidate),
            Err(observed) => last = observed,
        }
    }
}

/// Collision-resistant storage name that keeps the uploaded file's extension.
pub fn stored_file_name(original: &str) -> String {
    let disambiguator: u16 = rand::thread_rng().gen_range(0..1000);
    let extension = Path::new(original)
        .extension()
        .and_then(|ext| ext.to_str())
        .filter(|ext| ext.chars().all(|c| c.is_ascii_alphanumeric()))
        .map(|ext| format!(".{ext}"))
        .unwrap_or_default();
    format!(
        "{}-{disambiguator}{extension}",
        Utc::now().timestamp_millis()
    )
}
