use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Form keys the rest of the system reads directly.
pub const ID_NUMBER_FIELD: &str = "id_number";
pub const FULL_NAMES_FIELD: &str = "full_names";
pub const SURNAME_FIELD: &str = "surname";
pub const EMAIL_FIELD: &str = "email";
pub const PHONE_FIELD: &str = "phone";

/// Internal identity derived from the creation timestamp; never shown to applicants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionId(pub i64);

/// Externally visible booking identifier, e.g. `BOOK-1727172000000-482`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BookingReference(pub String);

impl BookingReference {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BookingReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for BookingReference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Review state of a submission.
///
/// Reviewers may send labels outside the three known states; those are kept
/// verbatim in `Other` rather than rejected.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SubmissionStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Other(String),
}

impl SubmissionStatus {
    pub fn label(&self) -> &str {
        match self {
            SubmissionStatus::Pending => "Pending",
            SubmissionStatus::Accepted => "Accepted",
            SubmissionStatus::Rejected => "Rejected",
            SubmissionStatus::Other(label) => label,
        }
    }

    /// Parses a reviewer-supplied status. Blank input means "leave unchanged".
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        Some(Self::from(raw.to_string()))
    }
}

impl From<String> for SubmissionStatus {
    fn from(value: String) -> Self {
        match value.as_str() {
            "Pending" => Self::Pending,
            "Accepted" => Self::Accepted,
            "Rejected" => Self::Rejected,
            _ => Self::Other(value),
        }
    }
}

impl From<SubmissionStatus> for String {
    fn from(value: SubmissionStatus) -> Self {
        match value {
            SubmissionStatus::Other(label) => label,
            known => known.label().to_string(),
        }
    }
}

impl fmt::Display for SubmissionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Free-form form values keyed by field name. Extra keys are preserved for export.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SubmissionFields(pub BTreeMap<String, String>);

impl SubmissionFields {
    pub fn get(&self, key: &str) -> Option<&str> {
        self.0.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.0.insert(key.into(), value.into());
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    pub fn known(&self) -> KnownFields<'_> {
        KnownFields {
            id_number: self.get(ID_NUMBER_FIELD),
            full_names: self.get(FULL_NAMES_FIELD),
            surname: self.get(SURNAME_FIELD),
            email: self.get(EMAIL_FIELD),
            phone: self.get(PHONE_FIELD),
        }
    }
}

impl<K, V> FromIterator<(K, V)> for SubmissionFields
where
    K: Into<String>,
    V: Into<String>,
{
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        )
    }
}

/// Typed view over the applicant fields code depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownFields<'a> {
    pub id_number: Option<&'a str>,
    pub full_names: Option<&'a str>,
    pub surname: Option<&'a str>,
    pub email: Option<&'a str>,
    pub phone: Option<&'a str>,
}

impl KnownFields<'_> {
    pub fn display_name(&self) -> String {
        [self.full_names, self.surname]
            .into_iter()
            .flatten()
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Uploaded document metadata. `original` is display-only; `path` is server-assigned.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub original: String,
    pub path: PathBuf,
}

/// One applicant's form fields, uploaded documents, and review state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Submission {
    pub id: SubmissionId,
    pub booking_reference: BookingReference,
    #[serde(default)]
    pub status: SubmissionStatus,
    #[serde(default)]
    pub rejected_fields: Vec<String>,
    #[serde(default)]
    pub fields: SubmissionFields,
    #[serde(default)]
    pub files: Vec<Attachment>,
}

impl Submission {
    pub fn pending(
        id: SubmissionId,
        booking_reference: BookingReference,
        fields: SubmissionFields,
        files: Vec<Attachment>,
    ) -> Self {
        Self {
            id,
            booking_reference,
            status: SubmissionStatus::Pending,
            rejected_fields: Vec::new(),
            fields,
            files,
        }
    }

    pub fn id_number(&self) -> Option<&str> {
        self.fields.get(ID_NUMBER_FIELD)
    }

    /// Applies a review decision. The rejected field list is always replaced.
    pub fn apply_review(&mut self, status: Option<SubmissionStatus>, rejected_fields: Vec<String>) {
        if let Some(status) = status {
            self.status = status;
        }
        self.rejected_fields = rejected_fields;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Submission {
        let fields: SubmissionFields = [
            (ID_NUMBER_FIELD, "8001015009087"),
            (FULL_NAMES_FIELD, "Thandi Grace"),
            (SURNAME_FIELD, "Mokoena"),
        ]
        .into_iter()
        .collect();
        Submission::pending(
            SubmissionId(1_727_172_000_000),
            BookingReference::from("BOOK-1727172000000-482"),
            fields,
            vec![Attachment {
                original: "passport.pdf".to_string(),
                path: PathBuf::from("uploads/1727172000000-7.pdf"),
            }],
        )
    }

    #[test]
    fn status_keeps_unknown_labels_verbatim() {
        assert_eq!(
            SubmissionStatus::parse("Accepted"),
            Some(SubmissionStatus::Accepted)
        );
        assert_eq!(
            SubmissionStatus::parse("Escalated"),
            Some(SubmissionStatus::Other("Escalated".to_string()))
        );
        assert_eq!(SubmissionStatus::parse(""), None);
        assert_eq!(SubmissionStatus::Other("accepted".to_string()).label(), "accepted");
    }

    #[test]
    fn submission_serializes_in_stored_shape() {
        let value = serde_json::to_value(sample()).expect("serializes");
        assert_eq!(value["id"], 1_727_172_000_000_i64);
        assert_eq!(value["booking_reference"], "BOOK-1727172000000-482");
        assert_eq!(value["status"], "Pending");
        assert_eq!(value["rejected_fields"], serde_json::json!([]));
        assert_eq!(value["fields"]["surname"], "Mokoena");
        assert_eq!(value["files"][0]["original"], "passport.pdf");
        assert_eq!(value["files"][0]["path"], "uploads/1727172000000-7.pdf");
    }

    #[test]
    fn apply_review_replaces_rejections_and_keeps_status_when_absent() {
        let mut submission = sample();
        submission.apply_review(
            Some(SubmissionStatus::Rejected),
            vec!["email".to_string(), "phone".to_string()],
        );
        assert_eq!(submission.status, SubmissionStatus::Rejected);
        assert_eq!(submission.rejected_fields, vec!["email", "phone"]);

        submission.apply_review(None, Vec::new());
        assert_eq!(submission.status, SubmissionStatus::Rejected);
        assert!(submission.rejected_fields.is_empty());
    }

    #[test]
    fn known_fields_build_display_name() {
        let submission = sample();
        let known = submission.fields.known();
        assert_eq!(known.id_number, Some("8001015009087"));
        assert_eq!(known.display_name(), "Thandi Grace Mokoena");
        assert!(known.email.is_none());
    }
}
