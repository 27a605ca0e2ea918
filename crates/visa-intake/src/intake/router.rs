use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{multipart::MultipartError, Multipart, Path, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::{json, Value};

use super::attachments::UploadedFile;
use super::domain::{BookingReference, SubmissionFields};
use super::repository::SubmissionRepository;
use super::service::{IntakeService, IntakeServiceError};

/// Router builder exposing intake, review, and export endpoints.
pub fn intake_router<R>(service: Arc<IntakeService<R>>) -> Router
where
    R: SubmissionRepository + 'static,
{
    Router::new()
        .route("/api/submit-visa-application", post(submit_handler::<R>))
        .route("/api/submissions", get(list_handler::<R>))
        .route(
            "/api/bookings/:booking_reference",
            get(reference_lookup_handler::<R>),
        )
        .route(
            "/api/submission/:id_number",
            get(id_number_lookup_handler::<R>),
        )
        .route("/api/review/:booking_reference", post(review_handler::<R>))
        .route("/api/download", get(download_handler::<R>))
        .route("/api/save-summary", post(save_summary_handler::<R>))
        .with_state(service)
}

#[derive(Debug, Default, Deserialize)]
pub(crate) struct ReviewRequest {
    #[serde(default)]
    pub(crate) status: Option<String>,
    #[serde(default)]
    pub(crate) rejected_fields: Option<Vec<String>>,
}

pub(crate) async fn submit_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    multipart: Multipart,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    let (fields, files) = match read_submission_parts(multipart).await {
        Ok(parts) => parts,
        Err(err) => {
            let payload = json!({
                "success": false,
                "message": err.to_string(),
            });
            return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
        }
    };

    match service.submit(fields, files) {
        Ok(booking_reference) => {
            let payload = json!({
                "success": true,
                "booking_reference": booking_reference,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

pub(crate) async fn list_handler<R>(State(service): State<Arc<IntakeService<R>>>) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.list_all() {
        Ok(submissions) => (StatusCode::OK, Json(submissions)).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn reference_lookup_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(booking_reference): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.lookup_by_reference(&BookingReference(booking_reference)) {
        Ok(submission) => {
            let payload = json!({ "success": true, "submission": submission });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(IntakeServiceError::NotFound) => not_found("No submission found"),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn id_number_lookup_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(id_number): Path<String>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.lookup_by_id_number(&id_number) {
        Ok(submission) => {
            let payload = json!({ "success": true, "submission": submission });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(IntakeServiceError::NotFound) => not_found("No submission found"),
        Err(other) => error_response(other),
    }
}

/// Both review inputs are optional, so an empty body (with or without a JSON
/// content type) is treated as `{}`.
pub(crate) async fn review_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Path(booking_reference): Path<String>,
    body: Bytes,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    let request = if body.iter().all(u8::is_ascii_whitespace) {
        ReviewRequest::default()
    } else {
        match serde_json::from_slice::<ReviewRequest>(&body) {
            Ok(request) => request,
            Err(err) => {
                let payload = json!({
                    "success": false,
                    "message": format!("malformed review payload: {err}"),
                });
                return (StatusCode::BAD_REQUEST, Json(payload)).into_response();
            }
        }
    };
    let reference = BookingReference(booking_reference);
    match service.review(
        &reference,
        request.status.as_deref(),
        request.rejected_fields,
    ) {
        Ok(_) => (StatusCode::OK, Json(json!({ "success": true }))).into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn download_handler<R>(State(service): State<Arc<IntakeService<R>>>) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.export_csv() {
        Ok(bytes) => (
            StatusCode::OK,
            [
                (header::CONTENT_TYPE, mime::TEXT_CSV_UTF_8.as_ref()),
                (
                    header::CONTENT_DISPOSITION,
                    "attachment; filename=\"submissions.csv\"",
                ),
            ],
            bytes,
        )
            .into_response(),
        Err(other) => error_response(other),
    }
}

pub(crate) async fn save_summary_handler<R>(
    State(service): State<Arc<IntakeService<R>>>,
    Json(payload): Json<Value>,
) -> Response
where
    R: SubmissionRepository + 'static,
{
    match service.append_summary_payload(&payload) {
        Ok(_) => {
            let payload = json!({
                "success": true,
                "message": "Summary data saved to CSV folder",
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(other) => error_response(other),
    }
}

#[derive(Debug, thiserror::Error)]
pub(crate) enum SubmissionPartsError {
    #[error("malformed upload: {}", .0.body_text())]
    Multipart(#[from] MultipartError),
    #[error("form field '{0}' was sent more than once")]
    DuplicateField(String),
}

/// Text parts become form fields and parts with a file name become uploads.
/// A text field name may appear only once per request.
async fn read_submission_parts(
    mut multipart: Multipart,
) -> Result<(SubmissionFields, Vec<UploadedFile>), SubmissionPartsError> {
    let mut fields = SubmissionFields::default();
    let mut files = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        let name = field.name().unwrap_or_default().to_string();
        match field.file_name().map(str::to_string) {
            Some(original_name) => {
                let bytes = field.bytes().await?;
                files.push(UploadedFile::new(original_name, bytes.to_vec()));
            }
            None if !name.is_empty() => {
                if fields.get(&name).is_some() {
                    return Err(SubmissionPartsError::DuplicateField(name));
                }
                let value = field.text().await?;
                fields.insert(name, value);
            }
            None => {}
        }
    }

    Ok((fields, files))
}

fn not_found(message: &str) -> Response {
    let payload = json!({ "success": false, "message": message });
    (StatusCode::NOT_FOUND, Json(payload)).into_response()
}

pub(crate) fn error_response(error: IntakeServiceError) -> Response {
    match error {
        IntakeServiceError::NotFound => not_found("Not found"),
        IntakeServiceError::NoData => (StatusCode::NOT_FOUND, "No submissions").into_response(),
        IntakeServiceError::InvalidInput(detail) => {
            let payload = json!({ "error": "Invalid docs data", "detail": detail });
            (StatusCode::BAD_REQUEST, Json(payload)).into_response()
        }
        IntakeServiceError::Storage(_) => {
            let payload = json!({ "success": false, "message": "internal storage failure" });
            (StatusCode::INTERNAL_SERVER_ERROR, Json(payload)).into_response()
        }
    }
}
