use crate::infra::build_service;
use chrono::{DateTime, Utc};
use clap::{ArgGroup, Args};
use std::io::Write;
use std::path::PathBuf;
use visa_intake::config::AppConfig;
use visa_intake::error::AppError;
use visa_intake::intake::{BookingReference, IntakeService, Submission, SubmissionRepository};

#[derive(Args, Debug, Default)]
pub(crate) struct ExportArgs {
    /// Destination file for the CSV (defaults to stdout)
    #[arg(long)]
    pub(crate) output: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[command(group(ArgGroup::new("key").required(true).args(["reference", "id_number"])))]
pub(crate) struct LookupArgs {
    /// Booking reference, e.g. BOOK-1727172000000-482
    #[arg(long)]
    pub(crate) reference: Option<String>,
    /// Applicant ID number; the earliest matching submission is shown
    #[arg(long)]
    pub(crate) id_number: Option<String>,
}

#[derive(Args, Debug)]
pub(crate) struct ReviewArgs {
    /// Booking reference of the submission to review
    pub(crate) reference: String,
    /// New status (Pending, Accepted, Rejected); omit to keep the current one
    #[arg(long)]
    pub(crate) status: Option<String>,
    /// Field flagged as rejected; repeat for several fields
    #[arg(long = "reject-field")]
    pub(crate) reject_fields: Vec<String>,
}

pub(crate) fn run_export(args: ExportArgs) -> Result<(), AppError> {
    let service = build_service(&AppConfig::load()?.storage)?;
    let bytes = service.export_csv()?;
    match args.output {
        Some(path) => {
            std::fs::write(&path, &bytes)?;
            println!("Exported submissions to {}", path.display());
        }
        None => std::io::stdout().write_all(&bytes)?,
    }
    Ok(())
}

pub(crate) fn run_list() -> Result<(), AppError> {
    let service = build_service(&AppConfig::load()?.storage)?;
    for line in list_lines(&service)? {
        println!("{line}");
    }
    Ok(())
}

pub(crate) fn run_lookup(args: LookupArgs) -> Result<(), AppError> {
    let service = build_service(&AppConfig::load()?.storage)?;
    let submission = lookup(&service, &args)?;
    println!("{}", render_submission(&submission));
    Ok(())
}

pub(crate) fn run_review(args: ReviewArgs) -> Result<(), AppError> {
    let service = build_service(&AppConfig::load()?.storage)?;
    let updated = service.review(
        &BookingReference(args.reference),
        args.status.as_deref(),
        Some(args.reject_fields),
    )?;
    println!("{}", summary_line(&updated));
    Ok(())
}

fn lookup<R>(service: &IntakeService<R>, args: &LookupArgs) -> Result<Submission, AppError>
where
    R: SubmissionRepository + 'static,
{
    let submission = match (&args.reference, &args.id_number) {
        (Some(reference), _) => service.lookup_by_reference(&BookingReference(reference.clone()))?,
        (None, Some(id_number)) => service.lookup_by_id_number(id_number)?,
        (None, None) => {
            return Err(visa_intake::intake::IntakeServiceError::InvalidInput(
                "either --reference or --id-number is required".to_string(),
            )
            .into())
        }
    };
    Ok(submission)
}

fn list_lines<R>(service: &IntakeService<R>) -> Result<Vec<String>, AppError>
where
    R: SubmissionRepository + 'static,
{
    Ok(service.list_all()?.iter().map(summary_line).collect())
}

fn summary_line(submission: &Submission) -> String {
    let created = DateTime::<Utc>::from_timestamp_millis(submission.id.0)
        .map(|at| at.format("%Y-%m-%d %H:%M").to_string())
        .unwrap_or_else(|| "-".to_string());
    let mut line = format!(
        "{} | {} | {} | {}",
        submission.booking_reference,
        submission.status,
        created,
        submission.fields.known().display_name()
    );
    if !submission.rejected_fields.is_empty() {
        line.push_str(&format!(
            " | rejected: {}",
            submission.rejected_fields.join(", ")
        ));
    }
    line
}

fn render_submission(submission: &Submission) -> String {
    serde_json::to_string_pretty(submission).unwrap_or_else(|_| summary_line(submission))
}
