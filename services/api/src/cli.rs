use crate::admin::{run_export, run_list, run_lookup, run_review, ExportArgs, LookupArgs, ReviewArgs};
use crate::server;
use clap::{Args, Parser, Subcommand};
use visa_intake::error::AppError;

#[derive(Parser, Debug)]
#[command(
    name = "Visa Intake",
    about = "Accept, review, and export visa application submissions",
    version
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP service (default command)
    Serve(ServeArgs),
    /// Write every submission as CSV
    Export(ExportArgs),
    /// List stored submissions with their review status
    List,
    /// Show one submission by booking reference or ID number
    Lookup(LookupArgs),
    /// Accept or reject a submission
    Review(ReviewArgs),
}

#[derive(Args, Debug, Default)]
pub(crate) struct ServeArgs {
    /// Override the configured host for the HTTP server
    #[arg(long)]
    pub(crate) host: Option<String>,
    /// Override the configured port for the HTTP server
    #[arg(long)]
    pub(crate) port: Option<u16>,
}

pub(crate) async fn run() -> Result<(), AppError> {
    let cli = Cli::parse();
    let command = cli
        .command
        .unwrap_or_else(|| Command::Serve(ServeArgs::default()));

    match command {
        Command::Serve(args) => server::run(args).await,
        Command::Export(args) => run_export(args),
        Command::List => run_list(),
        Command::Lookup(args) => run_lookup(args),
        Command::Review(args) => run_review(args),
    }
}
