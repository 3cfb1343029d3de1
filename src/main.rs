//! CLI entry point for the TestFlight invite tool.

use std::process::ExitCode;

use clap::Parser;
use dialoguer::Password;
use tfinvite_core::{Session, SessionError, SessionOptions};
use tracing::debug;

mod cli;

use cli::Args;

// Exit codes reported to the calling shell. Usage errors exit with clap's
// own code (2) before main gets this far.
const EXIT_FAILURE: u8 = 1;
const EXIT_NO_PASSWORD: u8 = 3;
const EXIT_DUPLICATE_TESTER: u8 = 4;

#[tokio::main]
async fn main() -> ExitCode {
    // Parse CLI arguments first (before tracing, so --help works without logs)
    let args = Args::parse();

    // Determine log level based on verbose/quiet flags
    // Priority: RUST_LOG env var > quiet flag > verbose flag > default (warn)
    let default_level = if args.quiet {
        "error"
    } else {
        match args.verbose {
            0 => "warn",
            1 => "debug",
            _ => "trace",
        }
    };

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt().with_env_filter(filter).init();

    debug!(?args, "CLI arguments parsed");

    let password = match Password::new()
        .with_prompt("App Store Connect password")
        .interact()
    {
        Ok(password) if !password.is_empty() => password,
        _ => {
            eprintln!("Failed to read the App Store Connect password. Aborting.");
            return ExitCode::from(EXIT_NO_PASSWORD);
        }
    };

    let options = SessionOptions {
        proxy: args.proxy.clone(),
        content_provider_id: args.content_provider_id.clone(),
        group_id: args.group_id.clone(),
    };
    let mut session = match Session::new(
        args.login_email.clone(),
        password,
        args.app_id.to_string(),
        options,
    ) {
        Ok(session) => session,
        Err(error) => {
            eprintln!("Invite failed: {error}");
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    match session
        .add_tester(&args.invitee_email, &args.first_name, &args.last_name)
        .await
    {
        Ok(tester_id) => {
            println!(
                "Invite successful: {} (tester {tester_id})",
                args.invitee_email
            );
            ExitCode::SUCCESS
        }
        Err(SessionError::DuplicateTester { email }) => {
            println!("{email} is already a tester for app {}", args.app_id);
            ExitCode::from(EXIT_DUPLICATE_TESTER)
        }
        Err(error) => {
            eprintln!("Invite failed: {error}");
            ExitCode::from(EXIT_FAILURE)
        }
    }
}
