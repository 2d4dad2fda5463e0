//! Offline evidence package verifier.
//!
//! Prints each report line, then `VALID` (exit 0) or `INVALID: <reason>`
//! (exit 1).

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use veriseal::verify::verify_package;

#[derive(Parser)]
#[command(
    name = "veriseal_verify",
    about = "Verify a VeriSeal evidence package (directory or .aep archive) offline"
)]
struct Args {
    /// Path to the evidence package
    package: PathBuf,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    // Usage errors exit 1 like every other failure, not clap's default 2.
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) => {
            let _ = e.print();
            return if e.use_stderr() {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            };
        }
    };
    if !args.package.exists() {
        eprintln!("error: {} does not exist", args.package.display());
        return ExitCode::FAILURE;
    }

    let result = verify_package(&args.package);
    for line in &result.report {
        println!("{line}");
    }
    if result.valid {
        println!("VALID");
        ExitCode::SUCCESS
    } else {
        println!(
            "INVALID: {}",
            result.failure_reason.as_deref().unwrap_or("unknown")
        );
        ExitCode::FAILURE
    }
}
