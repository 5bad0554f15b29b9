//! # Kicks Till Entry Point
//!
//! Thin wrapper around [`kicks_till::run`]; all setup lives in the library
//! so it can be tested.

use std::process::ExitCode;

use kicks_till::cli::USAGE;
use kicks_till::TillError;

#[tokio::main]
async fn main() -> ExitCode {
    match kicks_till::run(std::env::args().skip(1).collect()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error [{}]: {}", err.code(), err);
            if matches!(err, TillError::Usage(_)) {
                eprintln!();
                eprintln!("{USAGE}");
            }
            ExitCode::from(err.exit_code())
        }
    }
}
