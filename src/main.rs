use std::process::ExitCode;

use note_finder::SessionOutcome;

#[tokio::main]
async fn main() -> ExitCode {
    note_finder::init_tracing();
    match note_finder::cli::run().await {
        Ok(SessionOutcome::Committed { changed }) => {
            println!("Done, notes changed: {changed}");
            ExitCode::SUCCESS
        }
        Ok(SessionOutcome::Dismissed) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}
