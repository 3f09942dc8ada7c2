use gh_app_token_cli::run_cli;
use tracing::{error, Level};

#[tokio::main]
async fn main() {
    if let Err(e) = run_cli().await {
        // Logging may be filtered off or not installed.
        if tracing::enabled!(Level::ERROR) {
            error!("{}", e);
        } else {
            eprintln!("Error: {}", e);
        }
        std::process::exit(e.exit_code());
    }
}
