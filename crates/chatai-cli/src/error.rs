use chatai_client::ChatError;
use colored::Colorize;

pub fn handle_error(err: anyhow::Error) -> ! {
    eprintln!("{} {:#}", "Error:".red().bold(), err);

    let status = err.downcast_ref::<ChatError>().and_then(ChatError::status);
    if matches!(status, Some(401) | Some(403)) {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Your session may have expired. Sign in again with:");
        eprintln!("  {} chatai login --email <email>", "$".dimmed());
    }

    let msg = format!("{err:#}").to_lowercase();

    if msg.contains("no model selected") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  List available models with:");
        eprintln!("  {} chatai models", "$".dimmed());
    }

    if msg.contains("connection refused") || msg.contains("transport error") {
        eprintln!("\n{}", "Suggestion:".yellow().bold());
        eprintln!("  Check that the chat server is running and --base-url is correct.");
    }

    std::process::exit(1);
}
