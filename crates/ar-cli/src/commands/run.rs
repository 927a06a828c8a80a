use ar_agents::coordinator::ExecutionRequest;
use ar_core::config::Config;

/// Run the `run` subcommand: execute to completion and print the report.
pub async fn run(config: &Config, path: String, instruction: String) -> anyhow::Result<()> {
    let coordinator = super::coordinator(config)?;
    let outcome = coordinator
        .execute(&ExecutionRequest::new(path, instruction))
        .await;
    tracing::info!(route = ?outcome.route, results = outcome.results.len(), "request finished");

    println!("{}", outcome.report);
    if let Some(status) = outcome.write_status {
        println!();
        println!("{status}");
    }
    Ok(())
}
