use std::io::Write;

use ar_agents::coordinator::ExecutionRequest;
use ar_core::config::Config;
use futures_util::StreamExt;

/// Run the `stream` subcommand: print wire-rendered events as they arrive.
pub async fn run(config: &Config, path: String, instruction: String) -> anyhow::Result<()> {
    let coordinator = super::coordinator(config)?;
    let mut events = coordinator.execute_stream(ExecutionRequest::new(path, instruction));

    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        write!(stdout, "{event}")?;
        stdout.flush()?;
    }
    writeln!(stdout)?;
    Ok(())
}
