use anyhow::Context;
use clap::Parser;
use tracing::error;
use unitrun::{RunCoordinator, RunOutcome};
use unitrun_cli::{cli::Cli, logging};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);

	let code = match run(&cli).await {
		Ok(outcome) => outcome.exit_code(),
		Err(err) => {
			error!(target = "unitrun", error = %format!("{err:#}"), "run failed");
			1
		}
	};
	std::process::exit(code);
}

async fn run(cli: &Cli) -> anyhow::Result<RunOutcome> {
	let config = cli.load_config().context("failed to load configuration")?;
	let coordinator = RunCoordinator::new(config)?;
	Ok(coordinator.run().await)
}
