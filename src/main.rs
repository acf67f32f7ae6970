use std::process::ExitCode;

use anyhow::Context as _;
use clap::Parser as _;

#[tokio::main]
async fn main() -> ExitCode {
    if let Err(err) = try_main().await {
        eprintln!("{err:#}");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

async fn try_main() -> anyhow::Result<()> {
    let cli = proposalsmith::cli::Cli::parse();
    let env = proposalsmith::config::Environment::from_env().context("read environment")?;
    proposalsmith::logging::init(env.debug).context("init logging")?;
    tracing::debug!(?cli, ?env, "parsed cli");

    proposalsmith::generate::run(cli.generate, &env)
        .await
        .context("generate")?;

    Ok(())
}
