mod cli;
mod commands;
mod errors;
mod reporter;
mod shutdown;
mod tracing;

use crate::cli::{Cli, parse};
use crate::commands::App;
use crate::errors::{CliError, Exit};
use crate::reporter::TerminalReporter;
use crate::tracing::TracingConfig;
use devpack_core::ProvisionConfig;
use devpack_core::tools::InstallScope;
use devpack_vcs::{GitCli, OrgMatcher, RepoGate};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    let cli = parse();

    let tracing_config = TracingConfig {
        format: cli.log_format,
        level: cli.level.into(),
        ..Default::default()
    };
    if let Err(error) = crate::tracing::init_tracing(&tracing_config) {
        #[allow(clippy::print_stderr)]
        {
            eprintln!("{error:?}");
        }
        std::process::exit(Exit::Usage.code());
    }

    let exit = match run(cli).await {
        Ok(exit) => exit,
        Err(error) => {
            let exit = error.exit();
            #[allow(clippy::print_stderr)]
            {
                eprintln!("{:?}", miette::Report::new(error));
            }
            exit
        }
    };
    std::process::exit(exit.code());
}

fn load_config(cli: &Cli) -> Result<ProvisionConfig, CliError> {
    let mut config = ProvisionConfig::from_env()?;
    if let Some(registry) = &cli.registry {
        config.registry = Some(registry.clone());
    }
    if let Some(prefix) = &cli.prefix {
        config.install_scope = InstallScope::Scoped(prefix.clone());
    }
    Ok(config)
}

async fn run(cli: Cli) -> Result<Exit, CliError> {
    let config = load_config(&cli)?;
    let reporter = Arc::new(TerminalReporter::new(cli.no_progress));
    let coordinator = devpack_core::Coordinator::from_config(&config, reporter.clone())?;
    let app = App::new(
        config,
        coordinator,
        RepoGate::new(Arc::new(GitCli::default()), OrgMatcher::from_env()),
        reporter,
    );

    let shutdown = crate::shutdown::install_signal_handlers();
    tokio::select! {
        result = crate::commands::execute(cli.command, &app) => result,
        () = shutdown.wait_for_shutdown() => {
            app.teardown().await;
            Ok(Exit::Interrupted)
        }
    }
}
