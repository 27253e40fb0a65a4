use clap::Parser;
use owo_colors::OwoColorize;
use std::process;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod cli;

use cli::Cli;
use netscry_core::output::OutputWriter;
use netscry_core::{
    build_registry, CredentialStore, Engine, EngineOptions, ProviderStatus, RunOutcome,
};

const BANNER: &str = r#"
              __
   ____  ___ / /______________  __
  / __ \/ _ \ __/ ___/ ___/ __/ / /
 / / / /  __/ /_(__  ) /__/ /  \/ /
/_/ /_/\___/\__/____/\___/_/   /_/
"#;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let default_filter = if cli.silent {
        "netscry_cli=error,netscry_core=error"
    } else if cli.verbose > 0 {
        "netscry_cli=debug,netscry_core=debug"
    } else {
        "netscry_cli=info"
    };
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    if !cli.silent {
        eprintln!("{}", BANNER.cyan());
    }

    let requests = cli.plan();
    if requests.is_empty() {
        eprintln!(
            "{}: no query given; try -q <QUERY> or an engine flag like --shodan <QUERY>",
            "Error".red().bold()
        );
        process::exit(2);
    }

    let store = match load_store(&cli) {
        Ok(store) => store,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            process::exit(1);
        }
    };

    let options = EngineOptions {
        requests_per_second: cli.rate_limit,
        max_retries: cli.retries,
        request_timeout: Duration::from_secs(cli.timeout),
        ..Default::default()
    };
    let engine = match Engine::new(build_registry(), store, options) {
        Ok(engine) => engine,
        Err(e) => {
            eprintln!("{}: {}", "Error".red().bold(), e);
            process::exit(1);
        }
    };

    let mut writer = match &cli.output {
        Some(path) => match OutputWriter::file(path, cli.format()) {
            Ok(writer) => writer,
            Err(e) => {
                eprintln!("{}: {}", "Error".red().bold(), e);
                process::exit(1);
            }
        },
        None => OutputWriter::stdout(cli.format()),
    };

    let mut outcomes: Vec<RunOutcome> = Vec::new();
    for request in requests {
        let mut run = match engine.search(request).await {
            Ok(run) => run,
            Err(e) => {
                eprintln!("{}: {}", "Error".red().bold(), e);
                process::exit(1);
            }
        };

        while let Some(record) = run.results.recv().await {
            if let Err(e) = writer.write_record(&record) {
                eprintln!("{}: {}", "Error".red().bold(), e);
                process::exit(1);
            }
        }

        match run.outcome.await {
            Ok(outcome) => outcomes.push(outcome),
            Err(e) => {
                eprintln!("{}: run aborted: {}", "Error".red().bold(), e);
                process::exit(1);
            }
        }
    }

    if let Err(e) = writer.flush() {
        eprintln!("{}: {}", "Error".red().bold(), e);
        process::exit(1);
    }

    let emitted = writer.written();
    if !cli.silent {
        report(&outcomes, emitted);
    }

    if outcomes.iter().all(|o| o.is_aggregate_failure()) {
        let detail = outcomes
            .iter()
            .map(RunOutcome::failure_detail)
            .collect::<Vec<_>>()
            .join("; ");
        eprintln!("{}: all providers failed: {}", "Error".red().bold(), detail);
        process::exit(1);
    }
}

fn load_store(cli: &Cli) -> Result<CredentialStore, netscry_core::EngineError> {
    match &cli.provider_config {
        Some(path) => CredentialStore::from_file(path),
        None => {
            let path = CredentialStore::default_config_path();
            if path.exists() {
                CredentialStore::from_file(&path)
            } else {
                Ok(CredentialStore::empty())
            }
        }
    }
}

fn report(outcomes: &[RunOutcome], emitted: usize) {
    for outcome in outcomes {
        for (name, status) in &outcome.providers {
            match status {
                ProviderStatus::Succeeded { records } => {
                    tracing::info!(provider = %name, records, "provider finished");
                }
                ProviderStatus::Failed { reason } => {
                    eprintln!("{}: {} failed: {}", "Warn".yellow().bold(), name, reason);
                }
                ProviderStatus::Skipped { missing_field } => {
                    eprintln!(
                        "{}: {} skipped, missing credential field '{}'",
                        "Warn".yellow().bold(),
                        name,
                        missing_field
                    );
                }
            }
        }
        if outcome.limit_reached {
            tracing::info!("result limit reached, run stopped early");
        }
    }
    eprintln!("{} {} results", "Done:".green().bold(), emitted);
}
