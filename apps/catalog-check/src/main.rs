//! Runs the catalog consistency suite against a live service and its
//! database.
//!
//! Configuration is layered: defaults, then the TOML file, then `CATALOG_*`
//! environment variables, then command-line flags.

mod cli;

use std::process::ExitCode;

use anyhow::{bail, Context};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use catalog_core::HarnessConfig;
use catalog_harness::{find, standard_suite, Scenario, ScenarioRunner, SuiteReport};

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    let cli = Cli::parse();

    // Logs go to stderr so `--json` output stays parseable.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    match &cli.command {
        Commands::List => {
            for scenario in standard_suite() {
                println!("{}", scenario.name);
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Run { scenario, json } => {
            let config = load_config(&cli)?;
            let scenarios = select_scenarios(scenario)?;
            tracing::info!(
                base_url = %config.base_url,
                database = %config.database_path.display(),
                scenarios = scenarios.len(),
                "starting run"
            );

            let mut runner = ScenarioRunner::from_config(&config)?;
            let report = runner.run_all(&scenarios).await;
            if *json {
                println!("{}", report.to_json()?);
            } else {
                print_summary(&report);
            }

            Ok(if report.all_passed() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            })
        }
    }
}

fn load_config(cli: &Cli) -> anyhow::Result<HarnessConfig> {
    let mut config = match &cli.config {
        Some(path) => HarnessConfig::from_file(path)
            .with_context(|| format!("Failed to load {}", path.display()))?,
        None => HarnessConfig::new(),
    };
    config.apply_env_overrides()?;

    if let Some(base_url) = &cli.base_url {
        config.base_url = base_url.clone();
    }
    if let Some(database) = &cli.database {
        config.database_path = database.clone();
    }
    if cli.seed.is_some() {
        config.seed = cli.seed;
    }
    config.validate()?;
    Ok(config)
}

fn select_scenarios(names: &[String]) -> anyhow::Result<Vec<Scenario>> {
    if names.is_empty() {
        return Ok(standard_suite());
    }
    let mut selected = Vec::with_capacity(names.len());
    for name in names {
        match find(name) {
            Some(scenario) => selected.push(scenario),
            None => bail!("Unknown scenario '{}'; see `catalog-check list`", name),
        }
    }
    Ok(selected)
}

fn print_summary(report: &SuiteReport) {
    for scenario in &report.scenarios {
        match &scenario.failure {
            None if scenario.passed() => {
                println!("PASS {} ({} ms)", scenario.name, scenario.elapsed_ms)
            }
            None => println!("FAIL {}: rows left behind", scenario.name),
            Some(failure) => {
                let at = failure
                    .step
                    .and_then(|i| scenario.steps.get(i))
                    .map(|s| format!(" at {}", s.action))
                    .unwrap_or_default();
                println!("FAIL {}{}: {}", scenario.name, at, failure.message);
                for diff in &failure.diff {
                    println!(
                        "     {}: expected {}, got {}",
                        diff.field, diff.expected, diff.actual
                    );
                }
            }
        }
        for problem in &scenario.cleanup_failures {
            println!("     cleanup: {}", problem.message);
        }
    }

    let seed = report
        .seed
        .map(|s| format!(", seed {}", s))
        .unwrap_or_default();
    println!("\n{} passed, {} failed{}", report.passed, report.failed, seed);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_select_all_by_default() {
        assert_eq!(select_scenarios(&[]).unwrap().len(), standard_suite().len());
    }

    #[test]
    fn test_select_by_name() {
        let names = vec!["pasta".to_string(), "get_category_food".to_string()];
        let selected = select_scenarios(&names).unwrap();
        assert_eq!(selected[0].name, "pasta");
        assert_eq!(selected[1].name, "get_category_food");

        assert!(select_scenarios(&["nope".to_string()]).is_err());
    }

    #[test]
    fn test_flags_override_defaults() {
        let cli = Cli::try_parse_from([
            "catalog-check",
            "--base-url",
            "http://127.0.0.1:9000/api",
            "--seed",
            "9",
            "run",
            "--scenario",
            "pasta",
            "--json",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();
        assert_eq!(config.base_url, "http://127.0.0.1:9000/api");
        assert_eq!(config.seed, Some(9));
        match cli.command {
            Commands::Run { scenario, json } => {
                assert_eq!(scenario, vec!["pasta".to_string()]);
                assert!(json);
            }
            Commands::List => panic!("expected run"),
        }
    }
}
