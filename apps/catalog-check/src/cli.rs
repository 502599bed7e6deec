use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// TOML configuration file
    #[arg(long, global = true, env = "CATALOG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Service root, e.g. http://localhost:8189/market/api/v1
    #[arg(long, global = true)]
    pub base_url: Option<String>,

    /// SQLite database backing the service
    #[arg(long, global = true)]
    pub database: Option<PathBuf>,

    /// Seed for fixture values; random when omitted
    #[arg(long, global = true)]
    pub seed: Option<u64>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run the standard suite, or the named scenarios
    Run {
        /// Scenario to run; repeatable
        #[arg(short, long)]
        scenario: Vec<String>,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// List scenario names
    List,
}
