use clap::{Args, Parser};

use crate::pipeline::DEFAULT_SCRAPE_LIMIT;

pub const DEFAULT_SEED_TITLE: &str = "Advanced Machine Learning Techniques for Scientific Discovery";

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(flatten)]
    pub generate: GenerateArgs,
}

#[derive(Debug, Args)]
pub struct GenerateArgs {
    /// Seed paper title the proposals are built around.
    #[arg(default_value = DEFAULT_SEED_TITLE)]
    pub title: String,

    /// Output directory for proposal JSON files.
    #[arg(short = 'o', long, default_value = "output")]
    pub output: String,

    /// YAML file with scrape and search settings.
    #[arg(long)]
    pub config: Option<String>,

    /// YAML file overriding the built-in role prompts.
    #[arg(long)]
    pub templates: Option<String>,

    /// Maximum number of paper pages scraped for the analysis stage.
    #[arg(long, default_value_t = DEFAULT_SCRAPE_LIMIT)]
    pub scrape_limit: usize,
}
