use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::cli::GenerateArgs;
use crate::config::{Environment, ToolConfig};
use crate::fetch::WebFetcher;
use crate::openai::{OpenAiConfig, OpenAiModel};
use crate::pipeline::{Pipeline, PipelineRun, StageOutput};
use crate::prompts::PromptTemplates;
use crate::proposals::{collect_proposals, render_summary, render_unparsed, save_proposals};
use crate::search::TavilySearcher;

pub const TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

pub async fn run(args: GenerateArgs, env: &Environment) -> anyhow::Result<()> {
    let tools = match &args.config {
        Some(path) => ToolConfig::load(Path::new(path))?,
        None => ToolConfig::default(),
    };
    let templates = match &args.templates {
        Some(path) => PromptTemplates::load(Path::new(path)).context("load templates")?,
        None => PromptTemplates::builtin().context("load builtin templates")?,
    };

    let model = OpenAiModel::new(OpenAiConfig::from_environment(env)?)?;
    let fetcher = WebFetcher::new(tools.scrape()).context("build web fetcher")?;
    let mut pipeline =
        Pipeline::new(Arc::new(model), templates).with_fetcher(fetcher, args.scrape_limit);

    match env.tavily_api_key.clone() {
        Some(key) => {
            let searcher = TavilySearcher::new(key, tools.search(&env.tavily_base_url))
                .context("build search client")?;
            pipeline = pipeline.with_searcher(searcher);
        }
        None => tracing::warn!("TAVILY_API_KEY is not set; skipping web search"),
    }

    tracing::info!(title = %args.title, "generate: pipeline");
    let run = pipeline.run(&args.title).await.context("pipeline")?;

    tracing::info!(out = %args.output, "generate: save proposals");
    let report = save_outputs(&run, Path::new(&args.output), &timestamp_now())
        .context("save proposals")?;

    let mut stdout = std::io::stdout().lock();
    stdout
        .write_all(report.as_bytes())
        .context("write summary")?;
    stdout.flush().context("flush stdout")?;
    Ok(())
}

pub fn timestamp_now() -> String {
    chrono::Utc::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Saves each proposal in the final stage output and returns the text to print.
///
/// Output that holds no proposal objects is echoed back unparsed.
pub fn save_outputs(run: &PipelineRun, out_dir: &Path, timestamp: &str) -> anyhow::Result<String> {
    let Some(final_output) = run.proposals() else {
        anyhow::bail!("pipeline produced no proposal stage output");
    };

    let mut proposals = match final_output {
        StageOutput::Structured(value) => collect_proposals(value),
        StageOutput::Raw(_) => Vec::new(),
    };
    if proposals.is_empty() {
        tracing::warn!("final output holds no proposals");
        return Ok(render_unparsed(&final_output.as_context()));
    }

    for proposal in &mut proposals {
        stamp(proposal, timestamp);
    }
    let paths = save_proposals(out_dir, &proposals)?;
    let saved: Vec<(Map<String, Value>, PathBuf)> = proposals.into_iter().zip(paths).collect();
    Ok(render_summary(&saved))
}

fn stamp(proposal: &mut Map<String, Value>, timestamp: &str) {
    let missing = proposal
        .get("timestamp")
        .and_then(Value::as_str)
        .is_none_or(str::is_empty);
    if missing {
        proposal.insert("timestamp".to_owned(), Value::String(timestamp.to_owned()));
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::pipeline::Stage;

    fn run_with(final_output: StageOutput) -> PipelineRun {
        PipelineRun {
            outputs: vec![(Stage::DevelopProposals, final_output)],
            scraped_urls: Vec::new(),
        }
    }

    #[test]
    fn proposals_are_stamped_and_saved() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let run = run_with(StageOutput::Structured(json!([
            {"proposal_title": "Alpha", "methodology": "M", "expected_outcomes": "E"},
            {"proposal_title": "Beta", "timestamp": "20200101_000000"},
        ])));

        let report = save_outputs(&run, temp.path(), "20240102_030405")?;

        assert!(report.starts_with("Generated 2 research proposals:\n"));
        assert!(temp.path().join("alpha_20240102_030405.json").is_file());
        assert!(temp.path().join("beta_20200101_000000.json").is_file());
        Ok(())
    }

    #[test]
    fn untitled_proposals_each_get_a_file() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let run = run_with(StageOutput::Structured(json!([
            {"methodology": "first"},
            {"methodology": "second"},
        ])));

        let report = save_outputs(&run, temp.path(), "20240102_030405")?;

        assert_eq!(std::fs::read_dir(temp.path())?.count(), 2);
        assert!(report.contains("Saved to: "));
        assert!(report.contains("research_proposal_20240102_030405.json\n"));
        assert!(report.contains("research_proposal_20240102_030405_2.json\n"));
        Ok(())
    }

    #[test]
    fn raw_final_output_is_echoed() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let run = run_with(StageOutput::Raw("Here are my thoughts.".to_owned()));

        let report = save_outputs(&run, temp.path(), "20240102_030405")?;

        assert_eq!(
            report,
            "Result was not in expected JSON format:\nHere are my thoughts.\n"
        );
        assert_eq!(std::fs::read_dir(temp.path())?.count(), 0);
        Ok(())
    }

    #[test]
    fn timestamp_has_compact_shape() {
        let ts = timestamp_now();
        assert_eq!(ts.len(), 15);
        assert_eq!(ts.as_bytes()[8], b'_');
    }
}
