//! The five-stage proposal pipeline.
//!
//! Each stage sends a role prompt plus the previous stage's result to the
//! model and salvages JSON from the reply. A reply that cannot be salvaged
//! is forwarded as raw text instead of stopping the run.

use std::sync::Arc;

use anyhow::Context as _;
use serde_json::Value;

use crate::fetch::{PageFetchResult, WebFetcher};
use crate::formats::{Paper, PaperAnalysis, Proposal, RefinedIdea, SeedIdea, schema_of};
use crate::openai::LanguageModel;
use crate::prompts::PromptTemplates;
use crate::salvage::salvage_with_schema;
use crate::search::{SearchResponse, TavilySearcher};

pub const DEFAULT_SCRAPE_LIMIT: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    FindPapers,
    AnalyzePapers,
    GenerateIdeas,
    RefineIdeas,
    DevelopProposals,
}

impl Stage {
    pub const ALL: [Stage; 5] = [
        Stage::FindPapers,
        Stage::AnalyzePapers,
        Stage::GenerateIdeas,
        Stage::RefineIdeas,
        Stage::DevelopProposals,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::FindPapers => "find_papers",
            Stage::AnalyzePapers => "analyze_papers",
            Stage::GenerateIdeas => "generate_ideas",
            Stage::RefineIdeas => "refine_ideas",
            Stage::DevelopProposals => "develop_proposals",
        }
    }

    pub fn template_key(self) -> &'static str {
        match self {
            Stage::FindPapers => "research_paper_finder",
            Stage::AnalyzePapers => "research_paper_analyst",
            Stage::GenerateIdeas => "seed_idea_generator",
            Stage::RefineIdeas => "idea_refinement_specialist",
            Stage::DevelopProposals => "research_proposal_developer",
        }
    }

    pub fn description(self, seed_title: &str) -> String {
        match self {
            Stage::FindPapers => format!(
                "Find 5-7 high-quality, recent scientific papers related to '{seed_title}'. \
Focus on papers published in the last 3 years from reputable sources. \
Cover different aspects of the topic and current research trends. \
For each paper, give the title, authors, publication year, venue, URL, and a brief summary."
            ),
            Stage::AnalyzePapers => {
                "Analyze the related papers to identify key knowledge and limitations.".to_owned()
            }
            Stage::GenerateIdeas => "Generate initial research ideas based on the knowledge and \
limitations provided in the analyzed papers."
                .to_owned(),
            Stage::RefineIdeas => "Refine the generated seed ideas by expanding them and \
identifying key improvements."
                .to_owned(),
            Stage::DevelopProposals => {
                "Develop complete research proposals based on the refined research ideas."
                    .to_owned()
            }
        }
    }

    pub fn expected_output(self) -> &'static str {
        match self {
            Stage::FindPapers => {
                "A JSON list of papers with title, authors, year, venue, url and summary."
            }
            Stage::AnalyzePapers => {
                "A JSON object summarizing key_knowledge and limitations from the related papers."
            }
            Stage::GenerateIdeas => {
                "A JSON list of research ideas including idea_title, description, and rationale."
            }
            Stage::RefineIdeas => {
                "A JSON list of refined ideas including refined_idea_title, description, and impact."
            }
            Stage::DevelopProposals => {
                "A JSON list of research proposals including proposal_title, methodology, and expected_outcomes."
            }
        }
    }

    pub fn schema(self) -> Value {
        match self {
            Stage::FindPapers => schema_of::<Vec<Paper>>(),
            Stage::AnalyzePapers => schema_of::<PaperAnalysis>(),
            Stage::GenerateIdeas => schema_of::<Vec<SeedIdea>>(),
            Stage::RefineIdeas => schema_of::<Vec<RefinedIdea>>(),
            Stage::DevelopProposals => schema_of::<Vec<Proposal>>(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum StageOutput {
    Structured(Value),
    Raw(String),
}

impl StageOutput {
    pub fn from_model_text(stage: Stage, raw: String) -> Self {
        match salvage_with_schema(raw.as_str(), &stage.schema()) {
            Ok(value) => StageOutput::Structured(value),
            Err(err) => {
                tracing::warn!(
                    stage = stage.name(),
                    error = %err,
                    "stage output is not json; forwarding raw text"
                );
                StageOutput::Raw(raw)
            }
        }
    }

    pub fn structured(&self) -> Option<&Value> {
        match self {
            StageOutput::Structured(value) => Some(value),
            StageOutput::Raw(_) => None,
        }
    }

    pub fn as_context(&self) -> String {
        match self {
            StageOutput::Structured(value) => {
                serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
            }
            StageOutput::Raw(raw) => raw.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub outputs: Vec<(Stage, StageOutput)>,
    /// URLs whose pages were scraped into the analysis context.
    pub scraped_urls: Vec<String>,
}

impl PipelineRun {
    pub fn output(&self, stage: Stage) -> Option<&StageOutput> {
        self.outputs
            .iter()
            .find(|(s, _)| *s == stage)
            .map(|(_, output)| output)
    }

    pub fn proposals(&self) -> Option<&StageOutput> {
        self.output(Stage::DevelopProposals)
    }
}

pub struct Pipeline {
    model: Arc<dyn LanguageModel>,
    templates: PromptTemplates,
    searcher: Option<TavilySearcher>,
    fetcher: Option<WebFetcher>,
    scrape_limit: usize,
}

impl Pipeline {
    pub fn new(model: Arc<dyn LanguageModel>, templates: PromptTemplates) -> Self {
        Self {
            model,
            templates,
            searcher: None,
            fetcher: None,
            scrape_limit: DEFAULT_SCRAPE_LIMIT,
        }
    }

    pub fn with_searcher(mut self, searcher: TavilySearcher) -> Self {
        self.searcher = Some(searcher);
        self
    }

    pub fn with_fetcher(mut self, fetcher: WebFetcher, scrape_limit: usize) -> Self {
        self.fetcher = Some(fetcher);
        self.scrape_limit = scrape_limit;
        self
    }

    pub async fn run(&self, seed_title: &str) -> anyhow::Result<PipelineRun> {
        let search = self.search(seed_title).await;

        let mut find_context = vec![format!("Input paper: {seed_title}")];
        if let (Some(search), Some(searcher)) = (&search, &self.searcher) {
            find_context.push(format!(
                "Web search results:\n{}",
                search.render(searcher.config().include_answer)
            ));
        }
        let papers = self
            .run_stage(Stage::FindPapers, seed_title, &find_context)
            .await?;

        let urls = scrape_targets(&papers, search.as_ref(), self.scrape_limit);
        let (scraped_urls, pages) = self.scrape(&urls).await;
        let mut analysis_context = vec![format!("Related papers:\n{}", papers.as_context())];
        analysis_context.extend(pages);
        let analysis = self
            .run_stage(Stage::AnalyzePapers, seed_title, &analysis_context)
            .await?;

        let ideas = self
            .run_stage(
                Stage::GenerateIdeas,
                seed_title,
                &[format!("Paper analysis:\n{}", analysis.as_context())],
            )
            .await?;
        let refined = self
            .run_stage(
                Stage::RefineIdeas,
                seed_title,
                &[format!("Seed ideas:\n{}", ideas.as_context())],
            )
            .await?;
        let proposals = self
            .run_stage(
                Stage::DevelopProposals,
                seed_title,
                &[format!("Refined ideas:\n{}", refined.as_context())],
            )
            .await?;

        Ok(PipelineRun {
            outputs: vec![
                (Stage::FindPapers, papers),
                (Stage::AnalyzePapers, analysis),
                (Stage::GenerateIdeas, ideas),
                (Stage::RefineIdeas, refined),
                (Stage::DevelopProposals, proposals),
            ],
            scraped_urls,
        })
    }

    async fn search(&self, seed_title: &str) -> Option<SearchResponse> {
        let searcher = self.searcher.as_ref()?;
        match searcher.search(seed_title).await {
            Ok(response) => Some(response),
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "search failed; continuing without results");
                None
            }
        }
    }

    async fn scrape(&self, urls: &[String]) -> (Vec<String>, Vec<String>) {
        let Some(fetcher) = self.fetcher.as_ref() else {
            return (Vec::new(), Vec::new());
        };

        let mut scraped = Vec::new();
        let mut pages = Vec::new();
        for url in urls {
            match fetcher.fetch_and_extract(url).await {
                PageFetchResult::Page(page) => {
                    pages.push(format!("Scraped page {url}:\n{}", page.render()));
                    scraped.push(url.clone());
                }
                other => {
                    tracing::warn!(%url, reason = %other.render(), "skipping source");
                }
            }
        }
        (scraped, pages)
    }

    async fn run_stage(
        &self,
        stage: Stage,
        seed_title: &str,
        context: &[String],
    ) -> anyhow::Result<StageOutput> {
        let instructions = self
            .templates
            .get(stage.template_key())
            .with_context(|| format!("load template for stage {}", stage.name()))?;
        let input = stage_input(stage, seed_title, context);

        tracing::info!(stage = stage.name(), "running stage");
        let raw = self
            .model
            .complete(instructions, &input)
            .await
            .with_context(|| format!("run stage {}", stage.name()))?;

        let output = StageOutput::from_model_text(stage, raw);
        tracing::info!(
            stage = stage.name(),
            structured = output.structured().is_some(),
            "stage finished"
        );
        Ok(output)
    }
}

pub fn stage_input(stage: Stage, seed_title: &str, context: &[String]) -> String {
    let schema = serde_json::to_string_pretty(&stage.schema()).unwrap_or_default();
    format!(
        "Stage: {name}\n\
\n\
Task: {description}\n\
\n\
Expected output: {expected}\n\
\n\
Advisory JSON schema:\n\
{schema}\n\
\n\
BEGIN_CONTEXT\n\
{context}\n\
END_CONTEXT\n\
\n\
Output ONLY the JSON value (no commentary).\n",
        name = stage.name(),
        description = stage.description(seed_title),
        expected = stage.expected_output(),
        context = context.join("\n\n"),
    )
}

/// Paper URLs from the salvaged paper list, else search hit URLs.
fn scrape_targets(
    papers: &StageOutput,
    search: Option<&SearchResponse>,
    limit: usize,
) -> Vec<String> {
    let from_papers = papers
        .structured()
        .map(|value| {
            let items = match value {
                Value::Array(items) => items.as_slice(),
                Value::Object(map) => map
                    .get("papers")
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or_default(),
                _ => &[],
            };
            items
                .iter()
                .filter_map(|paper| paper.get("url").and_then(Value::as_str))
                .filter(|url| url.starts_with("http://") || url.starts_with("https://"))
                .map(str::to_owned)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    let urls = if from_papers.is_empty() {
        search
            .map(|s| s.urls().map(str::to_owned).collect())
            .unwrap_or_default()
    } else {
        from_papers
    };

    let mut seen = std::collections::HashSet::new();
    urls.into_iter()
        .filter(|url| seen.insert(url.clone()))
        .take(limit)
        .collect()
}
