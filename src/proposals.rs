use std::collections::HashSet;
use std::fs::OpenOptions;
use std::io::Write as _;
use std::path::{Path, PathBuf};

use anyhow::Context as _;
use serde_json::{Map, Value};

use crate::formats::field_text;

const DEFAULT_TITLE: &str = "research_proposal";

/// Replaces every non-alphanumeric character with `_` and lowercases.
pub fn sanitize_title(title: &str) -> String {
    title
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect::<String>()
        .to_lowercase()
}

pub fn proposal_filename(proposal: &Map<String, Value>) -> String {
    let title = proposal
        .get("proposal_title")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_TITLE);
    let clean = sanitize_title(title);
    match proposal
        .get("timestamp")
        .and_then(Value::as_str)
        .filter(|t| !t.is_empty())
    {
        Some(timestamp) => format!("{clean}_{timestamp}.json"),
        None => format!("{clean}.json"),
    }
}

pub fn save_proposal(out_dir: &Path, proposal: &Map<String, Value>) -> anyhow::Result<PathBuf> {
    write_proposal(out_dir, &proposal_filename(proposal), proposal)
}

/// Saves a batch so that every proposal gets its own file.
///
/// A filename already taken earlier in the batch gets a `_2`, `_3`, ... suffix.
pub fn save_proposals(
    out_dir: &Path,
    proposals: &[Map<String, Value>],
) -> anyhow::Result<Vec<PathBuf>> {
    let mut taken = HashSet::new();
    let mut paths = Vec::with_capacity(proposals.len());
    for proposal in proposals {
        let filename = proposal_filename(proposal);
        let mut unique = filename.clone();
        let mut n = 1;
        while !taken.insert(unique.clone()) {
            n += 1;
            unique = with_suffix(&filename, n);
        }
        if unique != filename {
            tracing::warn!(%filename, renamed = %unique, "proposal filename already used in this run");
        }
        paths.push(write_proposal(out_dir, &unique, proposal)?);
    }
    Ok(paths)
}

fn with_suffix(filename: &str, n: usize) -> String {
    let stem = filename.strip_suffix(".json").unwrap_or(filename);
    format!("{stem}_{n}.json")
}

fn write_proposal(
    out_dir: &Path,
    filename: &str,
    proposal: &Map<String, Value>,
) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(out_dir)
        .with_context(|| format!("create output dir: {}", out_dir.display()))?;

    let path = out_dir.join(filename);
    let json = serde_json::to_string_pretty(proposal).context("serialize proposal")?;

    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(&path)
        .with_context(|| format!("open proposal output: {}", path.display()))?;
    file.write_all(json.as_bytes())
        .with_context(|| format!("write proposal: {}", path.display()))?;
    file.flush()
        .with_context(|| format!("flush proposal: {}", path.display()))?;

    tracing::info!(path = %path.display(), "saved research proposal");
    Ok(path)
}

pub fn load_proposal(path: &Path) -> anyhow::Result<Map<String, Value>> {
    if !path.exists() {
        anyhow::bail!("proposal file not found: {}", path.display());
    }
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("read proposal: {}", path.display()))?;
    let proposal = serde_json::from_str(&raw)
        .with_context(|| format!("parse proposal: {}", path.display()))?;
    tracing::info!(path = %path.display(), "loaded research proposal");
    Ok(proposal)
}

/// Proposal objects in the final stage output.
///
/// Accepts a list of proposals, an object with a `proposals` list, or a
/// single proposal object. Non-object list items are skipped.
pub fn collect_proposals(value: &Value) -> Vec<Map<String, Value>> {
    let items: Vec<&Value> = match value {
        Value::Array(items) => items.iter().collect(),
        Value::Object(map) => match map.get("proposals") {
            Some(Value::Array(items)) => items.iter().collect(),
            _ => vec![value],
        },
        _ => Vec::new(),
    };

    items
        .into_iter()
        .filter_map(|item| item.as_object().cloned())
        .collect()
}

pub fn render_summary(proposals: &[(Map<String, Value>, PathBuf)]) -> String {
    let mut out = format!("Generated {} research proposals:\n", proposals.len());
    for (idx, (proposal, path)) in proposals.iter().enumerate() {
        out.push_str(&format!(
            "\nProposal {n}:\nTitle: {title}\nMethodology: {methodology}\nExpected Outcomes: {outcomes}\nSaved to: {path}\n",
            n = idx + 1,
            title = field_text(proposal.get("proposal_title")),
            methodology = field_text(proposal.get("methodology")),
            outcomes = field_text(proposal.get("expected_outcomes")),
            path = path.display(),
        ));
    }
    out
}

pub fn render_unparsed(raw: &str) -> String {
    format!("Result was not in expected JSON format:\n{raw}\n")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn sanitize_replaces_non_alphanumerics_and_lowercases() {
        assert_eq!(sanitize_title("Graph-Based RL: A Study!"), "graph_based_rl__a_study_");
        assert_eq!(sanitize_title("Über Modelle"), "über_modelle");
    }

    #[test]
    fn filename_uses_timestamp_when_present() {
        let with = object(json!({"proposal_title": "Deep Nets", "timestamp": "20240101_120000"}));
        assert_eq!(proposal_filename(&with), "deep_nets_20240101_120000.json");

        let without = object(json!({"methodology": "x"}));
        assert_eq!(proposal_filename(&without), "research_proposal.json");
    }

    #[test]
    fn save_creates_dir_and_round_trips() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let out_dir = temp.path().join("nested").join("output");
        let proposal = object(json!({
            "proposal_title": "Étude des réseaux",
            "methodology": ["survey", "experiments"],
            "expected_outcomes": "A benchmark",
        }));

        let path = save_proposal(&out_dir, &proposal)?;
        assert_eq!(path, out_dir.join("étude_des_réseaux.json"));

        let raw = std::fs::read_to_string(&path)?;
        assert!(raw.contains("\n  \"proposal_title\": \"Étude des réseaux\""));
        assert_eq!(load_proposal(&path)?, proposal);
        Ok(())
    }

    #[test]
    fn clashing_filenames_get_numbered() -> anyhow::Result<()> {
        let temp = tempfile::TempDir::new()?;
        let proposals = vec![
            object(json!({"methodology": "first", "timestamp": "20240101_000000"})),
            object(json!({"methodology": "second", "timestamp": "20240101_000000"})),
            object(json!({"methodology": "third", "timestamp": "20240101_000000"})),
        ];

        let paths = save_proposals(temp.path(), &proposals)?;

        assert_eq!(
            paths,
            vec![
                temp.path().join("research_proposal_20240101_000000.json"),
                temp.path().join("research_proposal_20240101_000000_2.json"),
                temp.path().join("research_proposal_20240101_000000_3.json"),
            ]
        );
        for (path, proposal) in paths.iter().zip(&proposals) {
            assert_eq!(&load_proposal(path)?, proposal);
        }
        Ok(())
    }

    #[test]
    fn load_missing_file_fails() {
        assert!(load_proposal(Path::new("/nonexistent/proposal.json")).is_err());
    }

    #[test]
    fn collect_accepts_list_wrapper_and_single_object() {
        assert_eq!(collect_proposals(&json!([{"a": 1}, 2, {"b": 2}])).len(), 2);
        assert_eq!(collect_proposals(&json!({"proposals": [{"a": 1}]})).len(), 1);
        assert_eq!(collect_proposals(&json!({"proposal_title": "x"})).len(), 1);
        assert!(collect_proposals(&json!("text")).is_empty());
    }

    #[test]
    fn summary_lists_each_proposal() {
        let proposal = object(json!({
            "proposal_title": "T",
            "methodology": "M",
        }));
        let summary = render_summary(&[(proposal, PathBuf::from("output/t.json"))]);
        assert_eq!(
            summary,
            "Generated 1 research proposals:\n\nProposal 1:\nTitle: T\nMethodology: M\nExpected Outcomes: N/A\nSaved to: output/t.json\n"
        );
    }
}
