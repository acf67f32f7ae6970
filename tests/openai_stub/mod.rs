//! Local stand-in for the model API, the search API, and paper pages.
//!
//! Serves `POST /v1/responses` (answering per `Stage:` marker),
//! `POST /search`, and `GET /papers/<n>` HTML on one loopback server.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct OpenAiStubConfig {
    pub proposal_behavior: ProposalBehavior,
    /// Fail the analysis stage unless scraped page text reached it.
    pub require_scraped_context: bool,
    /// Fail the paper search stage unless search results reached it.
    pub require_search_context: bool,
}

impl Default for OpenAiStubConfig {
    fn default() -> Self {
        Self {
            proposal_behavior: ProposalBehavior::FencedJson,
            require_scraped_context: false,
            require_search_context: false,
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum ProposalBehavior {
    FencedJson,
    Prose,
}

pub const PAPER_TEXT: &str = "Sparse attention reduces compute for long scientific sequences.";

pub struct OpenAiStub {
    pub base_url: String,
    pub search_base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let origin = format!("http://{addr}");
        let base_url = format!("{origin}/v1");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let page_origin = origin.clone();
        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }

                let mut request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let path = request.url().to_string();
                if request.method() == &tiny_http::Method::Get {
                    let response = match path.as_str() {
                        "/papers/1" => html_response(&format!(
                            "<html><head><title>Sparse Attention</title></head><body>\
<article><h1>Sparse Attention</h1><p>{PAPER_TEXT}</p></article></body></html>"
                        )),
                        _ => tiny_http::Response::from_string("not found").with_status_code(404),
                    };
                    let _ = request.respond(response);
                    continue;
                }

                let mut body = String::new();
                if request.as_reader().read_to_string(&mut body).is_err() {
                    let _ = request.respond(
                        tiny_http::Response::from_string("invalid request body")
                            .with_status_code(400),
                    );
                    continue;
                }
                let parsed: Value = match serde_json::from_str(&body) {
                    Ok(value) => value,
                    Err(_) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("invalid json").with_status_code(400),
                        );
                        continue;
                    }
                };

                if path == "/search" {
                    let _ = request.respond(json_response(&search_response(&page_origin)));
                    continue;
                }
                if path != "/v1/responses" {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
                    continue;
                }

                let Some(prompt) = parsed.get("input").and_then(|v| v.as_str()) else {
                    let _ = request.respond(
                        tiny_http::Response::from_string("missing input").with_status_code(400),
                    );
                    continue;
                };

                let output_text = match stage_response(prompt, &page_origin, &config) {
                    Ok(text) => text,
                    Err(err) => {
                        let _ = request.respond(
                            tiny_http::Response::from_string(format!(
                                "failed to build stage response: {err}"
                            ))
                            .with_status_code(400),
                        );
                        continue;
                    }
                };

                let response_body = serde_json::json!({
                    "id": "resp_stub",
                    "object": "response",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "output": [
                        {
                            "type": "message",
                            "role": "assistant",
                            "content": [
                                { "type": "output_text", "text": output_text }
                            ]
                        }
                    ],
                    "output_text": output_text
                });
                let _ = request.respond(json_response(&response_body));
            }
        });

        Self {
            base_url,
            search_base_url: origin,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }
}

impl Drop for OpenAiStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn json_response(body: &Value) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(200)
        .with_header(header)
}

fn html_response(body: &str) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header =
        tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"text/html; charset=utf-8"[..])
            .expect("build header");
    tiny_http::Response::from_string(body)
        .with_status_code(200)
        .with_header(header)
}

fn search_response(origin: &str) -> Value {
    serde_json::json!({
        "answer": "Sparse attention is an active area.",
        "results": [
            {
                "title": "Sparse Attention",
                "url": format!("{origin}/papers/1"),
                "content": "A survey of sparse attention.",
                "score": 0.9
            }
        ]
    })
}

fn stage_response(
    prompt: &str,
    origin: &str,
    config: &OpenAiStubConfig,
) -> anyhow::Result<String> {
    let stage = prompt
        .lines()
        .next()
        .and_then(|line| line.strip_prefix("Stage: "))
        .ok_or_else(|| anyhow::anyhow!("missing stage marker"))?;

    let text = match stage {
        "find_papers" => {
            if config.require_search_context && !prompt.contains("Search Results:") {
                anyhow::bail!("search results missing from find_papers input");
            }
            serde_json::json!([
                {
                    "title": "Sparse Attention",
                    "authors": "A. Author",
                    "year": 2024,
                    "url": format!("{origin}/papers/1"),
                    "summary": "Sparse attention."
                },
                {
                    "title": "Missing Paper",
                    "authors": "B. Author",
                    "url": format!("{origin}/papers/404")
                }
            ])
            .to_string()
        }
        "analyze_papers" => {
            if config.require_scraped_context && !prompt.contains(PAPER_TEXT) {
                anyhow::bail!("scraped page text missing from analyze_papers input");
            }
            "Here is the analysis: {\"key_knowledge\": [\"sparsity helps\"], \"limitations\": [\"few benchmarks\"]}".to_owned()
        }
        "generate_ideas" => "[{\"idea_title\": \"Adaptive sparsity\", \"description\": \"d\", \"rationale\": \"r\"}]".to_owned(),
        "refine_ideas" => "I could not produce JSON for this step.".to_owned(),
        "develop_proposals" => match config.proposal_behavior {
            ProposalBehavior::FencedJson => "```json\n[\n  {\"proposal_title\": \"Adaptive Sparse Attention\", \"methodology\": [\"benchmark\", \"ablate\"], \"expected_outcomes\": \"Faster models\"}\n]\n```".to_owned(),
            ProposalBehavior::Prose => "Proposal: study adaptive sparsity.".to_owned(),
        },
        other => anyhow::bail!("unknown stage: {other}"),
    };
    Ok(text)
}
