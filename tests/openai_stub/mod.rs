use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use serde_json::Value;

#[derive(Debug, Clone)]
pub struct OpenAiStubConfig {
    pub judge_behavior: JudgeBehavior,
    /// When set, every request is answered with this HTTP status.
    pub fail_with_status: Option<u16>,
}

impl Default for OpenAiStubConfig {
    fn default() -> Self {
        Self {
            judge_behavior: JudgeBehavior::AlwaysPass,
            fail_with_status: None,
        }
    }
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy)]
pub enum JudgeBehavior {
    AlwaysPass,
    FailThenPass,
    AlwaysFail,
}

#[allow(dead_code)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StubStage {
    Classify,
    Draft,
    Judge,
    Edit,
    Unknown,
}

pub struct OpenAiStub {
    pub base_url: String,
    calls: Arc<Mutex<Vec<StubStage>>>,
    prompts: Arc<Mutex<Vec<(StubStage, String)>>>,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl OpenAiStub {
    pub fn spawn(config: OpenAiStubConfig) -> Self {
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start openai stub server");
        let addr = server.server_addr();
        let base_url = format!("http://{addr}/v1");

        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();
        let calls = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&calls);
        let prompts = Arc::new(Mutex::new(Vec::new()));
        let recorded_prompts = Arc::clone(&prompts);

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
                if request.method() != &tiny_http::Method::Post || path != "/v1/chat/completions"
                {
                    let _ = request.respond(
                        tiny_http::Response::from_string("not found").with_status_code(404),
                    );
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

                let system = parsed
                    .pointer("/messages/0/content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("");
                let stage = stage_of(system);
                let prompt = parsed
                    .pointer("/messages/1/content")
                    .and_then(|v| v.as_str())
                    .unwrap_or("")
                    .to_owned();
                recorded_prompts
                    .lock()
                    .expect("lock stub prompts")
                    .push((stage, prompt));
                let judge_calls = {
                    let mut calls = recorded.lock().expect("lock stub calls");
                    calls.push(stage);
                    calls.iter().filter(|s| **s == StubStage::Judge).count()
                };

                if let Some(status) = config.fail_with_status {
                    let body = serde_json::json!({
                        "error": { "message": "stub is overloaded", "type": "server_error" }
                    });
                    let _ = request.respond(json_response(body, status));
                    continue;
                }

                let content = match stage {
                    StubStage::Classify => classifier_reply(),
                    StubStage::Draft => draft_reply(),
                    StubStage::Edit => edit_reply(),
                    StubStage::Judge => {
                        let pass = match config.judge_behavior {
                            JudgeBehavior::AlwaysPass => true,
                            JudgeBehavior::FailThenPass => judge_calls > 1,
                            JudgeBehavior::AlwaysFail => false,
                        };
                        judge_reply(pass)
                    }
                    StubStage::Unknown => {
                        let _ = request.respond(
                            tiny_http::Response::from_string("unknown system prompt")
                                .with_status_code(400),
                        );
                        continue;
                    }
                };

                let response_body = serde_json::json!({
                    "id": "chatcmpl_stub",
                    "object": "chat.completion",
                    "model": parsed.get("model").cloned().unwrap_or(Value::String("stub-model".to_owned())),
                    "choices": [
                        {
                            "index": 0,
                            "message": { "role": "assistant", "content": content },
                            "finish_reason": "stop"
                        }
                    ]
                });
                let _ = request.respond(json_response(response_body, 200));
            }
        });

        Self {
            base_url,
            calls,
            prompts,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    #[allow(dead_code)]
    pub fn calls(&self) -> Vec<StubStage> {
        self.calls.lock().expect("lock stub calls").clone()
    }

    /// User prompts received for `stage`, in arrival order.
    #[allow(dead_code)]
    pub fn prompts_for(&self, stage: StubStage) -> Vec<String> {
        self.prompts
            .lock()
            .expect("lock stub prompts")
            .iter()
            .filter(|(s, _)| *s == stage)
            .map(|(_, prompt)| prompt.clone())
            .collect()
    }

    #[allow(dead_code)]
    pub fn calls_for(&self, stage: StubStage) -> usize {
        self.calls().into_iter().filter(|s| *s == stage).count()
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

fn json_response(body: Value, status: u16) -> tiny_http::Response<std::io::Cursor<Vec<u8>>> {
    let header = tiny_http::Header::from_bytes(&b"Content-Type"[..], &b"application/json"[..])
        .expect("build header");
    tiny_http::Response::from_string(body.to_string())
        .with_status_code(status)
        .with_header(header)
}

fn stage_of(system: &str) -> StubStage {
    if system.contains("story brief classifier") {
        StubStage::Classify
    } else if system.contains("bedtime storyteller") {
        StubStage::Draft
    } else if system.contains("literature judge") {
        StubStage::Judge
    } else if system.contains("story editor") {
        StubStage::Edit
    } else {
        StubStage::Unknown
    }
}

fn classifier_reply() -> String {
    let brief = serde_json::json!({
        "title_hint": "Kit learns to share",
        "category": "learning-moral",
        "setting": "a warm farmhouse kitchen at night",
        "characters": ["Kit, a small grey kitten", "Mo, a kind field mouse"],
        "moral": "sharing",
        "tone": "gentle and soothing",
        "length_words": 500,
        "avoid_topics": ["Scary Dogs"],
        "age_range": "5-10"
    });
    format!("Here is the brief you asked for:\n```json\n{brief:#}\n```\n")
}

/// 12 paragraphs of 42 words each.
fn story_body() -> String {
    let paragraph = "Kit the kitten curled up by the warm fire and watched Mo the mouse \
carry a tiny ball of yarn across the quiet kitchen floor. \
\"Would you like to share it with me?\" asked Kit softly, and Mo smiled and said yes.";
    vec![paragraph; 12].join("\n\n")
}

fn draft_reply() -> String {
    format!("**Title:** Kit Learns to Share\n\n{}\n", story_body())
}

fn edit_reply() -> String {
    format!(
        "## Kit and Mo Share the Yarn ##\n\n{}\n\nSharing makes every night a little warmer.\n",
        story_body()
    )
}

fn judge_reply(pass: bool) -> String {
    let (requirements, issues, edit_instructions) = if pass {
        (9, Vec::new(), "")
    } else {
        (
            7,
            vec!["The sharing moment needs more warmth."],
            "Let Kit thank Mo before the fire dims.",
        )
    };
    serde_json::json!({
        "scores": {
            "age_fit": 9,
            "tone": 9,
            "structure": 8,
            "clarity": 9,
            "safety": 10,
            "bedtime_suitability": 8,
            "requirements_satisfaction": requirements
        },
        "pass": pass,
        "issues": issues,
        "edit_instructions": edit_instructions
    })
    .to_string()
}
