#![allow(dead_code)]

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use tutorial_harness::cache::InMemoryCache;
use tutorial_harness::config::Config;
use tutorial_harness::error::GatewayError;
use tutorial_harness::llm::{CompletionGateway, CompletionProvider, ProviderResponse};
use tutorial_harness::pipeline::PipelineContext;
use tutorial_harness::retry::RetryPolicy;

pub const DISCOVERY: &str = "most important core abstractions";
pub const RELATIONSHIPS: &str = "key interactions between these abstractions";
pub const ORDERING: &str = "what is the best order to explain";
pub const CHAPTER: &str = "Write a very beginner-friendly tutorial chapter";

/// Answers prompts by stage. Each stage has a queue of responses; the last
/// response of a queue is repeated once the others are used up.
pub struct ScriptedProvider {
    rules: Vec<(&'static str, Mutex<VecDeque<String>>)>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn on(mut self, marker: &'static str, responses: &[&str]) -> Self {
        let queue = responses.iter().map(|s| s.to_string()).collect();
        self.rules.push((marker, Mutex::new(queue)));
        self
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    pub fn prompts_for(&self, marker: &str) -> Vec<String> {
        self.prompts()
            .into_iter()
            .filter(|p| p.contains(marker))
            .collect()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedProvider {
    fn name(&self) -> &str {
        "scripted"
    }

    async fn generate(&self, prompt: &str) -> Result<ProviderResponse, GatewayError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        for (marker, queue) in &self.rules {
            if prompt.contains(marker) {
                let mut queue = queue.lock().unwrap();
                let text = if queue.len() > 1 {
                    queue.pop_front().unwrap()
                } else {
                    queue.front().cloned().unwrap_or_default()
                };
                return Ok(ProviderResponse::stop(text));
            }
        }
        Err(GatewayError::Unavailable("no scripted response".into()))
    }
}

pub fn yaml(body: &str) -> String {
    format!("Here you go:\n\n```yaml\n{}\n```\n", body.trim())
}

pub fn gateway(provider: Arc<ScriptedProvider>) -> CompletionGateway {
    CompletionGateway::new(provider, Arc::new(InMemoryCache::new()))
}

/// Config with no pauses between attempts.
pub fn fast_config(max_attempts: u32) -> Config {
    let mut cfg = Config::minimal();
    cfg.pipeline.max_attempts = max_attempts;
    cfg.pipeline.backoff_base_ms = 0;
    cfg.pipeline.extraction_backoff_ms = 0;
    cfg
}

pub fn context(provider: Arc<ScriptedProvider>, max_attempts: u32) -> PipelineContext {
    let mut ctx = PipelineContext::from_config(&fast_config(max_attempts), gateway(provider));
    ctx.policy = RetryPolicy::immediate(max_attempts);
    ctx
}

/// A chapter body long enough to pass the length check.
pub fn chapter_text(words: &str) -> String {
    format!(
        "{}\n\nThis chapter walks through the idea step by step with a small example \
         and explains how the pieces fit together.",
        words
    )
}
