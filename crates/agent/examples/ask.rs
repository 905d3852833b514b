//! Ask one question end to end against real providers.
//!
//! Requires `OPENROUTER_API_KEY` and `SERPER_API_KEY` in the environment:
//!
//! ```sh
//! cargo run -p deepfin-agent --example ask -- "Who won the 2024 Tour de France?"
//! ```

use deepfin_agent::{DeepSearch, DeepSearchRequest, RunOptions};
use deepfin_config::AppConfig;
use deepfin_core::{Annotation, AnnotationSink, Message};
use deepfin_providers::{BulkCrawler, OpenRouterModel, SerperSearch};
use deepfin_ratelimit::SlidingWindowLimiter;
use deepfin_store::{InMemoryStreamRegistry, InMemoryThreadStore};
use std::io::Write;
use std::sync::Arc;
use uuid::Uuid;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let question = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "What is the capital of France?".into());

    let config = AppConfig::from_env()?;
    let openrouter_key = config
        .providers
        .openrouter_api_key
        .clone()
        .ok_or("OPENROUTER_API_KEY is not set")?;
    let serper_key = config
        .providers
        .serper_api_key
        .clone()
        .ok_or("SERPER_API_KEY is not set")?;

    let mut model = OpenRouterModel::new(openrouter_key);
    if let Some(base) = &config.providers.openrouter_base_url {
        model = model.with_base_url(base);
    }
    let mut search = SerperSearch::new(serper_key);
    if let Some(base) = &config.providers.serper_base_url {
        search = search.with_base_url(base);
    }

    let agent = DeepSearch::new(
        &config,
        Arc::new(model),
        Arc::new(search),
        Arc::new(BulkCrawler::new()),
        Arc::new(InMemoryThreadStore::new()),
        Arc::new(InMemoryStreamRegistry::new()),
        Arc::new(SlidingWindowLimiter::new()),
    );

    let sink: AnnotationSink = Arc::new(|annotation| match annotation {
        Annotation::NewAction { action } => eprintln!("[action] {}", action.title()),
        Annotation::Sources { sources } => eprintln!("[sources] {} found", sources.len()),
    });
    let opts = RunOptions {
        annotation_sink: sink,
        ..RunOptions::default()
    };

    let request = DeepSearchRequest {
        user_id: "local".into(),
        thread_id: Uuid::new_v4().to_string(),
        messages: vec![Message::user(&question)],
    };

    let mut stream = agent.stream(request, opts, Box::new(|_| {})).await?;
    while let Some(token) = stream.next_token().await {
        print!("{token}");
        std::io::stdout().flush()?;
    }
    println!();
    Ok(())
}
