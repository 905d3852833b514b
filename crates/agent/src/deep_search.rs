//! The deep-search facade: admission control, thread persistence, stream
//! registration, loop execution, and answer streaming behind one entry point.
//!
//! Persistence happens only at run boundaries. The incoming conversation is
//! upserted before the loop starts; the assistant message is appended once
//! the answer stream completes, inside the finish hook.

use crate::answer::{AnswerStream, AnswerSynthesizer, FinishHook};
use crate::decider::ActionDecider;
use crate::hub::{AnswerEvent, StreamHub};
use crate::loop_runner::{DeepSearchLoop, RunOptions};
use crate::pipeline::ResearchPipeline;
use crate::planner::QueryPlanner;
use crate::summarizer::Summarizer;
use deepfin_config::AppConfig;
use deepfin_core::crawl::CrawlProvider;
use deepfin_core::search::SearchProvider;
use deepfin_core::store::{StreamRegistry, ThreadStore, UpsertThread};
use deepfin_core::{Error, LanguageModel, Message, Role};
use deepfin_ratelimit::{RateLimitConfig, RateLimiter};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use uuid::Uuid;

const TITLE_MAX_CHARS: usize = 50;

/// One request into the loop: whose thread, and the full conversation so far
/// ending with the new user message.
#[derive(Debug, Clone)]
pub struct DeepSearchRequest {
    pub user_id: String,
    pub thread_id: String,
    pub messages: Vec<Message>,
}

/// The assembled deep-search system.
pub struct DeepSearch {
    loop_runner: DeepSearchLoop,
    answerer: AnswerSynthesizer,
    threads: Arc<dyn ThreadStore>,
    streams: Arc<dyn StreamRegistry>,
    limiter: Arc<dyn RateLimiter>,
    rate_config: RateLimitConfig,
    hub: StreamHub,
}

impl DeepSearch {
    pub fn new(
        config: &AppConfig,
        model: Arc<dyn LanguageModel>,
        search: Arc<dyn SearchProvider>,
        crawl: Arc<dyn CrawlProvider>,
        threads: Arc<dyn ThreadStore>,
        streams: Arc<dyn StreamRegistry>,
        limiter: Arc<dyn RateLimiter>,
    ) -> Self {
        let planner = QueryPlanner::new(Arc::clone(&model), &config.models.plan);
        let decider = ActionDecider::new(Arc::clone(&model), &config.models.decide);
        let summarizer = Summarizer::new(Arc::clone(&model), &config.models.summarize);
        let answerer = AnswerSynthesizer::new(Arc::clone(&model), &config.models.answer);
        let pipeline = ResearchPipeline::new(
            search,
            crawl,
            summarizer,
            config.search.results_per_query,
        );

        Self {
            loop_runner: DeepSearchLoop::new(
                planner,
                pipeline,
                decider,
                config.search.step_limit,
            ),
            answerer,
            threads,
            streams,
            limiter,
            rate_config: RateLimitConfig {
                max_requests: config.rate_limit.max_requests,
                window_ms: config.rate_limit.window_ms,
                max_retries: config.rate_limit.max_retries,
                key_prefix: config.rate_limit.key_prefix.clone(),
            },
            hub: StreamHub::new(),
        }
    }

    /// Run the loop for one request and stream the answer.
    ///
    /// `on_finish` is called exactly once with the persisted assistant
    /// message; dropping the returned stream does not abort the run.
    pub async fn stream(
        &self,
        request: DeepSearchRequest,
        opts: RunOptions,
        on_finish: FinishHook,
    ) -> Result<AnswerStream, Error> {
        if !self.limiter.check(&self.rate_config).await.allowed {
            warn!(thread_id = %request.thread_id, "Admission denied, entering retry");
            if !self.limiter.retry(&self.rate_config).await {
                return Err(Error::RateLimited);
            }
        }
        self.limiter.record(&self.rate_config).await;

        // The conversation is durable before any model call happens.
        let title = request
            .messages
            .iter()
            .find(|m| m.role == Role::User)
            .map(|m| derive_title(&m.content));
        self.threads
            .upsert_thread(UpsertThread {
                user_id: request.user_id.clone(),
                thread_id: request.thread_id.clone(),
                title,
                messages: request.messages.clone(),
            })
            .await?;

        let stream_id = Uuid::new_v4().to_string();
        self.streams
            .append_stream_id(&request.thread_id, &stream_id)
            .await?;
        let live = self.hub.open(&stream_id);

        info!(thread_id = %request.thread_id, stream_id = %stream_id, "Starting deep search");

        let outcome = match self.loop_runner.run(request.messages.clone(), &opts).await {
            Ok(outcome) => outcome,
            Err(e) => {
                self.hub.close(&stream_id);
                return Err(e);
            }
        };

        let hook = self.persisting_hook(
            request.user_id,
            request.thread_id,
            request.messages,
            stream_id.clone(),
            on_finish,
        );

        let tokens = match self
            .answerer
            .answer(
                &outcome.state,
                outcome.is_final,
                opts.trace_id.as_deref(),
                outcome.annotations,
                Some(live),
                hook,
            )
            .await
        {
            Ok(tokens) => tokens,
            Err(e) => {
                self.hub.close(&stream_id);
                return Err(Error::from(e));
            }
        };

        Ok(AnswerStream::new(stream_id, tokens))
    }

    /// Reattach to a thread's answer: a live stream when one exists, else a
    /// one-shot replay of the completed assistant message.
    pub async fn resume(&self, user_id: &str, thread_id: &str) -> Result<AnswerStream, Error> {
        let ids = self.streams.get_stream_ids(thread_id).await?;
        if let Some(recent) = ids.most_recent_stream_id {
            if let Some(mut events) = self.hub.subscribe(&recent) {
                info!(thread_id, stream_id = %recent, "Resuming live stream");
                let (tx, tokens) = mpsc::channel(64);
                tokio::spawn(async move {
                    loop {
                        match events.recv().await {
                            Ok(AnswerEvent::Token(token)) => {
                                if tx.send(token).await.is_err() {
                                    return;
                                }
                            }
                            Ok(AnswerEvent::Done(_)) => return,
                            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                                warn!(skipped, "Resume subscriber lagged, dropping tokens");
                            }
                            Err(broadcast::error::RecvError::Closed) => return,
                        }
                    }
                });
                return Ok(AnswerStream::new(recent, tokens));
            }
        }

        if let Some(thread) = self.threads.get_thread(user_id, thread_id).await? {
            if let Some(last) = thread.messages.last() {
                if last.role == Role::Assistant {
                    info!(thread_id, "Replaying completed answer");
                    let (tx, tokens) = mpsc::channel(1);
                    let content = last.content.clone();
                    tokio::spawn(async move {
                        let _ = tx.send(content).await;
                    });
                    return Ok(AnswerStream::new(format!("replay-{}", Uuid::new_v4()), tokens));
                }
            }
        }

        Err(Error::StreamNotFound {
            thread_id: thread_id.to_string(),
        })
    }

    /// One-shot convenience: run a single question in a throwaway thread and
    /// return the complete answer text.
    pub async fn ask(&self, question: &str) -> Result<String, Error> {
        let request = DeepSearchRequest {
            user_id: "local".into(),
            thread_id: Uuid::new_v4().to_string(),
            messages: vec![Message::user(question)],
        };
        let stream = self
            .stream(request, RunOptions::default(), Box::new(|_| {}))
            .await?;
        Ok(stream.collect_text().await)
    }

    /// Wrap the caller's finish hook so the assistant message is persisted
    /// and the live stream deregistered before the caller observes completion.
    fn persisting_hook(
        &self,
        user_id: String,
        thread_id: String,
        prior_messages: Vec<Message>,
        stream_id: String,
        on_finish: FinishHook,
    ) -> FinishHook {
        let threads = Arc::clone(&self.threads);
        let hub = self.hub.clone();

        Box::new(move |message: Message| {
            tokio::spawn(async move {
                let mut messages = prior_messages;
                messages.push(message.clone());
                if let Err(e) = threads
                    .upsert_thread(UpsertThread {
                        user_id,
                        thread_id: thread_id.clone(),
                        title: None,
                        messages,
                    })
                    .await
                {
                    error!(thread_id = %thread_id, error = %e, "Failed to persist answer");
                }
                hub.close(&stream_id);
                on_finish(message);
            });
        })
    }
}

fn derive_title(content: &str) -> String {
    let mut title: String = content.chars().take(TITLE_MAX_CHARS).collect();
    if content.chars().count() > TITLE_MAX_CHARS {
        title.push_str("...");
    }
    title
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{hit, ScriptedCrawl, ScriptedModel, ScriptedSearch};
    use async_trait::async_trait;
    use deepfin_core::error::ModelError;
    use deepfin_core::model::{ObjectRequest, TextRequest, TokenChunk};
    use deepfin_ratelimit::SlidingWindowLimiter;
    use deepfin_store::{InMemoryStreamRegistry, InMemoryThreadStore};
    use tokio::sync::{oneshot, Notify};

    struct Fixture {
        model: ScriptedModel,
        search: ScriptedSearch,
        crawl: ScriptedCrawl,
        threads: Arc<InMemoryThreadStore>,
        streams: Arc<InMemoryStreamRegistry>,
        ds: DeepSearch,
    }

    fn fixture(config: AppConfig) -> Fixture {
        let model = ScriptedModel::new();
        let search = ScriptedSearch::new();
        let crawl = ScriptedCrawl::new();
        let threads = Arc::new(InMemoryThreadStore::new());
        let streams = Arc::new(InMemoryStreamRegistry::new());
        let ds = DeepSearch::new(
            &config,
            Arc::new(model.clone()),
            Arc::new(search.clone()),
            Arc::new(crawl.clone()),
            threads.clone(),
            streams.clone(),
            Arc::new(SlidingWindowLimiter::new()),
        );
        Fixture {
            model,
            search,
            crawl,
            threads,
            streams,
            ds,
        }
    }

    fn script_capital_of_france(f: &Fixture) {
        f.model.push_object(serde_json::json!({
            "plan": "Look up the capital.",
            "queries": ["capital of France"],
        }));
        f.model.push_object(serde_json::json!({
            "type": "answer",
            "title": "Answering",
            "reasoning": "The capital is well established",
        }));
        f.search.map(
            "capital of France",
            vec![hit(
                "France - Wikipedia",
                "https://en.wikipedia.org/wiki/France",
                "Country in Western Europe",
            )],
        );
        f.crawl.page_ok(
            "https://en.wikipedia.org/wiki/France",
            "Paris is the capital and largest city of France.",
        );
        f.model
            .map_text("largest city", "Paris has long been the capital of France.");
        f.model.push_text("Paris is the capital of France.");
    }

    fn request() -> DeepSearchRequest {
        DeepSearchRequest {
            user_id: "u1".into(),
            thread_id: "t1".into(),
            messages: vec![Message::user("What is the capital of France?")],
        }
    }

    #[tokio::test]
    async fn capital_of_france_end_to_end() {
        let f = fixture(AppConfig::default());
        script_capital_of_france(&f);

        let (done_tx, done_rx) = oneshot::channel();
        let stream = f
            .ds
            .stream(
                request(),
                RunOptions::default(),
                Box::new(move |message| {
                    let _ = done_tx.send(message);
                }),
            )
            .await
            .unwrap();

        let text = stream.collect_text().await;
        assert_eq!(text, "Paris is the capital of France.");

        // The finish hook fires after persistence.
        let message = done_rx.await.unwrap();
        assert!(message
            .annotations
            .iter()
            .any(|a| matches!(a, deepfin_core::Annotation::Sources { .. })));
        assert!(message.annotations.iter().any(|a| matches!(
            a,
            deepfin_core::Annotation::NewAction { action } if action.is_answer()
        )));

        let thread = f.threads.get_thread("u1", "t1").await.unwrap().unwrap();
        assert_eq!(thread.title, "What is the capital of France?");
        assert_eq!(thread.messages.len(), 2);
        assert_eq!(thread.messages[1].content, "Paris is the capital of France.");

        let ids = f.streams.get_stream_ids("t1").await.unwrap();
        assert_eq!(ids.stream_ids.len(), 1);
    }

    #[tokio::test]
    async fn admission_denial_is_an_error_before_any_work() {
        let mut config = AppConfig::default();
        config.rate_limit.max_requests = 1;
        config.rate_limit.max_retries = 0;

        let f = fixture(config);
        script_capital_of_france(&f);

        let (done_tx, done_rx) = oneshot::channel();
        let stream = f
            .ds
            .stream(
                request(),
                RunOptions::default(),
                Box::new(move |m| {
                    let _ = done_tx.send(m);
                }),
            )
            .await
            .unwrap();
        stream.collect_text().await;
        done_rx.await.unwrap();

        let calls_before = f.model.object_requests().len();
        let err = f
            .ds
            .stream(request(), RunOptions::default(), Box::new(|_| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::RateLimited));
        // Denial happened before planning.
        assert_eq!(f.model.object_requests().len(), calls_before);
    }

    #[tokio::test]
    async fn resume_replays_the_completed_answer() {
        let f = fixture(AppConfig::default());
        script_capital_of_france(&f);

        let (done_tx, done_rx) = oneshot::channel();
        let stream = f
            .ds
            .stream(
                request(),
                RunOptions::default(),
                Box::new(move |m| {
                    let _ = done_tx.send(m);
                }),
            )
            .await
            .unwrap();
        stream.collect_text().await;
        done_rx.await.unwrap();

        let replay = f.ds.resume("u1", "t1").await.unwrap();
        assert_eq!(replay.collect_text().await, "Paris is the capital of France.");
    }

    #[tokio::test]
    async fn resume_without_stream_or_answer_is_not_found() {
        let f = fixture(AppConfig::default());
        let err = f.ds.resume("u1", "missing").await.unwrap_err();
        assert!(matches!(err, Error::StreamNotFound { .. }));
    }

    #[tokio::test]
    async fn foreign_thread_upsert_is_rejected() {
        let f = fixture(AppConfig::default());
        f.threads
            .upsert_thread(UpsertThread {
                user_id: "someone-else".into(),
                thread_id: "t1".into(),
                title: Some("theirs".into()),
                messages: vec![],
            })
            .await
            .unwrap();

        let err = f
            .ds
            .stream(request(), RunOptions::default(), Box::new(|_| {}))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Store(_)));
    }

    #[test]
    fn titles_are_truncated_with_ellipsis() {
        let long = "a".repeat(80);
        let title = derive_title(&long);
        assert_eq!(title.chars().count(), TITLE_MAX_CHARS + 3);
        assert!(title.ends_with("..."));

        assert_eq!(derive_title("short"), "short");
    }

    /// A model whose answer stream pauses until released, for testing live
    /// resume mid-answer.
    struct GatedModel {
        inner: ScriptedModel,
        gate: Arc<Notify>,
    }

    #[async_trait]
    impl LanguageModel for GatedModel {
        fn name(&self) -> &str {
            "gated"
        }

        async fn generate_object(
            &self,
            request: ObjectRequest,
        ) -> std::result::Result<serde_json::Value, ModelError> {
            self.inner.generate_object(request).await
        }

        async fn generate_text(
            &self,
            request: TextRequest,
        ) -> std::result::Result<String, ModelError> {
            self.inner.generate_text(request).await
        }

        async fn stream_text(
            &self,
            _request: TextRequest,
        ) -> std::result::Result<
            mpsc::Receiver<std::result::Result<TokenChunk, ModelError>>,
            ModelError,
        > {
            let (tx, rx) = mpsc::channel(4);
            let gate = Arc::clone(&self.gate);
            tokio::spawn(async move {
                let _ = tx
                    .send(Ok(TokenChunk {
                        content: Some("Paris".into()),
                        done: false,
                    }))
                    .await;
                gate.notified().await;
                let _ = tx
                    .send(Ok(TokenChunk {
                        content: Some(" is the capital.".into()),
                        done: false,
                    }))
                    .await;
                let _ = tx.send(Ok(TokenChunk {
                    content: None,
                    done: true,
                }))
                .await;
            });
            Ok(rx)
        }
    }

    #[tokio::test]
    async fn resume_attaches_to_a_live_stream() {
        let scripted = ScriptedModel::new();
        scripted.push_object(serde_json::json!({ "plan": "p", "queries": ["q"] }));
        scripted.push_object(serde_json::json!({
            "type": "answer",
            "title": "Answering",
            "reasoning": "r",
        }));
        let gate = Arc::new(Notify::new());
        let model = GatedModel {
            inner: scripted,
            gate: Arc::clone(&gate),
        };

        let threads = Arc::new(InMemoryThreadStore::new());
        let streams = Arc::new(InMemoryStreamRegistry::new());
        let ds = DeepSearch::new(
            &AppConfig::default(),
            Arc::new(model),
            Arc::new(ScriptedSearch::new()),
            Arc::new(ScriptedCrawl::new()),
            threads,
            streams,
            Arc::new(SlidingWindowLimiter::new()),
        );

        let mut primary = ds
            .stream(request(), RunOptions::default(), Box::new(|_| {}))
            .await
            .unwrap();

        // First token consumed, so the pump is demonstrably mid-stream.
        assert_eq!(primary.next_token().await.as_deref(), Some("Paris"));

        let resumed = ds.resume("u1", "t1").await.unwrap();
        gate.notify_one();

        assert_eq!(resumed.collect_text().await, " is the capital.");
        assert_eq!(primary.next_token().await.as_deref(), Some(" is the capital."));
        assert!(primary.next_token().await.is_none());
    }
}
