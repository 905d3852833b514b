//! The deep-search loop state machine: plan, research, decide, repeat.
//!
//! One round is planner, pipeline, decider, in that order. The loop ends on
//! the first of an `answer` verdict or the step budget running out; the
//! forced case marks the answer as a final attempt so synthesis hedges.

use crate::decider::ActionDecider;
use crate::pipeline::ResearchPipeline;
use crate::planner::QueryPlanner;
use deepfin_core::error::ModelError;
use deepfin_core::{Action, Annotation, AnnotationSink, Error, Message, ResearchState};
use deepfin_core::null_sink;
use std::future::Future;
use std::sync::{Arc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Per-run knobs that are not part of the loop's construction.
pub struct RunOptions {
    /// Telemetry correlation id attached to every model call.
    pub trace_id: Option<String>,

    /// Observer for annotations; also collected onto the final message.
    pub annotation_sink: AnnotationSink,

    /// Cancels the run at the next boundary.
    pub cancel: CancellationToken,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            trace_id: None,
            annotation_sink: null_sink(),
            cancel: CancellationToken::new(),
        }
    }
}

/// Everything the loop produced, ready for answer synthesis.
#[derive(Debug)]
pub struct ResearchOutcome {
    pub state: ResearchState,
    /// True when the answer was forced by the step budget.
    pub is_final: bool,
    /// Every annotation emitted during the run, in emission order.
    pub annotations: Vec<Annotation>,
}

/// The plan-research-decide loop.
pub struct DeepSearchLoop {
    planner: QueryPlanner,
    pipeline: ResearchPipeline,
    decider: ActionDecider,
    step_limit: u32,
}

impl DeepSearchLoop {
    pub fn new(
        planner: QueryPlanner,
        pipeline: ResearchPipeline,
        decider: ActionDecider,
        step_limit: u32,
    ) -> Self {
        Self {
            planner,
            pipeline,
            decider,
            step_limit,
        }
    }

    /// Run the loop to the point where the answer can be synthesized.
    ///
    /// Planner and decider failures are fatal; search, crawl, and summary
    /// failures degrade inside the pipeline and never surface here.
    pub async fn run(
        &self,
        messages: Vec<Message>,
        opts: &RunOptions,
    ) -> Result<ResearchOutcome, Error> {
        let mut state = ResearchState::new(messages);

        let collected: Arc<Mutex<Vec<Annotation>>> = Arc::default();
        let sink: AnnotationSink = {
            let collected = Arc::clone(&collected);
            let caller = Arc::clone(&opts.annotation_sink);
            Arc::new(move |annotation: &Annotation| {
                collected
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner())
                    .push(annotation.clone());
                caller(annotation);
            })
        };
        let trace_id = opts.trace_id.as_deref();

        let is_final = loop {
            if opts.cancel.is_cancelled() {
                return Err(Error::Cancelled);
            }

            let plan = with_cancel(&opts.cancel, self.planner.plan(&state, trace_id)).await?;
            info!(
                step = state.step(),
                queries = plan.queries.len(),
                "Starting research round"
            );

            self.pipeline
                .run(&mut state, &plan.queries, &sink, &opts.cancel, trace_id)
                .await;

            let action = with_cancel(&opts.cancel, self.decider.decide(&state, trace_id)).await?;
            sink(&Annotation::NewAction {
                action: action.clone(),
            });
            state.increment_step();

            match action {
                Action::Answer { .. } => break false,
                Action::Continue { feedback, .. } => {
                    state.set_feedback(feedback);
                    if state.should_stop(self.step_limit) {
                        debug!(step = state.step(), "Step budget exhausted, forcing the answer");
                        break true;
                    }
                }
            }
        };

        let annotations = collected
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        Ok(ResearchOutcome {
            state,
            is_final,
            annotations,
        })
    }
}

async fn with_cancel<T>(
    cancel: &CancellationToken,
    fut: impl Future<Output = Result<T, ModelError>>,
) -> Result<T, Error> {
    tokio::select! {
        _ = cancel.cancelled() => Err(Error::Cancelled),
        result = fut => result.map_err(Error::from),
    }
}
