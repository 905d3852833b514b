//! The deepfin agent: an agentic deep-search loop over web research.
//!
//! The loop alternates three model-driven stages until it can answer:
//! a planner turns the conversation into search queries, a research pipeline
//! searches, crawls, and summarizes the results, and a decider judges whether
//! the evidence suffices. The answer streams token by token, survives client
//! disconnects through a resumable stream hub, and persists alongside the
//! conversation at run boundaries.
//!
//! `DeepSearch` wires everything together; the individual stages are public
//! for callers that want a different composition.

pub mod answer;
pub mod decider;
pub mod deep_search;
pub mod hub;
pub mod loop_runner;
pub mod pipeline;
pub mod planner;
pub mod summarizer;

#[cfg(test)]
pub(crate) mod test_helpers;

pub use answer::{AnswerStream, AnswerSynthesizer, FinishHook};
pub use decider::ActionDecider;
pub use deep_search::{DeepSearch, DeepSearchRequest};
pub use hub::{AnswerEvent, StreamHub};
pub use loop_runner::{DeepSearchLoop, ResearchOutcome, RunOptions};
pub use pipeline::ResearchPipeline;
pub use planner::{QueryPlan, QueryPlanner};
pub use summarizer::{PageContext, Summarizer};
