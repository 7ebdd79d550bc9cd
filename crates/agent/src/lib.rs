//! Interactive closed-loop agent (§4.6): drives a single `BrowserSession`
//! step by step, consulting an `LLMClient` through a `PromptStore`, scoring
//! progress until completion, stagnation, or the step budget is exhausted.
//!
//! Grounded on `crates/agent-core/src/agent_loop/{controller,types,config}.rs`
//! — the teacher's own observe → think → act loop — generalized here to
//! carry stagnation-window scoring, instruction-aware data parsing, and
//! trace→plan promotion instead of the teacher's generic `Done` signal.

mod data_parsing;
mod interactive;
mod trace;

pub use interactive::{InteractiveAgent, InteractiveAgentConfig, InteractiveRunMetadata, InteractiveRunOutcome};
pub use trace::promote as promote_trace;
