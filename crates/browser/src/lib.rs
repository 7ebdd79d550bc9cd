//! Single-tab browser session driver (§4.1 `BrowserSession`).
//!
//! Grounded on the real Chromium adapter in the teacher's `cdp-adapter`
//! crate: this crate drives a single `chromiumoxide::Page` the way the
//! teacher's `CdpAdapter` drives many, but without the multi-page registry,
//! network tap, or event bus — one invocation owns exactly one tab.

pub mod error;
pub mod session;

pub use error::{classify_launch_failure, classify_step_failure};
pub use session::{BrowserSession, BrowserSessionConfig, CapturedState};

pub use webwatch_core_types::{ExtractKind, Step, StepAction, StepOutcome, WaitForState};
