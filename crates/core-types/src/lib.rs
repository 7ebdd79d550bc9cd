//! Shared identifiers and error taxonomy used across the webwatch crates.

use std::fmt;

use thiserror::Error;
use uuid::Uuid;

pub mod model;
pub mod plan;

pub use model::{
    BrowserStateSnapshot, CacheEntry, ChangeRecord, ExecutionError, ExecutionMetrics,
    ExecutionMode, ExecutionResult, ExecutionStatus, InteractiveStep, MonitoringSample, Plan,
    PlanErrorHandling, PlanMetadata, PlanValidation, TaskInput, TaskOptions, TaskSignature,
    Viewport,
};
pub use plan::{ExtractKind, Step, StepAction, StepOutcome, WaitForState};

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Clone, Debug, Eq, PartialEq, Hash, serde::Serialize, serde::Deserialize)]
        pub struct $name(pub String);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4().to_string())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }
    };
}

uuid_id!(TaskId);
uuid_id!(PlanId);
uuid_id!(ExecutionId);
uuid_id!(CacheId);

/// Machine-readable error taxonomy shared by every component. Each variant
/// carries a stable `code()` and an optional JSON details bag so callers can
/// serialize errors without matching on display text.
#[derive(Debug, Error, Clone)]
pub enum WebWatchError {
    #[error("validation error: {message}")]
    Validation {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("plan generation failed: {message}")]
    PlanGeneration {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("browser execution failed at step {step_id:?}: {message}")]
    BrowserExecution {
        message: String,
        step_id: Option<String>,
        details: Option<serde_json::Value>,
    },

    #[error("navigation timed out: {message}")]
    NavigationTimeout {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("cache backend error: {message}")]
    CacheBackend {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("llm transport timed out: {message}")]
    TransportTimeout {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("llm rate limited, retry after {retry_after_seconds:?}s")]
    RateLimited {
        retry_after_seconds: Option<u64>,
        details: Option<serde_json::Value>,
    },

    #[error("plan not found")]
    PlanNotFound,

    #[error("internal error: {message}")]
    Internal {
        message: String,
        details: Option<serde_json::Value>,
    },
}

impl WebWatchError {
    /// Stable machine code, independent of the `Display` message.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation { .. } => "VALIDATION_ERROR",
            Self::PlanGeneration { .. } => "PLAN_GENERATION_ERROR",
            Self::BrowserExecution { .. } => "BROWSER_EXECUTION_ERROR",
            Self::NavigationTimeout { .. } => "NAVIGATION_TIMEOUT",
            Self::CacheBackend { .. } => "CACHE_BACKEND_ERROR",
            Self::TransportTimeout { .. } => "TRANSPORT_TIMEOUT",
            Self::RateLimited { .. } => "RATE_LIMITED",
            Self::PlanNotFound => "NO_CACHED_PLAN",
            Self::Internal { .. } => "INTERNAL_ERROR",
        }
    }

    /// Suggested HTTP status for the Lambda-shaped response envelope (§6).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::Validation { .. } => 400,
            Self::PlanNotFound => 404,
            Self::NavigationTimeout { .. } | Self::TransportTimeout { .. } => 408,
            Self::PlanGeneration { .. } => 422,
            _ => 500,
        }
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            details: None,
        }
    }

    pub fn plan_generation(message: impl Into<String>) -> Self {
        Self::PlanGeneration {
            message: message.into(),
            details: None,
        }
    }

    pub fn browser_execution(message: impl Into<String>, step_id: Option<String>) -> Self {
        Self::BrowserExecution {
            message: message.into(),
            step_id,
            details: None,
        }
    }

    pub fn navigation_timeout(message: impl Into<String>) -> Self {
        Self::NavigationTimeout {
            message: message.into(),
            details: None,
        }
    }

    pub fn cache_backend(message: impl Into<String>) -> Self {
        Self::CacheBackend {
            message: message.into(),
            details: None,
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        match &mut self {
            Self::Validation { details: d, .. }
            | Self::PlanGeneration { details: d, .. }
            | Self::BrowserExecution { details: d, .. }
            | Self::NavigationTimeout { details: d, .. }
            | Self::CacheBackend { details: d, .. }
            | Self::TransportTimeout { details: d, .. }
            | Self::RateLimited { details: d, .. }
            | Self::Internal { details: d, .. } => *d = Some(details),
            Self::PlanNotFound => {}
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_stringy() {
        let a = TaskId::new();
        let b = TaskId::new();
        assert_ne!(a, b);
        assert!(!a.0.is_empty());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(WebWatchError::validation("bad").code(), "VALIDATION_ERROR");
        assert_eq!(WebWatchError::PlanNotFound.code(), "NO_CACHED_PLAN");
        assert_eq!(WebWatchError::PlanNotFound.http_status(), 404);
        assert_eq!(WebWatchError::validation("bad").http_status(), 400);
    }

    #[test]
    fn details_can_be_attached() {
        let err = WebWatchError::browser_execution("selector not found", Some("step-2".into()))
            .with_details(serde_json::json!({"selector": ".price"}));
        match err {
            WebWatchError::BrowserExecution { details, step_id, .. } => {
                assert_eq!(step_id.as_deref(), Some("step-2"));
                assert!(details.is_some());
            }
            _ => panic!("wrong variant"),
        }
    }
}
