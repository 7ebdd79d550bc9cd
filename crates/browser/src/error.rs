use webwatch_core_types::WebWatchError;

/// Converts a low-level adapter failure into the shared error taxonomy.
/// Kept as a free function (mirrors the teacher's `AgentError` helper
/// constructors) rather than a `From` impl, since the right variant depends
/// on *which* operation failed, not just the underlying error type.
pub fn classify_launch_failure(message: impl Into<String>) -> WebWatchError {
    WebWatchError::internal(format!("browser launch failed: {}", message.into()))
}

pub fn classify_step_failure(step_id: &str, message: impl Into<String>) -> WebWatchError {
    let message = message.into();
    let lowered = message.to_ascii_lowercase();
    if lowered.contains("timeout") || lowered.contains("timed out") {
        WebWatchError::navigation_timeout(message)
    } else {
        WebWatchError::browser_execution(message, Some(step_id.to_string()))
    }
}
