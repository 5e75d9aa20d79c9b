//! Error types for the execution-context kernel
//!
//! Two tiers exist: recoverable errors are `Result`s (`SerializeError` for
//! cross-context value transport, `ScriptError` for uncaught script
//! exceptions trapped per tick), while contract violations panic at the
//! violation site and are never represented here.

/// Failure to move a value across a context boundary
///
/// Surfaced to the caller as an ordinary error value; it never corrupts the
/// context that attempted the transfer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SerializeError {
    /// The value kind has no transportable representation
    #[error("value cannot be serialized for cross-context transport")]
    Unserializable,

    /// Unpack was attempted on a payload with no value
    #[error("transport payload is empty")]
    EmptyData,
}

/// An uncaught script exception captured by the per-tick error trap
///
/// Reported (message, resource name, line, stack trace when available) and
/// then discarded; the context survives to the next tick.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptError {
    /// Exception message text
    pub message: String,

    /// Name of the resource (script) the exception originated from
    pub resource_name: Option<String>,

    /// Line number within the originating resource
    pub line: Option<u32>,

    /// Engine-formatted stack trace, when one is available
    pub stack_trace: Option<String>,
}

impl ScriptError {
    /// Create an error carrying only a message
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            resource_name: None,
            line: None,
            stack_trace: None,
        }
    }

    /// Attach the originating resource name and line number
    pub fn with_location(mut self, resource_name: impl Into<String>, line: u32) -> Self {
        self.resource_name = Some(resource_name.into());
        self.line = Some(line);
        self
    }

    /// Attach an engine-formatted stack trace
    pub fn with_stack_trace(mut self, stack_trace: impl Into<String>) -> Self {
        self.stack_trace = Some(stack_trace.into());
        self
    }
}

impl From<SerializeError> for ScriptError {
    fn from(err: SerializeError) -> Self {
        ScriptError::new(format!("serialization error: {err}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_script_error_display() {
        let err = ScriptError::new("x is not defined");
        assert_eq!(err.to_string(), "x is not defined");
        assert!(err.resource_name.is_none());
        assert!(err.line.is_none());
    }

    #[test]
    fn test_script_error_location() {
        let err = ScriptError::new("boom").with_location("main.js", 12);
        assert_eq!(err.resource_name.as_deref(), Some("main.js"));
        assert_eq!(err.line, Some(12));
    }

    #[test]
    fn test_serialize_error_converts_to_script_error() {
        let err: ScriptError = SerializeError::Unserializable.into();
        assert!(err.message.contains("serialization error"));
    }
}
