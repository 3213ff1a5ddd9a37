//! Host exceptions.

use std::any::Any;

use serde::Serialize;
use thiserror::Error;

/// An exception raised by host code, a replacement or the interpreter.
///
/// `inner` forms the chain reported in crash reports; `trace` lists the
/// methods the exception unwound through, innermost first.
#[derive(Debug, Clone, Error, Serialize)]
#[error("{type_name}: {message}")]
pub struct Exception {
    pub type_name: String,
    pub message: String,
    #[source]
    pub inner: Option<Box<Exception>>,
    pub trace: Vec<String>,
}

impl Exception {
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            message: message.into(),
            inner: None,
            trace: Vec::new(),
        }
    }

    /// Raised by `throw` with the popped message.
    pub fn thrown(message: impl Into<String>) -> Self {
        Self::new("Exception", message)
    }

    pub fn invalid_program(message: impl Into<String>) -> Self {
        Self::new("InvalidProgramException", message)
    }

    pub fn invalid_cast(message: impl Into<String>) -> Self {
        Self::new("InvalidCastException", message)
    }

    pub fn missing_method(message: impl Into<String>) -> Self {
        Self::new("MissingMethodException", message)
    }

    /// Wraps a caught panic payload.
    pub fn from_panic(payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic with a non-string payload".to_string());
        Self::new("Panic", message)
    }

    pub fn with_inner(mut self, inner: Exception) -> Self {
        self.inner = Some(Box::new(inner));
        self
    }

    /// Records that the exception unwound through `frame`.
    pub fn push_frame(&mut self, frame: impl Into<String>) {
        self.trace.push(frame.into());
    }

    /// This exception followed by its inner exceptions, outermost first.
    pub fn chain(&self) -> impl Iterator<Item = &Exception> {
        std::iter::successors(Some(self), |e| e.inner.as_deref())
    }
}
