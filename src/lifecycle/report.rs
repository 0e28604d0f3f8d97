//! Contained destruction failures

use anyhow::anyhow;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use thiserror::Error;

/// The destruction step that failed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DestructionPhase {
    PreDestroy,
    Disposer,
    Interceptor { interceptor: String },
    Decorator { decorator: String },
}

impl fmt::Display for DestructionPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PreDestroy => f.write_str("pre-destroy"),
            Self::Disposer => f.write_str("disposer"),
            Self::Interceptor { interceptor } => write!(f, "interceptor {interceptor} pre-destroy"),
            Self::Decorator { decorator } => write!(f, "decorator {decorator} pre-destroy"),
        }
    }
}

/// A destruction callback that failed or panicked
///
/// Never propagated: it is logged where it happens and collected into a
/// [`DestructionReport`].
#[derive(Debug, Error)]
#[error("Destruction of {bean} failed during {phase}: {cause}")]
pub struct DestructionError {
    pub bean: String,
    pub phase: DestructionPhase,
    pub cause: anyhow::Error,
}

impl DestructionError {
    pub fn new(bean: impl Into<String>, phase: DestructionPhase, cause: anyhow::Error) -> Self {
        Self {
            bean: bean.into(),
            phase,
            cause,
        }
    }
}

/// Outcome of a best-effort destruction batch
#[derive(Debug, Default)]
pub struct DestructionReport {
    destroyed: Vec<String>,
    failures: Vec<DestructionError>,
}

impl DestructionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_destroyed(&mut self, bean: impl Into<String>) {
        self.destroyed.push(bean.into());
    }

    /// Log the failure and keep going
    pub fn record_failure(&mut self, failure: DestructionError) {
        tracing::error!("{}", failure);
        self.failures.push(failure);
    }

    pub fn merge(&mut self, other: DestructionReport) {
        self.destroyed.extend(other.destroyed);
        self.failures.extend(other.failures);
    }

    /// Bean ids in the order their instances were destroyed
    pub fn destroyed(&self) -> &[String] {
        &self.destroyed
    }

    pub fn failures(&self) -> &[DestructionError] {
        &self.failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }
}

/// Run a user callback, turning a panic into an error.
pub(crate) fn contain_panic<T, F>(hook: F) -> anyhow::Result<T>
where
    F: FnOnce() -> anyhow::Result<T>,
{
    match panic::catch_unwind(AssertUnwindSafe(hook)) {
        Ok(result) => result,
        Err(payload) => Err(anyhow!("panicked: {}", panic_message(payload.as_ref()))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_panics_are_contained() {
        let result = contain_panic::<(), _>(|| panic!("boom"));
        assert_eq!(result.unwrap_err().to_string(), "panicked: boom");
        assert!(contain_panic(|| Ok(())).is_ok());
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut first = DestructionReport::new();
        first.record_destroyed("a");
        let mut second = DestructionReport::new();
        second.record_destroyed("b");
        second.record_failure(DestructionError::new(
            "b",
            DestructionPhase::PreDestroy,
            anyhow!("closed twice"),
        ));
        first.merge(second);
        assert_eq!(first.destroyed(), ["a", "b"]);
        assert!(!first.is_clean());
        assert_eq!(
            first.failures()[0].to_string(),
            "Destruction of b failed during pre-destroy: closed twice"
        );
    }
}
