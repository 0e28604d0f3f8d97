use crate::bean::ExclusionReason;
use std::fmt;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, CdiError>;

#[derive(Debug, Error)]
pub enum CdiError {
    #[error("Definition error: {message}")]
    Definition { message: String },

    #[error("Duplicate bean id: {id}")]
    DuplicateBean { id: String },

    #[error(
        "Unsatisfied dependency for type {required_type} and qualifiers {qualifiers}\n\t- injection point: {target}\n\t- reason: {reason}"
    )]
    UnsatisfiedResolution {
        required_type: String,
        qualifiers: String,
        target: String,
        reason: UnsatisfiedReason,
    },

    #[error(
        "Ambiguous dependencies for type {required_type} and qualifiers {qualifiers}\n\t- injection point: {target}\n\t- available beans: {}",
        .candidates.join(", ")
    )]
    AmbiguousResolution {
        required_type: String,
        qualifiers: String,
        target: String,
        candidates: Vec<String>,
    },

    #[error("Unproxyable dependency: {message}")]
    UnproxyableResolution { message: String },

    #[error("Context not active for scope {scope}")]
    ContextNotActive { scope: String },

    #[error("Context already active for scope {scope}")]
    ContextAlreadyActive { scope: String },

    #[error("Failed to create instance of {bean}: {cause}")]
    Creation { bean: String, cause: anyhow::Error },

    #[error("Invocation of {method} on {bean} failed: {cause}")]
    Invocation {
        bean: String,
        method: String,
        cause: anyhow::Error,
    },

    #[error("Bean {bean} cannot be viewed as {requested}")]
    TypeMismatch { bean: String, requested: String },

    #[error("Unknown bean: {id}")]
    UnknownBean { id: String },

    #[error("Container has been shut down")]
    ContainerShutDown,

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Shutdown did not complete within {timeout:?}")]
    ShutdownTimeout { timeout: Duration },

    #[error(transparent)]
    Deployment(#[from] DeploymentError),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl CdiError {
    pub fn definition(message: impl Into<String>) -> Self {
        Self::Definition {
            message: message.into(),
        }
    }

    pub fn creation(bean: impl fmt::Display, cause: anyhow::Error) -> Self {
        Self::Creation {
            bean: bean.to_string(),
            cause,
        }
    }

    pub fn context_not_active(scope: impl fmt::Display) -> Self {
        Self::ContextNotActive {
            scope: scope.to_string(),
        }
    }

    /// Errors that abort deployment rather than a single runtime call.
    pub fn is_deployment_error(&self) -> bool {
        matches!(
            self,
            Self::Definition { .. }
                | Self::DuplicateBean { .. }
                | Self::UnsatisfiedResolution { .. }
                | Self::AmbiguousResolution { .. }
                | Self::UnproxyableResolution { .. }
                | Self::Deployment(_)
        )
    }
}

/// Diagnostic detail for an unsatisfied injection point.
///
/// The variants only change the message; every one of them surfaces as
/// [`CdiError::UnsatisfiedResolution`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UnsatisfiedReason {
    NoTypeMatch,
    QualifierMismatch { available: Vec<String> },
    Excluded { bean: String, reason: ExclusionReason },
    RestrictedByTyped { bean: String },
}

impl fmt::Display for UnsatisfiedReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoTypeMatch => f.write_str("no bean has a matching type"),
            Self::QualifierMismatch { available } => write!(
                f,
                "beans of this type exist but none has the required qualifiers: {}",
                available.join("; ")
            ),
            Self::Excluded { bean, reason } => {
                write!(f, "bean {bean} matches but was removed: {reason}")
            }
            Self::RestrictedByTyped { bean } => write!(
                f,
                "bean {bean} implements the type but its bean types are restricted by typed()"
            ),
        }
    }
}

/// Every problem found while deploying a container, reported together.
#[derive(Debug)]
pub struct DeploymentError {
    errors: Vec<CdiError>,
}

impl DeploymentError {
    pub fn new(errors: Vec<CdiError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[CdiError] {
        &self.errors
    }

    pub fn into_errors(self) -> Vec<CdiError> {
        self.errors
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for DeploymentError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Found {} deployment problem(s):", self.errors.len())?;
        for (index, error) in self.errors.iter().enumerate() {
            write!(f, "\n[{}] {}", index + 1, error)?;
        }
        Ok(())
    }
}

impl std::error::Error for DeploymentError {}
