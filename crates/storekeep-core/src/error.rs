#![forbid(unsafe_code)]

//! Error types shared across storekeep crates.

use thiserror::Error;

pub type Result<T, E = DisposeError> = std::result::Result<T, E>;

/// A single owned resource failed to release.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to release {resource}: {message}")]
pub struct ReleaseError {
    /// Label of the resource that failed (usually its type name).
    pub resource: String,
    /// What went wrong.
    pub message: String,
}

impl ReleaseError {
    #[must_use]
    pub fn new(resource: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            resource: resource.into(),
            message: message.into(),
        }
    }
}

/// Disposal finished, but some owned resources reported failures.
///
/// The rest of the disposal sequence still ran: every other resource was
/// released, the teardown hook was called, and observers were notified.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DisposeError {
    #[error("{tag}: {} owned resource(s) failed to release", failures.len())]
    Release {
        tag: String,
        failures: Vec<ReleaseError>,
    },
}

impl DisposeError {
    /// The individual release failures.
    #[must_use]
    pub fn failures(&self) -> &[ReleaseError] {
        match self {
            Self::Release { failures, .. } => failures,
        }
    }
}

/// A capability was used without the collaborator that backs it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CapabilityError {
    #[error("capability `{0}` is not available")]
    Missing(&'static str),
}

/// A managed type could not be produced.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FactoryError {
    #[error("{tag}: capability `{capability}` requires a collaborator the factory was not given")]
    MissingCapability {
        tag: String,
        capability: &'static str,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispose_error_message_counts_failures() {
        let err = DisposeError::Release {
            tag: "Counter".into(),
            failures: vec![
                ReleaseError::new("a", "boom"),
                ReleaseError::new("b", "bang"),
            ],
        };
        assert_eq!(
            err.to_string(),
            "Counter: 2 owned resource(s) failed to release"
        );
        assert_eq!(err.failures().len(), 2);
        assert_eq!(
            err.failures()[0].to_string(),
            "failed to release a: boom"
        );
    }

    #[test]
    fn factory_error_names_capability() {
        let err = FactoryError::MissingCapability {
            tag: "Clock".into(),
            capability: "timers",
        };
        assert!(err.to_string().contains("`timers`"));
        assert!(err.to_string().starts_with("Clock:"));
    }
}
