// Error and result types for the delegation layer
//
// INTENTION:
// Give every boundary that is cached or transported a tagged result type
// that serializes and later reconstructs losslessly, and give callers of
// the delegation machinery an error taxonomy that separates configuration
// mistakes, delivery failures, remote driver failures, and timeouts.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Failure raised by the delegation machinery.
///
/// The four variants match the four ways a delegated call can go wrong:
/// - `Config`: no delegate configured, unknown node or service id. Failing
///   immediately and never retried.
/// - `Transport`: the record could not be durably recorded or delivered.
/// - `Remote`: the far driver executed and raised; the error detail was
///   carried back in the response payload.
/// - `Timeout`: no correlated response within the deadline. Distinct from
///   `Remote` so callers can tell "definitely failed" from "unknown outcome".
#[derive(Debug, Error)]
pub enum DelegationError {
    #[error("delegation configuration error: {0}")]
    Config(String),

    #[error("delegation transport error: {0}")]
    Transport(String),

    #[error("remote driver failure ({class}): {message}")]
    Remote { class: String, message: String },

    #[error("no response within {0:?}")]
    Timeout(Duration),
}

/// Error detail that crosses node boundaries and cache entries.
///
/// Captures the failure as class + message strings so it serializes and
/// reconstructs without losing the caller-visible detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("{class}: {message}")]
pub struct RemoteError {
    pub class: String,
    pub message: String,
}

impl RemoteError {
    pub fn new(class: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            class: class.into(),
            message: message.into(),
        }
    }

    /// Capture an error raised by a driver or by nested delegation.
    pub fn from_anyhow(err: &anyhow::Error) -> Self {
        let class = if err.downcast_ref::<DelegationError>().is_some() {
            "DelegationError"
        } else if err.downcast_ref::<RemoteError>().is_some() {
            "RemoteError"
        } else {
            "DriverError"
        };
        Self::new(class, format!("{err:#}"))
    }
}

/// Tagged result used for every payload that is cached or transported.
///
/// Both arms deserialize without failure, so reading a cached or received
/// value never raises; callers match on the variant instead of catching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "value", rename_all = "snake_case")]
pub enum Outcome<T> {
    Ok(T),
    Err(RemoteError),
}

impl<T> Outcome<T> {
    /// Wrap a driver result, capturing the failure arm as a `RemoteError`.
    pub fn capture(result: anyhow::Result<T>) -> Self {
        match result {
            Ok(value) => Outcome::Ok(value),
            Err(err) => Outcome::Err(RemoteError::from_anyhow(&err)),
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, Outcome::Ok(_))
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    pub fn into_result(self) -> Result<T, RemoteError> {
        match self {
            Outcome::Ok(value) => Ok(value),
            Outcome::Err(err) => Err(err),
        }
    }
}

impl Outcome<serde_json::Value> {
    /// Re-type the success arm into the declared response shape.
    pub fn decode<T: DeserializeOwned>(self) -> Result<Outcome<T>, serde_json::Error> {
        Ok(match self {
            Outcome::Ok(value) => Outcome::Ok(serde_json::from_value(value)?),
            Outcome::Err(err) => Outcome::Err(err),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_round_trips_both_arms() {
        let ok: Outcome<u32> = Outcome::Ok(7);
        let json = serde_json::to_string(&ok).unwrap();
        assert_eq!(serde_json::from_str::<Outcome<u32>>(&json).unwrap(), ok);

        let err: Outcome<u32> = Outcome::Err(RemoteError::new("DriverError", "no credentials"));
        let json = serde_json::to_string(&err).unwrap();
        assert_eq!(serde_json::from_str::<Outcome<u32>>(&json).unwrap(), err);
    }

    #[test]
    fn capture_preserves_remote_detail() {
        let outcome: Outcome<u32> = Outcome::capture(Err(anyhow::anyhow!("quota exceeded")));
        match outcome {
            Outcome::Err(err) => {
                assert_eq!(err.class, "DriverError");
                assert!(err.message.contains("quota exceeded"));
            }
            Outcome::Ok(_) => panic!("expected error arm"),
        }
    }
}
