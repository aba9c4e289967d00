use std::fmt;

use serde::{Deserialize, Serialize};

use crate::request::OperationKind;

const OPERATION_PREFIX: &str = "operation";
const RESULT_PREFIX: &str = "result";
const ALARM_PREFIX: &str = "alarm";

/// A publish/subscribe topic.
///
/// Topic names are case-sensitive and their segments are separated by dots:
///
/// - `operation.<kind>.<deviceId>` carries the requests for a device
/// - `result.<kind>.<deviceId>.<requestId>` carries the reply to one request
/// - `alarm.<deviceId>` carries the alarms reported by a device
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Topic(String);

impl Topic {
    /// Creates a [`Topic`] from an arbitrary name.
    #[must_use]
    pub const fn new(value: String) -> Self {
        Self(value)
    }

    /// The topic on which a device receives the requests of the given
    /// [`OperationKind`].
    #[must_use]
    pub fn operation(kind: OperationKind, device_id: &str) -> Self {
        Self(format!("{OPERATION_PREFIX}.{kind}.{device_id}"))
    }

    /// The topic on which the reply to a single request is published.
    #[must_use]
    pub fn result(kind: OperationKind, device_id: &str, request_id: &str) -> Self {
        Self(format!("{RESULT_PREFIX}.{kind}.{device_id}.{request_id}"))
    }

    /// The topic on which a device reports its alarms.
    #[must_use]
    pub fn alarm(device_id: &str) -> Self {
        Self(format!("{ALARM_PREFIX}.{device_id}"))
    }

    /// Returns the [`Topic`] as a [`&str`].
    #[inline]
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl AsRef<str> for Topic {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use crate::request::OperationKind;

    use super::Topic;

    #[test]
    fn topic_names() {
        assert_eq!(
            Topic::operation(OperationKind::Get, "d1").as_str(),
            "operation.get.d1"
        );
        assert_eq!(
            Topic::result(OperationKind::Action, "d1", "42").as_str(),
            "result.action.d1.42"
        );
        assert_eq!(Topic::alarm("d1").as_str(), "alarm.d1");
    }

    #[test]
    fn case_sensitive() {
        assert_ne!(
            Topic::operation(OperationKind::Set, "D1"),
            Topic::operation(OperationKind::Set, "d1")
        );
    }
}
