use serde::{Deserialize, Serialize};

use crate::data::WireValue;

/// The response envelope published on a result topic.
///
/// `error` is present if and only if `success` is `false`, while `value` is
/// present only for successful operations which declare a response type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Response {
    /// Whether the operation completed correctly on the device.
    pub success: bool,
    /// Error message reported by the device.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Encoded result.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<WireValue>,
}

impl Response {
    /// Generates a successful [`Response`] without a value.
    #[must_use]
    pub const fn ok() -> Self {
        Self {
            success: true,
            error: None,
            value: None,
        }
    }

    /// Generates a successful [`Response`] carrying a value.
    #[must_use]
    pub const fn with_value(value: WireValue) -> Self {
        Self {
            success: true,
            error: None,
            value: Some(value),
        }
    }

    /// Generates a failed [`Response`].
    ///
    /// An empty message is replaced by a generic one, so a failed response
    /// always explains itself.
    #[must_use]
    pub fn failure(error: impl Into<String>) -> Self {
        let mut error = error.into();
        if error.is_empty() {
            error.push_str("unknown device error");
        }

        Self {
            success: false,
            error: Some(error),
            value: None,
        }
    }
}
