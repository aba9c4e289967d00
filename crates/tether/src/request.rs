use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::data::WireValue;

/// All operation kinds.
pub const ALL_OPERATION_KINDS: &[OperationKind] =
    &[OperationKind::Get, OperationKind::Set, OperationKind::Action];

/// The kind of an operation requested to a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    /// Read an attribute.
    Get,
    /// Write an attribute.
    Set,
    /// Invoke an action.
    Action,
}

impl OperationKind {
    /// Returns the [`OperationKind`] name, as it appears in topics.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Get => "get",
            Self::Set => "set",
            Self::Action => "action",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.as_str().fmt(f)
    }
}

/// A request envelope which cannot be interpreted as an operation.
#[derive(Debug, Clone, PartialEq)]
pub struct EnvelopeError(Cow<'static, str>);

impl EnvelopeError {
    fn new(description: impl Into<Cow<'static, str>>) -> Self {
        Self(description.into())
    }
}

impl fmt::Display for EnvelopeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid request envelope: {}", self.0)
    }
}

impl std::error::Error for EnvelopeError {}

/// The request envelope published on an operation topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Request {
    /// Identifier of the call, generated by the caller.
    pub request_id: String,
    /// Identifier of the target device.
    pub device_id: String,
    /// Attribute name, for `get` and `set`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attribute: Option<String>,
    /// Action name, for `action`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<String>,
    /// Encoded value, for `set` and for actions with a request type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<WireValue>,
}

impl Request {
    /// Creates a `get` [`Request`].
    #[must_use]
    pub fn get(request_id: &str, device_id: &str, attribute: &str) -> Self {
        Self {
            request_id: request_id.into(),
            device_id: device_id.into(),
            attribute: Some(attribute.into()),
            action: None,
            value: None,
        }
    }

    /// Creates a `set` [`Request`].
    #[must_use]
    pub fn set(request_id: &str, device_id: &str, attribute: &str, value: WireValue) -> Self {
        Self {
            request_id: request_id.into(),
            device_id: device_id.into(),
            attribute: Some(attribute.into()),
            action: None,
            value: Some(value),
        }
    }

    /// Creates an `action` [`Request`].
    #[must_use]
    pub fn action(
        request_id: &str,
        device_id: &str,
        action: &str,
        value: Option<WireValue>,
    ) -> Self {
        Self {
            request_id: request_id.into(),
            device_id: device_id.into(),
            attribute: None,
            action: Some(action.into()),
            value,
        }
    }

    /// Interprets the envelope as an operation of the given kind.
    ///
    /// # Errors
    ///
    /// The envelope lacks a field required by the operation kind or carries
    /// one which belongs to another kind.
    pub fn operation(&self, kind: OperationKind) -> Result<Operation, EnvelopeError> {
        if self.request_id.is_empty() {
            return Err(EnvelopeError::new("empty request identifier"));
        }

        match (kind, &self.attribute, &self.action, &self.value) {
            (OperationKind::Get, Some(attribute), None, None) => Ok(Operation::Get {
                attribute: attribute.clone(),
            }),
            (OperationKind::Set, Some(attribute), None, Some(value)) => Ok(Operation::Set {
                attribute: attribute.clone(),
                value: value.clone(),
            }),
            (OperationKind::Action, None, Some(action), value) => Ok(Operation::Action {
                action: action.clone(),
                value: value.clone(),
            }),
            _ => Err(EnvelopeError::new(format!(
                "fields do not describe a `{kind}` operation"
            ))),
        }
    }
}

/// A decoded operation.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Read an attribute.
    Get {
        /// Attribute name.
        attribute: String,
    },
    /// Write an attribute.
    Set {
        /// Attribute name.
        attribute: String,
        /// Encoded attribute value.
        value: WireValue,
    },
    /// Invoke an action.
    Action {
        /// Action name.
        action: String,
        /// Encoded request value.
        value: Option<WireValue>,
    },
}

impl Operation {
    /// Returns the [`OperationKind`].
    #[must_use]
    pub const fn kind(&self) -> OperationKind {
        match self {
            Self::Get { .. } => OperationKind::Get,
            Self::Set { .. } => OperationKind::Set,
            Self::Action { .. } => OperationKind::Action,
        }
    }

    /// Returns the name of the attribute or action the operation targets.
    #[must_use]
    pub fn target(&self) -> &str {
        match self {
            Self::Get { attribute } | Self::Set { attribute, .. } => attribute,
            Self::Action { action, .. } => action,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use crate::data::WireValue;
    use crate::{deserialize, serialize};

    use super::{Operation, OperationKind, Request};

    #[test]
    fn request_envelope_format() {
        assert_eq!(
            serialize(Request::get("r1", "d1", "temperature")),
            json!({ "requestId": "r1", "deviceId": "d1", "attribute": "temperature" })
        );
        assert_eq!(
            serialize(Request::set("r2", "d1", "mode", WireValue::new(json!("auto")))),
            json!({ "requestId": "r2", "deviceId": "d1", "attribute": "mode", "value": "auto" })
        );
        assert_eq!(
            serialize(Request::action("r3", "d1", "reboot", None)),
            json!({ "requestId": "r3", "deviceId": "d1", "action": "reboot" })
        );
    }

    #[test]
    fn decode_operations() {
        let request = deserialize::<Request>(json!({
            "requestId": "r2",
            "deviceId": "d1",
            "attribute": "mode",
            "value": "auto",
        }));

        assert_eq!(
            request.operation(OperationKind::Set),
            Ok(Operation::Set {
                attribute: "mode".into(),
                value: WireValue::new(json!("auto")),
            })
        );

        let action = Request::action("r3", "d1", "boost", Some(WireValue::new(json!(5))));
        let operation = action.operation(OperationKind::Action).unwrap();
        assert_eq!(operation.kind(), OperationKind::Action);
        assert_eq!(operation.target(), "boost");
    }

    #[test]
    fn reject_mismatched_envelopes() {
        // A `get` envelope delivered on a `set` topic.
        let get = Request::get("r1", "d1", "temperature");
        assert!(get.operation(OperationKind::Set).is_err());
        assert!(get.operation(OperationKind::Action).is_err());

        // Both an attribute and an action.
        let mut mixed = Request::action("r4", "d1", "reboot", None);
        mixed.attribute = Some("mode".into());
        assert!(mixed.operation(OperationKind::Action).is_err());

        // No request identifier.
        assert!(
            Request::get("", "d1", "temperature")
                .operation(OperationKind::Get)
                .is_err()
        );
    }
}
