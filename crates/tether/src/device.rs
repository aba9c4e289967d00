use indexmap::IndexMap;

use serde::{Deserialize, Serialize};

use crate::data::DataType;

/// The type of a device attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttributeType {
    /// Attribute value type.
    pub data_type: DataType,
    /// Attribute description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl AttributeType {
    /// Creates an [`AttributeType`].
    #[must_use]
    pub const fn new(data_type: DataType) -> Self {
        Self {
            data_type,
            description: None,
        }
    }

    /// Sets the attribute description.
    #[must_use]
    #[inline]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The type of a device action.
///
/// An action without a request type takes no payload, and an action without a
/// response type returns nothing.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ActionType {
    /// Request value type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request: Option<DataType>,
    /// Response value type.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response: Option<DataType>,
    /// Action description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl ActionType {
    /// Creates an [`ActionType`] which takes no payload and returns nothing.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            request: None,
            response: None,
            description: None,
        }
    }

    /// Sets the request value type.
    #[must_use]
    #[inline]
    pub fn request(mut self, data_type: DataType) -> Self {
        self.request = Some(data_type);
        self
    }

    /// Sets the response value type.
    #[must_use]
    #[inline]
    pub fn response(mut self, data_type: DataType) -> Self {
        self.response = Some(data_type);
        self
    }

    /// Sets the action description.
    #[must_use]
    #[inline]
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }
}

/// The type metadata of a device.
///
/// Attribute and action names are unique within a [`DeviceType`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceType {
    /// Device type name.
    pub name: String,
    /// Attributes by name.
    #[serde(default)]
    pub attributes: IndexMap<String, AttributeType>,
    /// Actions by name.
    #[serde(default)]
    pub actions: IndexMap<String, ActionType>,
}

impl DeviceType {
    /// Creates a [`DeviceType`] without attributes and actions.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attributes: IndexMap::new(),
            actions: IndexMap::new(),
        }
    }

    /// Adds an attribute, replacing any attribute with the same name.
    #[must_use]
    #[inline]
    pub fn with_attribute(mut self, name: impl Into<String>, attribute: AttributeType) -> Self {
        let _ = self.attributes.insert(name.into(), attribute);
        self
    }

    /// Adds an action, replacing any action with the same name.
    #[must_use]
    #[inline]
    pub fn with_action(mut self, name: impl Into<String>, action: ActionType) -> Self {
        let _ = self.actions.insert(name.into(), action);
        self
    }

    /// Returns the [`AttributeType`] with the given name.
    #[must_use]
    #[inline]
    pub fn attribute(&self, name: &str) -> Option<&AttributeType> {
        self.attributes.get(name)
    }

    /// Returns the [`ActionType`] with the given name.
    #[must_use]
    #[inline]
    pub fn action(&self, name: &str) -> Option<&ActionType> {
        self.actions.get(name)
    }
}

/// A device snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Device {
    /// Device identifier.
    pub id: String,
    /// Device name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Device type metadata.
    pub device_type: DeviceType,
}

impl Device {
    /// Creates a [`Device`].
    #[must_use]
    pub fn new(id: impl Into<String>, device_type: DeviceType) -> Self {
        Self {
            id: id.into(),
            name: None,
            device_type,
        }
    }

    /// Sets the device name.
    #[must_use]
    #[inline]
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}
