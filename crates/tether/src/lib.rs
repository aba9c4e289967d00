//! The communication interface among a `tether` controller and its devices.
//!
//! A controller reads and writes device attributes and invokes device actions
//! through a publish/subscribe transport, which only offers topics and
//! delivers messages eventually. This crate defines what both sides agree on
//! to turn those topics into calls with a return value:
//!
//! - The request and response envelopes exchanged for every call
//! - The topic names, derived from the operation kind, the device identifier
//!   and the request identifier
//! - The device type metadata, which declares the attributes and actions of a
//!   device together with their value types
//! - The value codecs. Each [`data::DataType`] encodes a raw [`data::Value`]
//!   into its wire representation and decodes it back, rejecting values which
//!   do not belong to it
//! - The alarms a device reports to whoever is listening
//!
//! Envelopes are serialized as `JSON`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Alarms reported by devices.
pub mod alarm;
/// Value types, raw values and their wire codecs.
pub mod data;
/// Device type metadata.
pub mod device;
/// Request envelopes and operation kinds.
pub mod request;
/// Response envelopes.
pub mod response;
/// Topic naming.
pub mod topic;

#[cfg(test)]
pub(crate) fn serialize<T: serde::Serialize>(value: T) -> serde_json::Value {
    serde_json::to_value(value).unwrap()
}

#[cfg(test)]
pub(crate) fn deserialize<T: serde::de::DeserializeOwned>(value: serde_json::Value) -> T {
    serde_json::from_value(value).unwrap()
}
