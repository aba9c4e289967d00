//! The `tether-device` library crate provides the device side of the `tether`
//! protocol.
//!
//! A device describes its attributes and actions through a
//! [`tether::device::DeviceType`] and implements the [`handler::DeviceHandler`]
//! trait, which reads and writes attributes and runs actions on already decoded
//! values. A [`responder::Responder`] bridges the handler and a
//! [`tether_transport::Session`]: it receives the requests published on the
//! operation topics of the device, invokes the handler, and publishes exactly
//! one response for each of them on the result topic chosen by the caller.
//!
//! The responder also reports the alarms raised by the device.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Error management.
pub mod error;
/// The device logic.
pub mod handler;
/// The operation responder.
pub mod responder;
