//! The `tether-controller` library crate provides the caller side of the
//! `tether` protocol: reading attributes, writing attributes and invoking
//! actions on remote devices as if they were plain function calls.
//!
//! Devices are reachable only through a publish/subscribe
//! [`tether_transport::Session`]. The [`dispatcher::Dispatcher`] maps every
//! call onto a request published on the operation topic of the device and a
//! reply received on a result topic created for that call alone, then waits
//! for the reply with a deadline.
//!
//! Core functionalities of this crate include:
//!
//! - Retrieving device type metadata through a [`registry::Registry`], either
//!   over `HTTP` or from memory
//! - Encoding request values and decoding reply values with the types the
//!   device declares
//! - Correlating replies with their calls, discarding late and duplicate
//!   replies
//! - Typed façades such as [`dispatcher::Dispatcher::get_double`] and
//!   [`dispatcher::Dispatcher::action_bool`]
//! - Receiving the alarms reported by devices
//!
//! Calls are asynchronous and run on `tokio`. Many calls can be outstanding at
//! the same time on the same dispatcher.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

/// Device alarms.
pub mod alarms;
/// The request dispatcher.
pub mod dispatcher;
/// Error management.
pub mod error;
/// Calls waiting for their reply.
pub mod pending;
/// Device metadata retrieval.
pub mod registry;

mod facade;
