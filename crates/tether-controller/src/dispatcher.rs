use std::sync::Arc;

use bytes::Bytes;

use tether::data::{DataType, Value, WireValue};
use tether::device::{ActionType, Device};
use tether::request::{OperationKind, Request};
use tether::response::Response;
use tether::topic::Topic;

use tether_transport::{Message, MessageHandler, Session};

use tracing::{debug, error, warn};

use uuid::Uuid;

use crate::error::{Error, ErrorKind, Result};
use crate::pending::{CallOptions, PendingCalls};
use crate::registry::Registry;

fn not_found(what: &str, name: &str, device_id: &str) -> Error {
    Error::new(
        ErrorKind::NotFound,
        format!("{what} `{name}` not found on device `{device_id}`"),
    )
}

fn value_error(description: String) -> Error {
    Error::new(ErrorKind::Value, description)
}

// Turns a device reply into its optional value.
fn into_value(response: Response) -> Result<Option<WireValue>> {
    if !response.success {
        return Err(Error::new(
            ErrorKind::Status,
            response
                .error
                .unwrap_or_else(|| "unknown device error".into()),
        ));
    }
    Ok(response.value)
}

fn decode(data_type: &DataType, wire: &WireValue) -> Result<Value> {
    data_type.decode(wire).map_err(|e| {
        error!("Impossible to decode the device reply: {e}");
        Error::from(e)
    })
}

/// The caller side of the protocol.
///
/// A [`Dispatcher`] turns attribute reads, attribute writes and action
/// invocations into request/reply exchanges over a [`Session`]. Each call:
///
/// 1. Resolves the device type through the [`Registry`], failing with
///    [`ErrorKind::NotFound`] before anything is published
/// 2. Encodes the request value with its declared [`DataType`]
/// 3. Subscribes to a fresh result topic named after a random request
///    identifier
/// 4. Publishes the request on the operation topic of the device
/// 5. Waits for the reply until the deadline, then decodes it
///
/// The result subscription is released on every path, also when the call
/// future is dropped.
#[derive(Debug)]
pub struct Dispatcher<S, R> {
    session: S,
    registry: R,
    pending: PendingCalls,
}

impl<S, R> Dispatcher<S, R>
where
    S: Session,
    R: Registry,
{
    /// Creates a [`Dispatcher`].
    #[must_use]
    pub fn new(session: S, registry: R) -> Self {
        Self {
            session,
            registry,
            pending: PendingCalls::new(),
        }
    }

    /// Returns the [`Session`].
    #[must_use]
    pub const fn session(&self) -> &S {
        &self.session
    }

    /// Returns the [`Registry`].
    #[must_use]
    pub const fn registry(&self) -> &R {
        &self.registry
    }

    /// Returns the calls waiting for a reply.
    #[must_use]
    pub const fn pending(&self) -> &PendingCalls {
        &self.pending
    }

    /// Reads an attribute of a device.
    ///
    /// # Errors
    ///
    /// - [`ErrorKind::Deadline`] for a zero deadline
    /// - [`ErrorKind::NotFound`] if the device or the attribute is unknown
    /// - [`ErrorKind::Status`] if the device reports a failure or the
    ///   transport fails
    /// - [`ErrorKind::Timeout`] if no reply arrives before the deadline
    /// - [`ErrorKind::Value`] if the reply does not decode as the attribute
    ///   type
    /// - [`ErrorKind::Cancelled`] if the call is cancelled
    pub async fn get_attribute(
        &self,
        device_id: &str,
        attribute: &str,
        options: impl Into<CallOptions>,
    ) -> Result<Value> {
        let options = options.into();
        options.validate()?;

        let device = self.registry.fetch_device(device_id).await?;
        let data_type = &device
            .device_type
            .attribute(attribute)
            .ok_or_else(|| not_found("attribute", attribute, device_id))?
            .data_type;

        let request_id = new_request_id();
        let request = Request::get(&request_id, device_id, attribute);

        let wire = into_value(self.call(OperationKind::Get, &request, &options).await?)?
            .ok_or_else(|| {
                value_error(format!("attribute `{attribute}` reply carries no value"))
            })?;

        decode(data_type, &wire)
    }

    /// Writes an attribute of a device.
    ///
    /// # Errors
    ///
    /// The same errors as [`Dispatcher::get_attribute`], and
    /// [`ErrorKind::Value`] if the value does not belong to the attribute
    /// type, in which case nothing is published.
    pub async fn set_attribute(
        &self,
        device_id: &str,
        attribute: &str,
        value: Value,
        options: impl Into<CallOptions>,
    ) -> Result<()> {
        let options = options.into();
        options.validate()?;

        let device = self.registry.fetch_device(device_id).await?;
        let attribute_type = device
            .device_type
            .attribute(attribute)
            .ok_or_else(|| not_found("attribute", attribute, device_id))?;

        let wire = attribute_type.data_type.encode(&value)?;

        let request_id = new_request_id();
        let request = Request::set(&request_id, device_id, attribute, wire);

        let _ = into_value(self.call(OperationKind::Set, &request, &options).await?)?;
        Ok(())
    }

    /// Invokes an action of a device.
    ///
    /// `request` must be present if and only if the action declares a request
    /// type. The returned value is present if and only if the action declares
    /// a response type.
    ///
    /// # Errors
    ///
    /// The same errors as [`Dispatcher::get_attribute`], and
    /// [`ErrorKind::Value`] if the request value is missing, unexpected or
    /// does not belong to the request type, in which case nothing is
    /// published.
    pub async fn invoke_action(
        &self,
        device_id: &str,
        action: &str,
        request: Option<Value>,
        options: impl Into<CallOptions>,
    ) -> Result<Option<Value>> {
        let options = options.into();
        options.validate()?;

        let device = self.registry.fetch_device(device_id).await?;
        let action_type = action_type(&device, action)?;

        let wire = match (&action_type.request, request) {
            (Some(data_type), Some(value)) => Some(data_type.encode(&value)?),
            (None, None) => None,
            (Some(data_type), None) => {
                return Err(value_error(format!(
                    "action `{action}` requires a {data_type} value"
                )));
            }
            (None, Some(_)) => {
                return Err(value_error(format!(
                    "action `{action}` does not take a value"
                )));
            }
        };

        let request_id = new_request_id();
        let request = Request::action(&request_id, device_id, action, wire);

        let wire = into_value(self.call(OperationKind::Action, &request, &options).await?)?;

        match (&action_type.response, wire) {
            (Some(data_type), Some(wire)) => decode(data_type, &wire).map(Some),
            (Some(_), None) => Err(value_error(format!(
                "action `{action}` reply carries no value"
            ))),
            (None, wire) => {
                if wire.is_some() {
                    debug!("Action `{action}` declares no response, ignore the reply value");
                }
                Ok(None)
            }
        }
    }

    // Runs the request/reply exchange of a single call.
    async fn call(
        &self,
        kind: OperationKind,
        request: &Request,
        options: &CallOptions,
    ) -> Result<Response> {
        let result_topic = Topic::result(kind, &request.device_id, &request.request_id);
        let operation_topic = Topic::operation(kind, &request.device_id);

        let mut pending = self.pending.register(&request.request_id);

        let calls = self.pending.clone();
        let request_id = request.request_id.clone();
        let handler: MessageHandler = Arc::new(move |message: Message| {
            match serde_json::from_slice::<Response>(&message.payload) {
                Ok(response) => {
                    if !calls.complete(&request_id, response) {
                        debug!("Late or duplicate reply on topic `{}`", message.topic);
                    }
                }
                Err(e) => warn!("Malformed reply on topic `{}`, discard it: {e}", message.topic),
            }
        });

        // The reply topic must be subscribed before the request leaves.
        let subscription = match self.session.subscribe(result_topic.as_str(), handler).await {
            Ok(subscription) => subscription,
            Err(e) => {
                pending.fail();
                return Err(e.into());
            }
        };

        let payload = match serde_json::to_vec(request) {
            Ok(payload) => payload,
            Err(e) => {
                pending.fail();
                return Err(e.into());
            }
        };

        debug!("Publishing `{kind}` request `{}`", request.request_id);
        if let Err(e) = self
            .session
            .publish(operation_topic.as_str(), Bytes::from(payload))
            .await
        {
            pending.fail();
            return Err(e.into());
        }

        let outcome = pending.wait(options).await;
        subscription.cancel();
        outcome
    }
}

fn action_type<'a>(device: &'a Device, action: &str) -> Result<&'a ActionType> {
    device
        .device_type
        .action(action)
        .ok_or_else(|| not_found("action", action, &device.id))
}

fn new_request_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use tether::data::WireValue;
    use tether::response::Response;

    use crate::error::ErrorKind;

    use super::{into_value, new_request_id};

    #[test]
    fn request_ids_are_unique() {
        let first = new_request_id();
        assert_eq!(first.len(), 36);
        assert_ne!(first, new_request_id());
    }

    #[test]
    fn reply_values() {
        assert_eq!(into_value(Response::ok()), Ok(None));
        assert_eq!(
            into_value(Response::with_value(WireValue::new(json!(1)))),
            Ok(Some(WireValue::new(json!(1))))
        );

        let error = into_value(Response::failure("mode locked")).unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Status);
        assert_eq!(error.description(), "mode locked");
    }
}
