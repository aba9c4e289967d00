use std::sync::Arc;

use bytes::Bytes;

use serde_json::Value as JsonValue;

use tether::alarm::Alarm;
use tether::device::Device;
use tether::request::{ALL_OPERATION_KINDS, Operation, OperationKind, Request};
use tether::response::Response;
use tether::topic::Topic;

use tether_transport::{Message, Session, Subscription};

use tokio::runtime::Handle;

use tracing::{debug, error, info, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::handler::DeviceHandler;

struct Inner<S, H> {
    device: Device,
    session: S,
    handler: H,
}

impl<S, H> Inner<S, H>
where
    S: Session + 'static,
    H: DeviceHandler,
{
    async fn serve(self: Arc<Self>, kind: OperationKind, message: Message) {
        let request = match serde_json::from_slice::<Request>(&message.payload) {
            Ok(request) => request,
            Err(e) => {
                warn!("Malformed request on topic `{}`, drop it: {e}", message.topic);
                return;
            }
        };

        let operation = match request.operation(kind) {
            Ok(operation) => operation,
            Err(e) => {
                warn!(
                    "Request `{}` on topic `{}` dropped: {e}",
                    request.request_id, message.topic
                );
                return;
            }
        };

        debug!(
            "Serving `{kind}` request `{}` for `{}`",
            request.request_id,
            operation.target()
        );

        let response = match self.execute(&request.device_id, operation).await {
            Ok(response) => response,
            Err(e) => {
                error!("Request `{}` failed: {e}", request.request_id);
                Response::failure(e.description())
            }
        };

        let topic = Topic::result(kind, &request.device_id, &request.request_id);
        if let Err(e) = self.publish(&topic, &response).await {
            error!("Impossible to reply to request `{}`: {e}", request.request_id);
        }
    }

    async fn execute(self: &Arc<Self>, device_id: &str, operation: Operation) -> Result<Response> {
        if device_id != self.device.id {
            return Err(Error::invalid_data(format!(
                "request addressed to device `{device_id}`, received by `{}`",
                self.device.id
            )));
        }

        let device_type = &self.device.device_type;

        match operation {
            Operation::Get { attribute } => {
                let attribute_type = device_type
                    .attribute(&attribute)
                    .ok_or_else(|| not_found("attribute", &attribute))?;

                let inner = Arc::clone(self);
                let value = isolated(async move { inner.handler.get(&attribute).await }).await?;
                let wire = attribute_type.data_type.encode(&value)?;

                Ok(Response::with_value(wire))
            }
            Operation::Set { attribute, value } => {
                let attribute_type = device_type
                    .attribute(&attribute)
                    .ok_or_else(|| not_found("attribute", &attribute))?;

                let value = attribute_type.data_type.decode(&value)?;
                let inner = Arc::clone(self);
                isolated(async move { inner.handler.set(&attribute, value).await }).await?;

                Ok(Response::ok())
            }
            Operation::Action { action, value } => {
                let action_type = device_type
                    .action(&action)
                    .ok_or_else(|| not_found("action", &action))?;

                let request = match (&action_type.request, value) {
                    (Some(data_type), Some(wire)) => Some(data_type.decode(&wire)?),
                    (None, None) => None,
                    (Some(data_type), None) => {
                        return Err(Error::invalid_data(format!(
                            "action `{action}` requires a {data_type} value"
                        )));
                    }
                    (None, Some(_)) => {
                        return Err(Error::invalid_data(format!(
                            "action `{action}` does not take a value"
                        )));
                    }
                };

                let inner = Arc::clone(self);
                let name = action.clone();
                let result =
                    isolated(async move { inner.handler.invoke(&name, request).await }).await?;

                match (&action_type.response, result) {
                    (Some(data_type), Some(value)) => {
                        Ok(Response::with_value(data_type.encode(&value)?))
                    }
                    (None, None) => Ok(Response::ok()),
                    (Some(data_type), None) => Err(Error::internal(format!(
                        "action `{action}` produced no {data_type} value"
                    ))),
                    (None, Some(_)) => Err(Error::internal(format!(
                        "action `{action}` produced an undeclared value"
                    ))),
                }
            }
        }
    }

    async fn publish<T: serde::Serialize>(&self, topic: &Topic, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;
        self.session
            .publish(topic.as_str(), Bytes::from(payload))
            .await
            .map_err(Error::from)
    }
}

// Runs a handler call on its own task, so a panic becomes a failed response.
async fn isolated<T>(call: impl Future<Output = Result<T>> + Send + 'static) -> Result<T>
where
    T: Send + 'static,
{
    tokio::spawn(call).await.unwrap_or_else(|e| {
        error!("Device handler task failed: {e}");
        if e.is_panic() {
            Err(Error::internal("device handler panicked"))
        } else {
            Err(Error::internal("device handler cancelled"))
        }
    })
}

fn not_found(what: &str, name: &str) -> Error {
    Error::new(ErrorKind::NotFound, format!("{what} `{name}` not found"))
}

/// The device side of the protocol.
///
/// A [`Responder`] subscribes to the operation topics of its device, one for
/// each served [`OperationKind`], and answers every well-formed request with
/// exactly one [`Response`] on the result topic derived from the request
/// envelope. Handler failures and panics, unknown names and values rejected
/// by their [`tether::data::DataType`] become failed responses.
///
/// Requests which cannot be decoded are logged and dropped without a reply.
pub struct Responder<S, H> {
    inner: Arc<Inner<S, H>>,
    kinds: Vec<OperationKind>,
    subscriptions: Vec<Subscription>,
}

impl<S, H> std::fmt::Debug for Responder<S, H> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Responder")
            .field("device", &self.inner.device.id)
            .field("kinds", &self.kinds)
            .field("subscriptions", &self.subscriptions)
            .finish()
    }
}

impl<S, H> Responder<S, H>
where
    S: Session + 'static,
    H: DeviceHandler,
{
    /// Creates a [`Responder`] serving all operation kinds.
    #[must_use]
    pub fn new(device: Device, session: S, handler: H) -> Self {
        Self {
            inner: Arc::new(Inner {
                device,
                session,
                handler,
            }),
            kinds: ALL_OPERATION_KINDS.to_vec(),
            subscriptions: Vec::new(),
        }
    }

    /// Restricts the served operation kinds.
    ///
    /// Repeated kinds are served once. Requests of the other kinds are never
    /// received.
    #[must_use]
    pub fn operations(mut self, kinds: &[OperationKind]) -> Self {
        self.kinds.clear();
        for kind in kinds {
            if !self.kinds.contains(kind) {
                self.kinds.push(*kind);
            }
        }
        self
    }

    /// Returns the served [`Device`].
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.inner.device
    }

    /// Returns the device handler.
    #[must_use]
    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    /// Returns whether the responder is serving requests.
    #[must_use]
    pub fn is_running(&self) -> bool {
        !self.subscriptions.is_empty()
    }

    /// Subscribes to the operation topics and starts serving requests.
    ///
    /// Requests are served on the `tokio` runtime this method is called
    /// within.
    ///
    /// # Errors
    ///
    /// The responder is already running, or a subscription fails. In the
    /// latter case no topic stays subscribed.
    pub async fn start(&mut self) -> Result<()> {
        if self.is_running() {
            return Err(Error::internal("responder already running"));
        }

        let runtime = Handle::current();
        let mut subscriptions = Vec::with_capacity(self.kinds.len());

        for kind in &self.kinds {
            let kind = *kind;
            let topic = Topic::operation(kind, &self.inner.device.id);

            let inner = Arc::clone(&self.inner);
            let runtime = runtime.clone();
            let handler = Arc::new(move |message: Message| {
                let inner = Arc::clone(&inner);
                drop(runtime.spawn(async move { inner.serve(kind, message).await }));
            });

            // On failure, the subscriptions collected so far are dropped and
            // therefore released.
            subscriptions.push(self.inner.session.subscribe(topic.as_str(), handler).await?);
        }

        info!(
            "Device `{}` serving {:?}",
            self.inner.device.id, self.kinds
        );
        self.subscriptions = subscriptions;
        Ok(())
    }

    /// Stops serving requests.
    ///
    /// Requests already received are still answered.
    pub fn stop(&mut self) {
        for subscription in self.subscriptions.drain(..) {
            subscription.cancel();
        }
        info!("Device `{}` stopped", self.inner.device.id);
    }

    /// Reports an alarm on the alarm topic of the device.
    ///
    /// # Errors
    ///
    /// The alarm cannot be published.
    pub async fn report_alarm(&self, alarm_type: &str, alarm_info: JsonValue) -> Result<()> {
        let alarm = Alarm::new(&self.inner.device.id, alarm_type, alarm_info);
        self.inner
            .publish(&Topic::alarm(&self.inner.device.id), &alarm)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;

    use serde_json::json;

    use tether::alarm::Alarm;
    use tether::data::{DataType, Value, WireValue};
    use tether::device::{ActionType, AttributeType, Device, DeviceType};
    use tether::request::{OperationKind, Request};
    use tether::response::Response;

    use tether_transport::memory::{MemoryBroker, MemorySession};
    use tether_transport::{MessageHandler, Session, Subscription};

    use tokio::sync::mpsc;
    use tokio::time::timeout;

    use crate::error::{Error, Result};
    use crate::handler::DeviceHandler;

    use super::Responder;

    const WAIT: Duration = Duration::from_secs(2);

    struct Thermostat;

    impl DeviceHandler for Thermostat {
        async fn get(&self, attribute: &str) -> Result<Value> {
            match attribute {
                "temperature" => Ok(Value::Double(21.5)),
                // Declared as a double, answered as an integer.
                _ => Ok(Value::Integer(3)),
            }
        }

        async fn set(&self, _attribute: &str, _value: Value) -> Result<()> {
            Err(Error::invalid_data("mode locked"))
        }

        async fn invoke(&self, action: &str, request: Option<Value>) -> Result<Option<Value>> {
            match (action, request) {
                ("boost", Some(Value::Integer(steps))) => {
                    Ok(Some(Value::Double(21.5 + steps as f64)))
                }
                _ => Ok(None),
            }
        }
    }

    struct Faulty;

    impl DeviceHandler for Faulty {
        async fn get(&self, attribute: &str) -> Result<Value> {
            panic!("sensor `{attribute}` exploded")
        }
    }

    fn thermostat() -> Device {
        Device::new(
            "d1",
            DeviceType::new("thermostat")
                .with_attribute("temperature", AttributeType::new(DataType::double()))
                .with_attribute("humidity", AttributeType::new(DataType::double()))
                .with_attribute(
                    "mode",
                    AttributeType::new(DataType::enumeration(["auto", "heat", "cool", "off"])),
                )
                .with_action("reboot", ActionType::new())
                .with_action(
                    "boost",
                    ActionType::new()
                        .request(DataType::integer())
                        .response(DataType::double()),
                ),
        )
    }

    async fn started(broker: &MemoryBroker) -> Responder<MemorySession, Thermostat> {
        let mut responder = Responder::new(thermostat(), broker.connect(), Thermostat);
        responder.start().await.unwrap();
        responder
    }

    async fn listen(
        session: &MemorySession,
        topic: &str,
    ) -> (Subscription, mpsc::UnboundedReceiver<Bytes>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let handler: MessageHandler = std::sync::Arc::new(move |message| {
            let _ = sender.send(message.payload);
        });
        (session.subscribe(topic, handler).await.unwrap(), receiver)
    }

    async fn call(broker: &MemoryBroker, kind: OperationKind, request: Request) -> Response {
        let session = broker.connect();
        let topic = format!("result.{kind}.{}.{}", request.device_id, request.request_id);
        let (_subscription, mut receiver) = listen(&session, &topic).await;

        session
            .publish(
                &format!("operation.{kind}.{}", request.device_id),
                Bytes::from(serde_json::to_vec(&request).unwrap()),
            )
            .await
            .unwrap();

        let payload = timeout(WAIT, receiver.recv()).await.unwrap().unwrap();
        serde_json::from_slice(&payload).unwrap()
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn serve_operations() {
        let broker = MemoryBroker::new();
        let _responder = started(&broker).await;

        assert_eq!(
            call(&broker, OperationKind::Get, Request::get("r1", "d1", "temperature")).await,
            Response::with_value(WireValue::new(json!(21.5)))
        );

        assert_eq!(
            call(&broker, OperationKind::Action, Request::action("r2", "d1", "reboot", None))
                .await,
            Response::ok()
        );

        assert_eq!(
            call(
                &broker,
                OperationKind::Action,
                Request::action("r3", "d1", "boost", Some(WireValue::new(json!(2))))
            )
            .await,
            Response::with_value(WireValue::new(json!(23.5)))
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failures_become_responses() {
        let broker = MemoryBroker::new();
        let _responder = started(&broker).await;

        // Handler failure.
        let set = Request::set("r1", "d1", "mode", WireValue::new(json!("auto")));
        assert_eq!(
            call(&broker, OperationKind::Set, set).await,
            Response::failure("mode locked")
        );

        // Value outside of the enumeration.
        let set = Request::set("r2", "d1", "mode", WireValue::new(json!("turbo")));
        let response = call(&broker, OperationKind::Set, set).await;
        assert!(!response.success);
        assert!(response.error.is_some_and(|e| e.contains("turbo")));

        // Unknown attribute.
        let get = Request::get("r3", "d1", "pressure");
        assert_eq!(
            call(&broker, OperationKind::Get, get).await,
            Response::failure("attribute `pressure` not found")
        );

        // The handler value does not match the declared type.
        let get = Request::get("r4", "d1", "humidity");
        let response = call(&broker, OperationKind::Get, get).await;
        assert!(!response.success);

        // A payload for an action without a request type.
        let action = Request::action("r5", "d1", "reboot", Some(WireValue::new(json!(1))));
        assert_eq!(
            call(&broker, OperationKind::Action, action).await,
            Response::failure("action `reboot` does not take a value")
        );

        // Exactly one response for each request.
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.published("result.set.d1.r1"), 1);
        assert_eq!(broker.published_with_prefix("result."), 5);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn handler_panics_become_responses() {
        let broker = MemoryBroker::new();
        let mut responder = Responder::new(thermostat(), broker.connect(), Faulty);
        responder.start().await.unwrap();

        assert_eq!(
            call(&broker, OperationKind::Get, Request::get("r1", "d1", "temperature")).await,
            Response::failure("device handler panicked")
        );

        // Still serving after the panic.
        let set = Request::set("r2", "d1", "mode", WireValue::new(json!("auto")));
        assert_eq!(
            call(&broker, OperationKind::Set, set).await,
            Response::failure("writing `mode` is not supported")
        );

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.published("result.get.d1.r1"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn drop_malformed_requests() {
        let broker = MemoryBroker::new();
        let _responder = started(&broker).await;
        let session = broker.connect();

        session
            .publish("operation.get.d1", Bytes::from_static(b"not json"))
            .await
            .unwrap();

        // A `set` envelope on the `get` topic.
        let set = Request::set("r1", "d1", "mode", WireValue::new(json!("auto")));
        session
            .publish(
                "operation.get.d1",
                Bytes::from(serde_json::to_vec(&set).unwrap()),
            )
            .await
            .unwrap();

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(broker.published_with_prefix("result."), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn subscriptions_lifecycle() {
        let broker = MemoryBroker::new();

        let mut responder = Responder::new(thermostat(), broker.connect(), Thermostat)
            .operations(&[OperationKind::Get, OperationKind::Action]);
        assert!(!responder.is_running());

        responder.start().await.unwrap();
        assert!(responder.is_running());
        assert!(responder.start().await.is_err());

        assert_eq!(broker.subscriptions("operation.get.d1"), 1);
        assert_eq!(broker.subscriptions("operation.set.d1"), 0);
        assert_eq!(broker.subscriptions("operation.action.d1"), 1);

        responder.stop();
        assert!(!responder.is_running());
        assert_eq!(broker.total_subscriptions(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn repeated_kinds_are_served_once() {
        let broker = MemoryBroker::new();

        let mut responder = Responder::new(thermostat(), broker.connect(), Thermostat).operations(&[
            OperationKind::Get,
            OperationKind::Set,
            OperationKind::Get,
        ]);
        responder.start().await.unwrap();
        assert_eq!(broker.subscriptions("operation.get.d1"), 1);
        assert_eq!(broker.subscriptions("operation.set.d1"), 1);

        let _ = call(&broker, OperationKind::Get, Request::get("r1", "d1", "temperature")).await;

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(broker.published("result.get.d1.r1"), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn report_alarms() {
        let broker = MemoryBroker::new();
        let responder = Responder::new(thermostat(), broker.connect(), Thermostat);

        let session = broker.connect();
        let (_subscription, mut receiver) = listen(&session, "alarm.d1").await;

        responder
            .report_alarm("overheat", json!({ "temperature": 80.5 }))
            .await
            .unwrap();

        let payload = timeout(WAIT, receiver.recv()).await.unwrap().unwrap();
        let alarm: Alarm = serde_json::from_slice(&payload).unwrap();
        assert_eq!(alarm.device_id, "d1");
        assert_eq!(alarm.alarm_type, "overheat");
        assert_eq!(alarm.alarm_info, json!({ "temperature": 80.5 }));
    }
}
