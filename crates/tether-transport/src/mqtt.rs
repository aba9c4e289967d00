use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;

use rumqttc::v5::{
    AsyncClient, ClientError, ConnectionError, Event, EventLoop, MqttOptions, mqttbytes::QoS,
    mqttbytes::v5::Packet,
};

use tokio::task::JoinHandle;

use tokio_util::sync::CancellationToken;

use tracing::{debug, error, info, warn};

use crate::error::{Error, ErrorKind, Result};
use crate::subscribers::{Subscribers, dispatch, lock};
use crate::{Message, MessageHandler, Session, Subscription};

// The capacity of the bounded asynchronous channel.
const ASYNC_CHANNEL_CAPACITY: usize = 10;

// Keep alive time to send `pingreq` to broker when the connection is idle.
const KEEP_ALIVE_TIME: Duration = Duration::from_secs(5);

// Pause before polling again after a connection error.
const RECONNECTION_DELAY: Duration = Duration::from_millis(500);

// Requests may be redelivered, since callers discard duplicate replies.
const QOS: QoS = QoS::AtLeastOnce;

/// Broker data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrokerData {
    /// Broker host name or address.
    pub host: String,
    /// Broker port number.
    pub port: u16,
}

impl BrokerData {
    /// Creates a [`BrokerData`].
    #[must_use]
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

/// The configuration of an [`MqttSession`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MqttConfig {
    client_id: String,
    broker: BrokerData,
    keep_alive: Duration,
    channel_capacity: usize,
}

impl MqttConfig {
    /// Creates an [`MqttConfig`] with a five seconds keep-alive interval.
    ///
    /// The client identifier must be unique among the clients connected to
    /// the same broker.
    #[must_use]
    pub fn new(client_id: impl Into<String>, broker: BrokerData) -> Self {
        Self {
            client_id: client_id.into(),
            broker,
            keep_alive: KEEP_ALIVE_TIME,
            channel_capacity: ASYNC_CHANNEL_CAPACITY,
        }
    }

    /// Sets the keep-alive interval.
    #[must_use]
    pub const fn keep_alive(mut self, keep_alive: Duration) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Sets the capacity of the channel between the client and its event
    /// loop.
    #[must_use]
    pub const fn channel_capacity(mut self, channel_capacity: usize) -> Self {
        self.channel_capacity = channel_capacity;
        self
    }

    fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            return Err(Error::new(ErrorKind::Connection, "Empty client identifier"));
        }
        if self.broker.host.is_empty() {
            return Err(Error::new(ErrorKind::Connection, "Empty broker host"));
        }
        if self.channel_capacity == 0 {
            return Err(Error::new(
                ErrorKind::Connection,
                "The channel capacity must be greater than zero",
            ));
        }
        Ok(())
    }
}

// Returns `false` on connection errors.
#[inline]
fn route_event(
    event: std::result::Result<Event, ConnectionError>,
    subscribers: &Mutex<Subscribers>,
) -> bool {
    let publish = match event {
        Ok(Event::Incoming(Packet::Publish(publish))) => publish,
        Ok(Event::Incoming(packet)) => {
            debug!("Packet ignored: {packet:?}");
            return true;
        }
        Ok(Event::Outgoing(_)) => return true,
        Err(e) => {
            error!("Error in receiving the event, retry: {e}");
            return false;
        }
    };

    let Ok(topic) = std::str::from_utf8(&publish.topic) else {
        warn!("Publish with a non UTF-8 topic, discard it");
        return true;
    };

    if dispatch(subscribers, &Message::new(topic, publish.payload.clone())) == 0 {
        debug!("No subscribers for topic `{topic}`, discard the message");
    }
    true
}

async fn run_event_loop(
    mut eventloop: EventLoop,
    subscribers: Arc<Mutex<Subscribers>>,
    cancellation_token: CancellationToken,
) {
    loop {
        tokio::select! {
            // Use the cancellation token to stop the loop
            () = cancellation_token.cancelled() => { break; }
            // Poll the `MQTT` event coming from the network
            event = eventloop.poll() => {
                if !route_event(event, &subscribers) {
                    // The next poll reconnects to the broker.
                    tokio::time::sleep(RECONNECTION_DELAY).await;
                }
            }
        }
    }
    drop(eventloop);
}

/// A session connected to an `MQTT` broker.
///
/// The network event loop runs on a dedicated `tokio` task until
/// [`MqttSession::shutdown`] is called. Clones share the same connection.
#[derive(Debug, Clone)]
pub struct MqttSession {
    client: AsyncClient,
    subscribers: Arc<Mutex<Subscribers>>,
    cancellation_token: CancellationToken,
    event_loop: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl MqttSession {
    /// Connects to the broker described in the [`MqttConfig`].
    ///
    /// This method must be called within a `tokio` runtime.
    ///
    /// # Errors
    ///
    /// The configuration is invalid.
    pub fn connect(config: &MqttConfig) -> Result<Self> {
        config.validate()?;

        let BrokerData { host, port } = &config.broker;

        let mut mqttoptions = MqttOptions::new(config.client_id.as_str(), host.as_str(), *port);
        let _ = mqttoptions.set_keep_alive(config.keep_alive);

        let (client, eventloop) = AsyncClient::new(mqttoptions, config.channel_capacity);

        let subscribers = Arc::new(Mutex::new(Subscribers::default()));
        let cancellation_token = CancellationToken::new();

        let handle = tokio::spawn(run_event_loop(
            eventloop,
            Arc::clone(&subscribers),
            cancellation_token.clone(),
        ));

        info!(
            "Session `{}` connecting to {}:{}",
            config.client_id, host, port
        );

        Ok(Self {
            client,
            subscribers,
            cancellation_token,
            event_loop: Arc::new(Mutex::new(Some(handle))),
        })
    }

    /// Disconnects from the broker and stops the event loop.
    ///
    /// Subscription handlers are no longer invoked afterwards.
    pub async fn shutdown(&self) {
        if let Err(e) = self.client.disconnect().await {
            warn!("Failed to send the disconnection request: {e}");
        }

        // Stop the infinite loop
        self.cancellation_token.cancel();

        let handle = lock(&self.event_loop).take();
        if let Some(handle) = handle {
            // Await the task.
            if let Err(e) = handle.await {
                error!("Failed to await the event loop task: {e}");
            }
        }
    }
}

fn client_error(kind: ErrorKind, topic: &str, e: &ClientError) -> Error {
    Error::new(kind, format!("Topic `{topic}`: {e}"))
}

impl Session for MqttSession {
    async fn subscribe(&self, topic: &str, handler: MessageHandler) -> Result<Subscription> {
        if self.cancellation_token.is_cancelled() {
            return Err(Error::new(ErrorKind::Connection, "Session closed"));
        }

        // The handler is registered before the subscription request leaves,
        // so no message can arrive without a handler to route it to.
        let id = lock(&self.subscribers).insert(topic, handler);

        if let Err(e) = self.client.subscribe(topic.to_owned(), QOS).await {
            let _ = lock(&self.subscribers).remove(topic, id);
            error!("Impossible to subscribe to topic `{topic}`: {e}");
            return Err(client_error(ErrorKind::Subscribe, topic, &e));
        }

        let subscribers = Arc::clone(&self.subscribers);
        let client = self.client.clone();
        let owned_topic = topic.to_owned();

        Ok(Subscription::new(topic, move || {
            if !lock(&subscribers).remove(&owned_topic, id) {
                return;
            }
            // The request channel may be full or closed, in both cases the
            // local handler is already gone.
            if let Err(e) = client.try_unsubscribe(owned_topic.as_str()) {
                warn!("Impossible to unsubscribe from topic `{owned_topic}`: {e}");
            }
        }))
    }

    async fn publish(&self, topic: &str, payload: Bytes) -> Result<()> {
        if self.cancellation_token.is_cancelled() {
            return Err(Error::new(ErrorKind::Connection, "Session closed"));
        }

        self.client
            .publish(topic.to_owned(), QOS, false, payload)
            .await
            .map_err(|e| {
                error!("Impossible to publish on topic `{topic}`: {e}");
                client_error(ErrorKind::Publish, topic, &e)
            })
    }
}
