use std::sync::Arc;

use tether::alarm::Alarm;
use tether::topic::Topic;

use tether_transport::{Message, MessageHandler, Session, Subscription};

use tokio::sync::mpsc::{self, Receiver, error::TrySendError};

use tracing::{debug, error, warn};

use crate::error::Result;

/// A receiver for the alarms reported by a device.
///
/// Alarms are buffered on a bounded channel. When the buffer is full, new
/// alarms are dropped until the receiver catches up.
#[derive(Debug)]
pub struct AlarmReceiver {
    receiver: Receiver<Alarm>,
    subscription: Subscription,
}

impl AlarmReceiver {
    /// Subscribes to the alarm topic of a device.
    ///
    /// A zero `buffer` is raised to one.
    ///
    /// # Errors
    ///
    /// The subscription fails.
    pub async fn subscribe<S: Session>(session: &S, device_id: &str, buffer: usize) -> Result<Self> {
        let (sender, receiver) = mpsc::channel(buffer.max(1));

        let handler: MessageHandler = Arc::new(move |message: Message| {
            let alarm = match serde_json::from_slice::<Alarm>(&message.payload) {
                Ok(alarm) => alarm,
                Err(e) => {
                    error!("Error converting the payload on `{}` into an alarm: {e}", message.topic);
                    return;
                }
            };

            match sender.try_send(alarm) {
                Ok(()) => {}
                Err(TrySendError::Full(alarm)) => {
                    warn!("Alarm buffer full, drop `{}` alarm", alarm.alarm_type);
                }
                Err(TrySendError::Closed(_)) => {
                    debug!("Alarm receiver closed, drop the alarm");
                }
            }
        });

        let subscription = session
            .subscribe(Topic::alarm(device_id).as_str(), handler)
            .await?;

        Ok(Self {
            receiver,
            subscription,
        })
    }

    /// Returns the subscribed topic.
    #[must_use]
    pub fn topic(&self) -> &str {
        self.subscription.topic()
    }

    /// Receives the next alarm.
    ///
    /// Returns `None` once the receiver has been closed and all buffered
    /// alarms have been received.
    pub async fn recv(&mut self) -> Option<Alarm> {
        self.receiver.recv().await
    }

    /// Receives a buffered alarm, if any, without waiting.
    pub fn try_recv(&mut self) -> Option<Alarm> {
        self.receiver.try_recv().ok()
    }

    /// Stops receiving alarms.
    ///
    /// The subscription is released immediately.
    pub fn stop(self) {
        self.subscription.cancel();
    }
}
