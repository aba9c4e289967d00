use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use hashbrown::HashMap;

use tether::response::Response;

use tokio::sync::oneshot;

use tokio_util::sync::CancellationToken;

use tracing::{debug, warn};

use crate::error::{Error, ErrorKind, Result};

/// The options of a single call.
#[derive(Debug, Clone)]
pub struct CallOptions {
    deadline: Duration,
    cancellation: Option<CancellationToken>,
}

impl CallOptions {
    /// Creates [`CallOptions`] with the given deadline.
    ///
    /// The deadline counts from the moment the request is published.
    #[must_use]
    pub const fn new(deadline: Duration) -> Self {
        Self {
            deadline,
            cancellation: None,
        }
    }

    /// Sets a [`CancellationToken`] which cancels the call when triggered.
    #[must_use]
    pub fn cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Returns the deadline.
    #[must_use]
    pub const fn deadline(&self) -> Duration {
        self.deadline
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.deadline.is_zero() {
            return Err(Error::new(
                ErrorKind::Deadline,
                "the deadline must be greater than zero",
            ));
        }
        Ok(())
    }
}

impl From<Duration> for CallOptions {
    fn from(deadline: Duration) -> Self {
        Self::new(deadline)
    }
}

/// The state of a [`PendingCall`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallState {
    /// Registered, the request has not been published yet.
    Created,
    /// The request has been published.
    AwaitingReply,
    /// The device replied with a success.
    Completed,
    /// The device replied with a failure, or the request could not be sent.
    Failed,
    /// No reply arrived before the deadline.
    TimedOut,
    /// The call has been cancelled.
    Cancelled,
}

impl CallState {
    /// Whether the state is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Created | Self::AwaitingReply)
    }
}

type Slots = HashMap<String, oneshot::Sender<Response>>;

/// The calls waiting for a reply, indexed by request identifier.
///
/// A call leaves the map on its first terminal transition, hence a second
/// reply for the same request identifier finds nothing to complete.
#[derive(Debug, Clone, Default)]
pub struct PendingCalls {
    slots: Arc<Mutex<Slots>>,
}

impl PendingCalls {
    /// Creates an empty [`PendingCalls`] map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of outstanding calls.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    /// Whether no call is outstanding.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Registers a call.
    ///
    /// A call registered with an identifier already in use replaces the
    /// previous one, which is then cancelled.
    #[must_use]
    pub fn register(&self, request_id: &str) -> PendingCall {
        let (sender, receiver) = oneshot::channel();
        if self.lock().insert(request_id.to_owned(), sender).is_some() {
            warn!("Request identifier `{request_id}` registered twice");
        }

        PendingCall {
            request_id: request_id.to_owned(),
            receiver,
            state: CallState::Created,
            calls: self.clone(),
        }
    }

    /// Delivers a reply to the call with the given request identifier.
    ///
    /// Returns `false` when no call is waiting for it, because the call has
    /// already been completed, has expired or has never existed.
    pub fn complete(&self, request_id: &str, response: Response) -> bool {
        let Some(sender) = self.lock().remove(request_id) else {
            debug!("No call waiting for request `{request_id}`, discard the reply");
            return false;
        };

        // The receiver is gone only when the waiting future has been dropped.
        sender.send(response).is_ok()
    }

    fn remove(&self, request_id: &str) {
        let _ = self.lock().remove(request_id);
    }

    #[inline]
    fn lock(&self) -> MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

async fn cancelled(token: Option<&CancellationToken>) {
    match token {
        Some(token) => token.cancelled().await,
        None => std::future::pending().await,
    }
}

/// A single call waiting for its reply.
///
/// Dropping a [`PendingCall`] removes it from its [`PendingCalls`] map.
#[derive(Debug)]
pub struct PendingCall {
    request_id: String,
    receiver: oneshot::Receiver<Response>,
    state: CallState,
    calls: PendingCalls,
}

impl PendingCall {
    /// Returns the request identifier.
    #[must_use]
    pub fn request_id(&self) -> &str {
        &self.request_id
    }

    /// Returns the [`CallState`].
    #[must_use]
    pub const fn state(&self) -> CallState {
        self.state
    }

    /// Marks the call as failed before any reply could arrive.
    pub fn fail(&mut self) {
        if !self.state.is_terminal() {
            self.state = CallState::Failed;
            self.calls.remove(&self.request_id);
        }
    }

    /// Waits for the reply, the deadline or the cancellation, whichever comes
    /// first.
    ///
    /// A failed [`Response`] is returned as is, the caller decides how to
    /// report it.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::Timeout`] error when the deadline elapses, an
    /// [`ErrorKind::Cancelled`] error when the call is cancelled, and an
    /// error of the same kind as the terminal state when the call has already
    /// terminated.
    pub async fn wait(&mut self, options: &CallOptions) -> Result<Response> {
        match self.state {
            CallState::Created | CallState::AwaitingReply => {}
            CallState::TimedOut => return Err(self.timeout_error(options.deadline)),
            CallState::Cancelled => return Err(self.cancelled_error()),
            CallState::Completed | CallState::Failed => {
                return Err(Error::new(
                    ErrorKind::Status,
                    format!("request `{}` already terminated", self.request_id),
                ));
            }
        }

        self.state = CallState::AwaitingReply;

        tokio::select! {
            // A reply and the deadline may be ready together: the reply wins.
            biased;
            reply = &mut self.receiver => match reply {
                Ok(response) => {
                    self.state = if response.success {
                        CallState::Completed
                    } else {
                        CallState::Failed
                    };
                    Ok(response)
                }
                // The slot has been replaced by a call with the same
                // identifier.
                Err(_) => {
                    self.state = CallState::Cancelled;
                    Err(self.cancelled_error())
                }
            },
            () = cancelled(options.cancellation.as_ref()) => {
                self.state = CallState::Cancelled;
                self.calls.remove(&self.request_id);
                debug!("Request `{}` cancelled", self.request_id);
                Err(self.cancelled_error())
            }
            () = tokio::time::sleep(options.deadline) => {
                self.state = CallState::TimedOut;
                self.calls.remove(&self.request_id);
                warn!("Request `{}` timed out", self.request_id);
                Err(self.timeout_error(options.deadline))
            }
        }
    }

    fn timeout_error(&self, deadline: Duration) -> Error {
        Error::new(
            ErrorKind::Timeout,
            format!(
                "no reply to request `{}` within {deadline:?}",
                self.request_id
            ),
        )
    }

    fn cancelled_error(&self) -> Error {
        Error::new(
            ErrorKind::Cancelled,
            format!("request `{}` cancelled", self.request_id),
        )
    }
}

impl Drop for PendingCall {
    fn drop(&mut self) {
        if !self.state.is_terminal() {
            self.calls.remove(&self.request_id);
        }
    }
}
