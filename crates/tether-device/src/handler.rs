use tether::data::Value;

use crate::error::{Error, ErrorKind, Result};

/// The device logic invoked by a [`crate::responder::Responder`].
///
/// Values are already decoded with the [`tether::data::DataType`] declared by
/// the device type, and returned values are encoded with it. A method which
/// is not overridden answers with an [`ErrorKind::Unsupported`] error.
///
/// The responder serves requests concurrently, so the handler must protect
/// its own state.
pub trait DeviceHandler: Send + Sync + 'static {
    /// Reads an attribute.
    fn get(&self, attribute: &str) -> impl Future<Output = Result<Value>> + Send {
        let error = unsupported("reading", attribute);
        async move { Err(error) }
    }

    /// Writes an attribute.
    fn set(&self, attribute: &str, value: Value) -> impl Future<Output = Result<()>> + Send {
        let _ = value;
        let error = unsupported("writing", attribute);
        async move { Err(error) }
    }

    /// Invokes an action.
    ///
    /// `request` is present if and only if the action declares a request
    /// type, and the returned value must be present if and only if the
    /// action declares a response type.
    fn invoke(
        &self,
        action: &str,
        request: Option<Value>,
    ) -> impl Future<Output = Result<Option<Value>>> + Send {
        let _ = request;
        let error = unsupported("invoking", action);
        async move { Err(error) }
    }
}

fn unsupported(operation: &str, name: &str) -> Error {
    Error::new(
        ErrorKind::Unsupported,
        format!("{operation} `{name}` is not supported"),
    )
}

#[cfg(test)]
mod tests {
    use tether::data::Value;

    use crate::error::ErrorKind;

    use super::DeviceHandler;

    struct ReadOnly;

    impl DeviceHandler for ReadOnly {
        async fn get(&self, _attribute: &str) -> crate::error::Result<Value> {
            Ok(Value::Double(21.5))
        }
    }

    #[tokio::test]
    async fn default_methods_are_unsupported() {
        let handler = ReadOnly;

        assert_eq!(handler.get("temperature").await, Ok(Value::Double(21.5)));

        let error = handler.set("mode", Value::Enum("auto".into())).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
        assert_eq!(error.description(), "writing `mode` is not supported");

        let error = handler.invoke("reboot", None).await.unwrap_err();
        assert_eq!(error.kind(), ErrorKind::Unsupported);
    }
}
