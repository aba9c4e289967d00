use chrono::{DateTime, Utc};

use tether::data::{CodecError, Location, Value};

use tether_transport::Session;

use crate::dispatcher::Dispatcher;
use crate::error::{Error, ErrorKind, Result};
use crate::pending::CallOptions;
use crate::registry::Registry;

impl<S, R> Dispatcher<S, R>
where
    S: Session,
    R: Registry,
{
    /// Reads an attribute and converts its value into `T`.
    ///
    /// # Errors
    ///
    /// The errors of [`Dispatcher::get_attribute`], and [`ErrorKind::Value`]
    /// if the value is not a `T`.
    pub async fn get_as<T>(
        &self,
        device_id: &str,
        attribute: &str,
        options: impl Into<CallOptions>,
    ) -> Result<T>
    where
        T: TryFrom<Value, Error = CodecError>,
    {
        let value = self.get_attribute(device_id, attribute, options).await?;
        T::try_from(value).map_err(Error::from)
    }

    /// Invokes an action and converts its response into `T`.
    ///
    /// # Errors
    ///
    /// The errors of [`Dispatcher::invoke_action`], and [`ErrorKind::Value`]
    /// if the action declares no response or the response is not a `T`.
    pub async fn action_as<T>(
        &self,
        device_id: &str,
        action: &str,
        request: Option<Value>,
        options: impl Into<CallOptions>,
    ) -> Result<T>
    where
        T: TryFrom<Value, Error = CodecError>,
    {
        let value = self
            .invoke_action(device_id, action, request, options)
            .await?
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::Value,
                    format!("action `{action}` declares no response"),
                )
            })?;
        T::try_from(value).map_err(Error::from)
    }

    /// Invokes an action, discarding its response.
    ///
    /// # Errors
    ///
    /// The errors of [`Dispatcher::invoke_action`].
    pub async fn invoke_action_without_response(
        &self,
        device_id: &str,
        action: &str,
        request: Option<Value>,
        options: impl Into<CallOptions>,
    ) -> Result<()> {
        let _ = self
            .invoke_action(device_id, action, request, options)
            .await?;
        Ok(())
    }
}

macro_rules! typed_calls {
    ($($get:ident, $action:ident => $ty:ty, $name:literal;)+) => {
        impl<S, R> Dispatcher<S, R>
        where
            S: Session,
            R: Registry,
        {
            $(
                #[doc = concat!("Reads ", $name, " attribute.")]
                ///
                /// # Errors
                ///
                /// The errors of [`Dispatcher::get_as`].
                pub async fn $get(
                    &self,
                    device_id: &str,
                    attribute: &str,
                    options: impl Into<CallOptions>,
                ) -> Result<$ty> {
                    self.get_as::<$ty>(device_id, attribute, options).await
                }

                #[doc = concat!("Invokes an action returning ", $name, " value.")]
                ///
                /// # Errors
                ///
                /// The errors of [`Dispatcher::action_as`].
                pub async fn $action(
                    &self,
                    device_id: &str,
                    action: &str,
                    request: Option<Value>,
                    options: impl Into<CallOptions>,
                ) -> Result<$ty> {
                    self.action_as::<$ty>(device_id, action, request, options).await
                }
            )+
        }
    };
}

typed_calls! {
    get_int, action_int => i64, "an integer";
    get_double, action_double => f64, "a double";
    get_string, action_string => String, "a string";
    get_date, action_date => DateTime<Utc>, "a date";
    get_enum, action_enum => String, "an enumeration";
    get_location, action_location => Location, "a location";
    get_bool, action_bool => bool, "a boolean";
}
