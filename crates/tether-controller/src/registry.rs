use std::time::Duration;

use hashbrown::HashMap;

use reqwest::{Client, Response as ReqwestResponse, StatusCode, Url};

use serde::{Serialize, de::DeserializeOwned};

use tether::device::Device;

use tracing::{debug, error};

use crate::error::{Error, ErrorKind, Result};

// Maximum time to wait for the registry to answer.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// A source of device metadata.
///
/// Devices are fetched on every call and never cached, so a metadata change
/// is visible to the next call.
pub trait Registry: Send + Sync {
    /// Fetches a [`Device`] snapshot.
    ///
    /// # Errors
    ///
    /// An [`ErrorKind::NotFound`] error when the device is unknown, an
    /// [`ErrorKind::Registry`] error when the metadata cannot be retrieved.
    fn fetch_device(&self, device_id: &str) -> impl Future<Output = Result<Device>> + Send;
}

/// The configuration of an [`HttpRegistry`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegistryConfig {
    base_url: String,
    request_timeout: Duration,
}

impl RegistryConfig {
    /// Creates a [`RegistryConfig`] with a ten seconds request timeout.
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            request_timeout: REQUEST_TIMEOUT,
        }
    }

    /// Sets the request timeout.
    #[must_use]
    pub const fn request_timeout(mut self, request_timeout: Duration) -> Self {
        self.request_timeout = request_timeout;
        self
    }
}

async fn json_response<T>(response: ReqwestResponse) -> Result<T>
where
    T: DeserializeOwned,
{
    response
        .json::<T>()
        .await
        .map_err(|e| Error::new(ErrorKind::Registry, format!("Json error caused by {e}")))
}

/// A registry which retrieves device metadata over `HTTP`.
///
/// - `GET {base_url}/device/{id}` returns a single device
/// - `GET {base_url}/devices/list` returns the devices matching the query
///   parameters
#[derive(Debug, Clone)]
pub struct HttpRegistry {
    client: Client,
    base_url: Url,
}

impl HttpRegistry {
    /// Creates an [`HttpRegistry`].
    ///
    /// # Errors
    ///
    /// The base `URL` is not a valid `HTTP` base, or the `HTTP` client cannot
    /// be initialized.
    pub fn new(config: &RegistryConfig) -> Result<Self> {
        let base_url = Url::parse(&config.base_url).map_err(|e| {
            Error::new(
                ErrorKind::Registry,
                format!("invalid registry url `{}`: {e}", config.base_url),
            )
        })?;

        if base_url.cannot_be_a_base() {
            return Err(Error::new(
                ErrorKind::Registry,
                format!("`{base_url}` cannot be a registry url"),
            ));
        }

        let client = Client::builder().timeout(config.request_timeout).build()?;

        Ok(Self { client, base_url })
    }

    /// Retrieves the devices matching the given query parameters.
    ///
    /// # Errors
    ///
    /// The registry cannot be reached or answers with an error.
    pub async fn query_devices<Q>(&self, query: &Q) -> Result<Vec<Device>>
    where
        Q: Serialize + ?Sized,
    {
        let url = self.endpoint(&["devices", "list"]);
        debug!("Querying devices at `{url}`");

        let response = self
            .client
            .get(url)
            .query(query)
            .send()
            .await
            .map_err(|e| {
                error!("Impossible to query devices: {e}");
                Error::from(e)
            })?
            .error_for_status()?;

        json_response(response).await
    }

    fn device_url(&self, device_id: &str) -> Url {
        self.endpoint(&["device", device_id])
    }

    // Each segment is percent-encoded, so it never spills into the query.
    fn endpoint(&self, segments: &[&str]) -> Url {
        let mut url = self.base_url.clone();
        // Only fails for cannot-be-a-base urls, rejected on creation.
        if let Ok(mut path) = url.path_segments_mut() {
            let _ = path.pop_if_empty().extend(segments);
        }
        url
    }
}

impl Registry for HttpRegistry {
    async fn fetch_device(&self, device_id: &str) -> Result<Device> {
        let url = self.device_url(device_id);
        debug!("Fetching device at `{url}`");

        let response = self.client.get(url).send().await.map_err(|e| {
            error!("Impossible to fetch device `{device_id}`: {e}");
            Error::from(e)
        })?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::new(
                ErrorKind::NotFound,
                format!("device `{device_id}` not found"),
            ));
        }

        json_response(response.error_for_status()?).await
    }
}

/// A registry holding a fixed set of devices in memory.
#[derive(Debug, Clone, Default)]
pub struct StaticRegistry {
    devices: HashMap<String, Device>,
}

impl StaticRegistry {
    /// Creates an empty [`StaticRegistry`].
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a [`Device`], replacing any device with the same identifier.
    #[must_use]
    pub fn with_device(mut self, device: Device) -> Self {
        self.insert(device);
        self
    }

    /// Adds a [`Device`], replacing any device with the same identifier.
    pub fn insert(&mut self, device: Device) {
        let _ = self.devices.insert(device.id.clone(), device);
    }

    /// Removes a [`Device`].
    pub fn remove(&mut self, device_id: &str) -> Option<Device> {
        self.devices.remove(device_id)
    }

    /// Returns the number of devices.
    #[must_use]
    pub fn len(&self) -> usize {
        self.devices.len()
    }

    /// Whether the registry is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.devices.is_empty()
    }
}

impl FromIterator<Device> for StaticRegistry {
    fn from_iter<I: IntoIterator<Item = Device>>(iter: I) -> Self {
        let mut registry = Self::new();
        for device in iter {
            registry.insert(device);
        }
        registry
    }
}

impl Registry for StaticRegistry {
    async fn fetch_device(&self, device_id: &str) -> Result<Device> {
        self.devices.get(device_id).cloned().ok_or_else(|| {
            Error::new(
                ErrorKind::NotFound,
                format!("device `{device_id}` not found"),
            )
        })
    }
}
