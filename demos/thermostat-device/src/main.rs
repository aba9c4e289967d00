use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use clap::Parser;

use serde_json::json;

use tether::data::{DataType, Value};
use tether::device::{ActionType, AttributeType, Device, DeviceType};

use tether_device::error::{Error as DeviceError, Result as DeviceResult};
use tether_device::handler::DeviceHandler;
use tether_device::responder::Responder;

use tether_transport::mqtt::{BrokerData, MqttConfig, MqttSession};

use tracing::{error, info};

const ROOM_TEMPERATURE: f64 = 20.0;
const BOOST_STEP: f64 = 0.5;
const CHECK_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("transport error: {0}")]
    Transport(#[from] tether_transport::error::Error),
    #[error("device error: {0}")]
    Device(#[from] DeviceError),
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Device identifier.
    #[arg(long, default_value = "thermostat-1")]
    id: String,

    /// Broker host.
    #[arg(long, default_value = "localhost")]
    host: String,

    /// Broker port.
    #[arg(long, default_value_t = 1883)]
    port: u16,

    /// Temperature above which an overheat alarm is reported.
    #[arg(long, default_value_t = 25.0)]
    alarm_threshold: f64,
}

#[derive(Debug)]
struct State {
    temperature: f64,
    mode: String,
}

struct Thermostat {
    state: Mutex<State>,
}

impl Thermostat {
    fn new() -> Self {
        Self {
            state: Mutex::new(State {
                temperature: ROOM_TEMPERATURE,
                mode: "auto".into(),
            }),
        }
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        f(&mut self.state.lock().unwrap_or_else(PoisonError::into_inner))
    }
}

impl DeviceHandler for Thermostat {
    async fn get(&self, attribute: &str) -> DeviceResult<Value> {
        self.with_state(|state| match attribute {
            "temperature" => Ok(Value::Double(state.temperature)),
            "mode" => Ok(Value::Enum(state.mode.clone())),
            _ => Err(DeviceError::internal(format!("no sensor for `{attribute}`"))),
        })
    }

    async fn set(&self, attribute: &str, value: Value) -> DeviceResult<()> {
        if attribute != "mode" {
            return Err(DeviceError::invalid_data(format!(
                "`{attribute}` is read-only"
            )));
        }

        let mode = String::try_from(value)?;
        info!("Mode set to `{mode}`");
        self.with_state(|state| state.mode = mode);
        Ok(())
    }

    async fn invoke(&self, action: &str, request: Option<Value>) -> DeviceResult<Option<Value>> {
        match (action, request) {
            ("reboot", None) => {
                info!("Rebooting");
                self.with_state(|state| {
                    state.temperature = ROOM_TEMPERATURE;
                    state.mode = "auto".into();
                });
                Ok(None)
            }
            ("boost", Some(Value::Integer(steps))) => {
                let temperature = self.with_state(|state| {
                    state.temperature += steps as f64 * BOOST_STEP;
                    state.temperature
                });
                info!("Boosted to {temperature}");
                Ok(Some(Value::Double(temperature)))
            }
            _ => Err(DeviceError::invalid_data(format!(
                "invalid invocation of `{action}`"
            ))),
        }
    }
}

fn thermostat(id: &str) -> Device {
    Device::new(
        id,
        DeviceType::new("thermostat")
            .with_attribute(
                "temperature",
                AttributeType::new(DataType::double_range(-50.0, 100.0))
                    .description("Room temperature in Celsius degrees"),
            )
            .with_attribute(
                "mode",
                AttributeType::new(DataType::enumeration(["auto", "heat", "cool", "off"]))
                    .description("Operating mode"),
            )
            .with_action(
                "reboot",
                ActionType::new().description("Restore the factory settings"),
            )
            .with_action(
                "boost",
                ActionType::new()
                    .request(DataType::integer_range(1, 10))
                    .response(DataType::double())
                    .description("Raise the temperature by half a degree per step"),
            ),
    )
    .name("Thermostat")
}

async fn run(cli: Cli) -> Result<(), DemoError> {
    let config = MqttConfig::new(cli.id.as_str(), BrokerData::new(cli.host, cli.port));
    let session = MqttSession::connect(&config)?;

    let mut responder = Responder::new(thermostat(&cli.id), session.clone(), Thermostat::new());
    responder.start().await?;

    let mut interval = tokio::time::interval(CHECK_INTERVAL);
    let mut overheating = false;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            _ = interval.tick() => {
                let temperature = responder.handler().with_state(|state| state.temperature);
                let overheat = temperature > cli.alarm_threshold;

                // Report only when crossing the threshold.
                if overheat && !overheating {
                    if let Err(e) = responder
                        .report_alarm("overheat", json!({ "temperature": temperature }))
                        .await
                    {
                        error!("Impossible to report the alarm: {e}");
                    }
                }
                overheating = overheat;
            }
        }
    }

    responder.stop();
    session.shutdown().await;
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}
