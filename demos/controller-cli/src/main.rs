use std::time::Duration;

use clap::{Parser, Subcommand};

use serde_json::Value as JsonValue;

use tether::data::{DataType, Value, WireValue};
use tether::device::{ActionType, AttributeType, Device, DeviceType};

use tether_controller::alarms::AlarmReceiver;
use tether_controller::dispatcher::Dispatcher;
use tether_controller::error::{Error as ControllerError, Result as ControllerResult};
use tether_controller::registry::{HttpRegistry, Registry, RegistryConfig, StaticRegistry};

use tether_transport::mqtt::{BrokerData, MqttConfig, MqttSession};

use tracing::error;

// Alarms buffered while printing.
const ALARM_BUFFER: usize = 16;

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error("transport error: {0}")]
    Transport(#[from] tether_transport::error::Error),
    #[error("{0}")]
    Controller(#[from] ControllerError),
    #[error("`{0}` is not declared by the device")]
    Undeclared(String),
    #[error("signal error: {0}")]
    Signal(#[from] std::io::Error),
}

#[derive(Parser)]
#[command(name = "tether", version, about, long_about = None)]
struct Cli {
    /// Broker host.
    #[arg(long, default_value = "localhost", global = true)]
    host: String,

    /// Broker port.
    #[arg(long, default_value_t = 1883, global = true)]
    port: u16,

    /// Base URL of the device registry. The built-in thermostat metadata is
    /// used when missing.
    #[arg(long, global = true)]
    registry: Option<String>,

    /// Target device.
    #[arg(short, long, default_value = "thermostat-1", global = true)]
    device: String,

    /// Call deadline in milliseconds.
    #[arg(short, long, default_value_t = 5000, global = true)]
    timeout: u64,

    #[command(subcommand)]
    command: Command,
}

/// Available commands.
#[derive(Subcommand)]
enum Command {
    /// Read an attribute.
    Get {
        /// Attribute name.
        attribute: String,
    },
    /// Write an attribute.
    Set {
        /// Attribute name.
        attribute: String,
        /// New value, as `JSON` or as a plain string.
        value: String,
    },
    /// Invoke an action.
    Action {
        /// Action name.
        action: String,
        /// Request value, as `JSON` or as a plain string.
        value: Option<String>,
    },
    /// Print the alarms reported by the device.
    Alarms,
}

enum AnyRegistry {
    Http(HttpRegistry),
    Static(StaticRegistry),
}

impl Registry for AnyRegistry {
    async fn fetch_device(&self, device_id: &str) -> ControllerResult<Device> {
        match self {
            Self::Http(registry) => registry.fetch_device(device_id).await,
            Self::Static(registry) => registry.fetch_device(device_id).await,
        }
    }
}

fn thermostat(id: &str) -> Device {
    Device::new(
        id,
        DeviceType::new("thermostat")
            .with_attribute(
                "temperature",
                AttributeType::new(DataType::double_range(-50.0, 100.0)),
            )
            .with_attribute(
                "mode",
                AttributeType::new(DataType::enumeration(["auto", "heat", "cool", "off"])),
            )
            .with_action("reboot", ActionType::new())
            .with_action(
                "boost",
                ActionType::new()
                    .request(DataType::integer_range(1, 10))
                    .response(DataType::double()),
            ),
    )
}

// Command line values are decoded with the declared type, exactly as a
// device would: `21.5`, `true`, `{"longitude": 9.19, "latitude": 45.46}`.
// Anything which is not `JSON` is taken as a string.
fn parse_value(data_type: &DataType, raw: &str) -> Result<Value, CliError> {
    let json = serde_json::from_str(raw).unwrap_or_else(|_| JsonValue::from(raw));
    data_type
        .decode(&WireValue::new(json))
        .map_err(|e| CliError::Controller(e.into()))
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let registry = match &cli.registry {
        Some(base_url) => AnyRegistry::Http(HttpRegistry::new(&RegistryConfig::new(
            base_url.as_str(),
        ))?),
        None => AnyRegistry::Static(StaticRegistry::new().with_device(thermostat(&cli.device))),
    };

    let config = MqttConfig::new(
        format!("tether-cli-{}", std::process::id()),
        BrokerData::new(cli.host.as_str(), cli.port),
    );
    let session = MqttSession::connect(&config)?;
    let deadline = Duration::from_millis(cli.timeout);
    let device_id = cli.device.as_str();

    let dispatcher = Dispatcher::new(session.clone(), registry);

    let outcome = match cli.command {
        Command::Get { attribute } => dispatcher
            .get_attribute(device_id, &attribute, deadline)
            .await
            .map(|value| println!("{attribute} = {value}"))
            .map_err(CliError::from),
        Command::Set { attribute, value } => {
            let device = dispatcher.registry().fetch_device(device_id).await?;
            let data_type = &device
                .device_type
                .attribute(&attribute)
                .ok_or_else(|| CliError::Undeclared(attribute.clone()))?
                .data_type;

            let value = parse_value(data_type, &value)?;
            dispatcher
                .set_attribute(device_id, &attribute, value, deadline)
                .await
                .map(|()| println!("{attribute} updated"))
                .map_err(CliError::from)
        }
        Command::Action { action, value } => {
            let device = dispatcher.registry().fetch_device(device_id).await?;
            let action_type = device
                .device_type
                .action(&action)
                .ok_or_else(|| CliError::Undeclared(action.clone()))?;

            let request = match (&action_type.request, value) {
                (Some(data_type), Some(raw)) => Some(parse_value(data_type, &raw)?),
                // Let the dispatcher report missing or unexpected values.
                (Some(_), None) => None,
                (None, raw) => raw.map(Value::String),
            };

            dispatcher
                .invoke_action(device_id, &action, request, deadline)
                .await
                .map(|response| match response {
                    Some(value) => println!("{action} -> {value}"),
                    None => println!("{action} done"),
                })
                .map_err(CliError::from)
        }
        Command::Alarms => print_alarms(&session, device_id).await,
    };

    session.shutdown().await;
    outcome
}

async fn print_alarms(session: &MqttSession, device_id: &str) -> Result<(), CliError> {
    let mut receiver = AlarmReceiver::subscribe(session, device_id, ALARM_BUFFER).await?;

    loop {
        tokio::select! {
            signal = tokio::signal::ctrl_c() => {
                signal?;
                break;
            }
            alarm = receiver.recv() => match alarm {
                Some(alarm) => println!("{alarm}"),
                None => break,
            }
        }
    }

    receiver.stop();
    Ok(())
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::WARN)
        .init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        error!("{e}");
        std::process::exit(1);
    }
}
