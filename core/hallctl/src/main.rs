//! hallctl: delivers platform events to the hallmonitor daemon.
//!
//! Sensor listeners, broadcast receivers and init scripts call this binary
//! instead of speaking the socket protocol themselves.
//!
//! ## Subcommands
//!
//! - `proximity`, `screen-on`: cover sensing
//! - `boot`, `start`, `stop`, `admin-result`, `admin-status`: service lifecycle
//! - `call ...`: call screening
//! - `widget ...`: cover widget bindings
//! - `health`, `state`, `config`: inspection

mod daemon_client;
mod logging;

use clap::{ArgAction, Parser, Subcommand};
use hall_core::config::{default_config_path, load_config};
use hall_core::HallError;
use hallmonitor_daemon_protocol::{EventEnvelope, EventType};
use serde_json::Value;
use thiserror::Error;

use daemon_client::ClientError;

#[derive(Parser)]
#[command(name = "hallctl")]
#[command(about = "Hall sensor cover event bridge")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Report a proximity sensor reading (values <= 0 mean "near")
    Proximity {
        #[arg(value_name = "VALUE", allow_negative_numbers = true)]
        value: f32,
    },

    /// The screen turned on (power button)
    ScreenOn,

    /// Device finished booting
    Boot,

    /// Enable the cover service (requests admin rights if needed)
    Start,

    /// Disable the cover service and give up admin rights
    Stop,

    /// Report the outcome of an admin rights request
    AdminResult {
        #[arg(value_name = "GRANTED", action = ArgAction::Set)]
        granted: bool,
    },

    /// Report that admin rights were granted or revoked externally
    AdminStatus {
        #[arg(value_name = "ACTIVE", action = ArgAction::Set)]
        active: bool,
    },

    /// Call screening events
    #[command(subcommand)]
    Call(CallCommand),

    /// Cover widget bindings
    #[command(subcommand)]
    Widget(WidgetCommand),

    /// Check whether the daemon is up
    Health,

    /// Print the daemon's current state as JSON
    State,

    /// Print the effective configuration file contents
    Config,
}

#[derive(Subcommand)]
enum CallCommand {
    /// A call started ringing
    Incoming {
        #[arg(value_name = "NUMBER")]
        number: String,
    },
    /// The call ended or was answered elsewhere
    Finished,
    /// Answer the ringing call
    Answer,
    /// Reject the ringing call
    Hangup,
}

#[derive(Subcommand)]
enum WidgetCommand {
    /// Allocate a widget id for a kind (e.g. "media")
    Register {
        #[arg(value_name = "KIND")]
        kind: String,
    },
    /// Drop the widget bound to a kind
    Unregister {
        #[arg(value_name = "KIND")]
        kind: String,
    },
    /// Result of the widget picker
    Picked {
        #[arg(value_name = "ID")]
        id: u32,
        #[arg(long)]
        cancelled: bool,
    },
    /// Result of the widget configuration step
    Configured {
        #[arg(value_name = "ID")]
        id: u32,
        #[arg(long)]
        cancelled: bool,
    },
}

#[derive(Error, Debug)]
enum CtlError {
    #[error(transparent)]
    Daemon(#[from] ClientError),

    #[error(transparent)]
    Config(#[from] HallError),

    #[error("Failed to render output: {0}")]
    Render(String),
}

fn main() {
    let _logging_guard = logging::init();
    let cli = Cli::parse();

    match run(cli.command) {
        Ok(output) => println!("{}", output),
        Err(err) => {
            tracing::error!(error = %err, "hallctl failed");
            eprintln!("hallctl: {}", err);
            std::process::exit(1);
        }
    }
}

fn run(command: Commands) -> Result<String, CtlError> {
    let data = match command {
        Commands::Proximity { value } => {
            send(EventType::Proximity, |event| event.value = Some(value))?
        }
        Commands::ScreenOn => send(EventType::ScreenOn, |_| {})?,
        Commands::Boot => send(EventType::Boot, |_| {})?,
        Commands::Start => send(EventType::StartService, |_| {})?,
        Commands::Stop => send(EventType::StopService, |_| {})?,
        Commands::AdminResult { granted } => {
            send(EventType::AdminRequestResult, |event| event.granted = Some(granted))?
        }
        Commands::AdminStatus { active } => {
            send(EventType::DeviceAdminStatus, |event| event.active = Some(active))?
        }
        Commands::Call(call) => run_call(call)?,
        Commands::Widget(widget) => run_widget(widget)?,
        Commands::Health => daemon_client::get_health()?,
        Commands::State => daemon_client::get_state()?,
        Commands::Config => return render_config(),
    };
    serde_json::to_string_pretty(&data).map_err(|err| CtlError::Render(err.to_string()))
}

fn run_call(command: CallCommand) -> Result<Value, CtlError> {
    match command {
        CallCommand::Incoming { number } => send(EventType::IncomingCall, |event| {
            event.number = Some(number.clone());
        }),
        CallCommand::Finished => send(EventType::CallFinished, |_| {}),
        CallCommand::Answer => send(EventType::AnswerCall, |_| {}),
        CallCommand::Hangup => send(EventType::HangupCall, |_| {}),
    }
}

fn run_widget(command: WidgetCommand) -> Result<Value, CtlError> {
    match command {
        WidgetCommand::Register { kind } => send(EventType::RegisterWidget, |event| {
            event.widget_kind = Some(kind.clone());
        }),
        WidgetCommand::Unregister { kind } => send(EventType::UnregisterWidget, |event| {
            event.widget_kind = Some(kind.clone());
        }),
        WidgetCommand::Picked { id, cancelled } => {
            widget_result(EventType::WidgetPicked, id, cancelled)
        }
        WidgetCommand::Configured { id, cancelled } => {
            widget_result(EventType::WidgetConfigured, id, cancelled)
        }
    }
}

fn widget_result(event_type: EventType, id: u32, cancelled: bool) -> Result<Value, CtlError> {
    send(event_type, |event| {
        event.widget_id = Some(id);
        event.ok = Some(!cancelled);
    })
}

fn send<F>(event_type: EventType, fill: F) -> Result<Value, CtlError>
where
    F: Fn(&mut EventEnvelope),
{
    tracing::debug!(event_type = ?event_type, "Sending event");
    Ok(daemon_client::send_event(event_type, fill)?)
}

fn render_config() -> Result<String, CtlError> {
    let path = default_config_path()?;
    let config = load_config(&path)?;
    let body = toml::to_string_pretty(&config).map_err(|err| CtlError::Render(err.to_string()))?;
    Ok(format!("# {}\n{}", path.display(), body))
}
