mod config;
mod monitor;
mod protocol;
mod replay;
mod server;
mod signal;
mod source;
mod transport;

use crate::config::{Settings, expand_socket_path};
use crate::protocol::{ClientMessage, ServerMessage};
use crate::server::SocketServer;
use crate::source::{BAUD_RATES, SerialSource};
use crate::transport::AsyncTransport;
use anyhow::{Context, Result, anyhow, bail};
use clap::{Parser, Subcommand};
use jiff::Zoned;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ecgmon")]
#[command(about = "Real-time heart rate monitor for serial ECG sensors")]
#[command(version = "0.1.0")]
struct Cli {
    /// Service socket path (overrides the config file)
    #[arg(long, global = true)]
    socket_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the monitoring service
    Service {
        /// Number of recent samples kept in the rolling window
        #[arg(long)]
        buffer_capacity: Option<usize>,
    },

    /// Open a serial port and start a monitoring session
    Connect {
        /// Serial port (e.g., /dev/ttyUSB0)
        port: String,

        /// Baud rate (9600, 19200, 38400, 57600 or 115200)
        #[arg(long)]
        baud_rate: Option<u32>,
    },

    /// Stop the current monitoring session
    Disconnect,

    /// Print the rolling sample window
    Samples {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Print the current heart rate
    HeartRate {
        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },

    /// Check service health and session state
    Status,

    /// Follow heart rate updates from the service
    Watch,

    /// List available serial ports
    Ports,

    /// Run a recorded signal through the detector offline
    Replay {
        /// File with one reading per line
        file: PathBuf,

        /// Sample rate of the recording in Hz
        #[arg(long, default_value = "100")]
        sample_rate: f64,

        /// Output format
        #[arg(long, value_enum, default_value = "text")]
        format: OutputFormat,
    },
}

#[derive(clap::ValueEnum, Clone, Debug)]
enum OutputFormat {
    Text,
    Json,
}

fn client(settings: &Settings) -> AsyncTransport {
    AsyncTransport::new(expand_socket_path(&settings.socket_path))
}

async fn request(settings: &Settings, message: ClientMessage) -> Result<ServerMessage> {
    match client(settings).send_request(&message).await? {
        ServerMessage::Error { error, .. } => Err(anyhow!("Error from service: {}", error)),
        response => Ok(response),
    }
}

fn unexpected(response: ServerMessage) -> anyhow::Error {
    anyhow!("Unexpected response type: {:?}", response)
}

fn format_bpm(bpm: Option<u32>) -> String {
    bpm.map(|b| b.to_string()).unwrap_or_else(|| "--".to_string())
}

async fn run_service(settings: Settings) -> Result<()> {
    let socket_path = expand_socket_path(&settings.socket_path);

    log::info!("Starting ecgmon service");
    log::info!("Socket: {}", socket_path);
    log::info!("Buffer capacity: {}", settings.buffer_capacity);

    let mut server = SocketServer::new(&socket_path, &settings)
        .with_context(|| format!("Failed to create socket server at {}", socket_path))?;

    // systemd stops services with SIGTERM; treat it like Ctrl-C
    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                if terminate.recv().await.is_some() {
                    log::info!("Termination signal received");
                    shutdown.shutdown();
                }
            }
            Err(e) => log::warn!("Failed to install SIGTERM handler: {}", e),
        }
    });

    server.run().await.context("Socket server error")
}

async fn watch(settings: &Settings) -> Result<()> {
    let mut conn = client(settings).connect().await?;
    conn.write_message(&ClientMessage::new_subscribe()).await?;

    while let Some(message) = conn.read_server_message().await? {
        match message {
            ServerMessage::Subscribed { .. } => println!("Watching heart rate (Ctrl-C to stop)"),
            ServerMessage::StatusEvent {
                phase, bpm, samples, ..
            } => {
                println!(
                    "{} {:<11} {:>4} bpm {:>8} samples",
                    Zoned::now().strftime("%H:%M:%S"),
                    phase.as_str(),
                    format_bpm(bpm),
                    samples
                );
            }
            ServerMessage::Error { error, .. } => bail!("Error from service: {}", error),
            other => log::debug!("Ignoring message: {:?}", other),
        }
    }

    Ok(())
}

fn list_ports() -> Result<()> {
    let ports = SerialSource::list_ports().context("Failed to list serial ports")?;

    if ports.is_empty() {
        println!("No serial ports found");
    } else {
        println!("Available Serial Ports:");
        println!("{:<24} {:<10} Description", "Name", "Type");
        println!("{}", "-".repeat(70));
        for port in ports {
            println!(
                "{:<24} {:<10} {}",
                port.name,
                port.kind,
                port.description.as_deref().unwrap_or("")
            );
        }
    }

    let rates = BAUD_RATES
        .iter()
        .map(|r| r.to_string())
        .collect::<Vec<_>>()
        .join(", ");
    println!("\nBaud rates: {}", rates);
    Ok(())
}

async fn run(cli: Cli) -> Result<()> {
    let mut settings = Settings::load();
    if let Some(socket_path) = cli.socket_path {
        settings.socket_path = socket_path;
    }

    match cli.command {
        Commands::Service { buffer_capacity } => {
            if let Some(capacity) = buffer_capacity {
                settings.buffer_capacity = capacity;
            }
            run_service(settings).await?;
        }

        Commands::Connect { port, baud_rate } => {
            let baud_rate = baud_rate.unwrap_or(settings.baud_rate);
            match request(&settings, ClientMessage::new_connect(port, baud_rate)).await? {
                ServerMessage::Connected {
                    source, baud_rate, ..
                } => println!("Connected to {} at {} baud", source, baud_rate),
                other => return Err(unexpected(other)),
            }
        }

        Commands::Disconnect => match request(&settings, ClientMessage::new_disconnect()).await? {
            ServerMessage::Disconnected { .. } => println!("Disconnected"),
            other => return Err(unexpected(other)),
        },

        Commands::Samples { format } => {
            match request(&settings, ClientMessage::new_samples()).await? {
                ServerMessage::Samples { values, .. } => match format {
                    OutputFormat::Text => {
                        for value in values {
                            println!("{}", value);
                        }
                    }
                    OutputFormat::Json => {
                        let json = serde_json::json!({ "data": values });
                        println!("{}", serde_json::to_string_pretty(&json)?);
                    }
                },
                other => return Err(unexpected(other)),
            }
        }

        Commands::HeartRate { format } => {
            match request(&settings, ClientMessage::new_heart_rate()).await? {
                ServerMessage::HeartRate { bpm, .. } => match format {
                    OutputFormat::Text => println!("{} bpm", format_bpm(bpm)),
                    OutputFormat::Json => {
                        let json = serde_json::json!({ "heart_rate": bpm });
                        println!("{}", serde_json::to_string_pretty(&json)?);
                    }
                },
                other => return Err(unexpected(other)),
            }
        }

        Commands::Status => {
            let response = request(&settings, ClientMessage::new_status()).await?;
            if !matches!(response, ServerMessage::Status { .. }) {
                return Err(unexpected(response));
            }

            // Drop the envelope fields, keep the report
            let mut json = serde_json::to_value(&response)?;
            if let Some(object) = json.as_object_mut() {
                object.remove("type");
                object.remove("id");
            }
            println!("Service Status:");
            println!("{}", serde_json::to_string_pretty(&json)?);
        }

        Commands::Watch => watch(&settings).await?,

        Commands::Ports => list_ports()?,

        Commands::Replay {
            file,
            sample_rate,
            format,
        } => {
            let summary = replay::replay_file(&file, sample_rate, settings.buffer_capacity)?;
            match format {
                OutputFormat::Text => {
                    println!("Samples:        {}", summary.samples);
                    println!("Skipped lines:  {}", summary.skipped_lines);
                    println!("Duration:       {:.1}s", summary.duration_seconds);
                    println!("Peaks detected: {}", summary.peaks_detected);
                    if let Some(magnitude) = summary.mean_peak_magnitude {
                        println!("Mean peak:      {:.2}", magnitude);
                    }
                    println!("Heart rate:     {} bpm", format_bpm(summary.heart_rate));
                }
                OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
            }
        }
    }

    Ok(())
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{:#}", e);
        std::process::exit(1);
    }
}
