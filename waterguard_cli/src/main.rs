use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::*;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::watch;
use waterguard_cli::config::{AppConfig, ConfigManager, HubOverrides};
use waterguard_cli::notifier::LogNotifier;
use waterguard_cli::output::{OutputFormat, OutputFormatter, create_formatter};
use waterguard_cli::terminal;
use waterguard_core::protocol::UdpTransport;
use waterguard_core::{
    DeviceClient, HubConfig, PollingCoordinator, ValveAction, probe_device_ids,
};

#[derive(Parser)]
#[command(name = "waterguard")]
#[command(author, version, about = "Waterguard Linkbox water-leak hub client", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Hub host name or IP address
    #[arg(long, global = true)]
    host: Option<String>,

    /// Hub UDP port
    #[arg(long, global = true)]
    port: Option<u16>,

    /// Device instance of the hub
    #[arg(long, global = true)]
    device_id: Option<u32>,

    /// Use this configuration file instead of the default location
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read every value from the hub once
    Status,

    /// Poll the hub until interrupted, reporting alarms as they change
    Monitor,

    /// Open or close the water valves
    Valve {
        /// One of: open, close, n/a
        action: String,
    },

    /// Reset the leak alarm
    ResetAlarm {
        /// Value written to the reset object
        #[arg(long, default_value_t = 2)]
        value: u32,
    },

    /// Discover wireless sensors paired with the hub
    DiscoverSensors,

    /// Probe for the hub's device id
    Probe,

    /// Print a diagnostics report
    Diagnose {
        /// Test wireless sensor connectivity instead
        #[arg(long)]
        wireless: bool,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,

    /// Print the configuration file path
    Path,

    /// Get a configuration value
    Get {
        /// Configuration key (e.g., hub.host)
        key: String,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., poll.scan_interval)
        key: String,

        /// Value to set
        value: String,
    },

    /// List all configuration values
    List,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.debug {
        env_logger::Builder::from_env(env_logger::Env::default())
            .filter_level(log::LevelFilter::Debug)
            .filter_module("waterguard_core", log::LevelFilter::Debug)
            .filter_module("waterguard_cli", log::LevelFilter::Debug)
            .format_timestamp_millis()
            .init();
        eprintln!("Debug logging enabled");
    } else {
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    }

    let manager = match &cli.config {
        Some(path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = manager.load().context("Failed to load configuration")?;
    config.apply_cli_overrides(&HubOverrides {
        host: cli.host.clone(),
        port: cli.port,
        device_id: cli.device_id,
    });

    let format = OutputFormat::from_json_flag(cli.json);
    let formatter = create_formatter(format, !cli.json && terminal::use_color());

    match cli.command {
        Commands::Status => {
            let client = connect(&config)?;
            let status = client
                .get_all_status(true)
                .await
                .context("Failed to read hub status")?;
            if status.is_empty() {
                anyhow::bail!(
                    "No response from hub at {}:{}",
                    config.hub.host,
                    config.hub.port
                );
            }
            print!("{}", formatter.format_status(&status)?);
        }
        Commands::Monitor => {
            monitor(config, formatter.as_ref(), cli.json).await?;
        }
        Commands::Valve { action } => {
            let action: ValveAction = action.parse()?;
            let client = connect(&config)?;
            let acknowledged = client
                .control_valve(action)
                .await
                .context("Failed to send valve command")?;
            if !acknowledged {
                anyhow::bail!("Hub did not acknowledge valve command '{action}'");
            }
            eprintln!("{}", format!("Valve command '{action}' sent").green());
        }
        Commands::ResetAlarm { value } => {
            let client = connect(&config)?;
            let acknowledged = client
                .reset_alarm(value)
                .await
                .context("Failed to reset alarm")?;
            if !acknowledged {
                anyhow::bail!("Hub did not acknowledge alarm reset");
            }
            eprintln!("{}", "Alarm reset".green());
        }
        Commands::DiscoverSensors => {
            let client = connect(&config)?;
            let sensors = client
                .discover_wireless_sensors()
                .await
                .context("Wireless sensor discovery failed")?;
            print!("{}", formatter.format_sensors(&sensors)?);
        }
        Commands::Probe => {
            validate_hub(&config.hub)?;
            let transport = UdpTransport::new(config.hub.transport_config());
            let probe = probe_device_ids(&transport)
                .await
                .context("Device id probe failed")?;
            print!("{}", formatter.format_probe(&probe)?);
        }
        Commands::Diagnose { wireless } => {
            diagnose(config, formatter.as_ref(), wireless).await?;
        }
        Commands::Config { command } => {
            config_command(command, manager, &config)?;
        }
    }

    Ok(())
}

fn validate_hub(hub: &HubConfig) -> Result<()> {
    hub.validate().context(
        "Hub is not configured; use --host, WATERGUARD_HUB__HOST or `waterguard config set hub.host <HOST>`",
    )
}

fn connect(config: &AppConfig) -> Result<DeviceClient> {
    validate_hub(&config.hub)?;
    log::debug!(
        "Connecting to {}:{} (device {})",
        config.hub.host,
        config.hub.port,
        config.hub.device_id
    );
    Ok(DeviceClient::with_udp(
        config.hub.transport_config(),
        config.hub.device_id,
    ))
}

fn build_coordinator(config: AppConfig, notifier: LogNotifier) -> Result<Arc<PollingCoordinator>> {
    validate_hub(&config.hub)?;
    let coordinator =
        PollingCoordinator::from_config(config.hub, config.poll, config.notifications)
            .context("Failed to create polling coordinator")?
            .with_notifier(Arc::new(notifier));
    Ok(Arc::new(coordinator))
}

async fn monitor(config: AppConfig, formatter: &dyn OutputFormatter, json: bool) -> Result<()> {
    let notifier = if json {
        LogNotifier::quiet()
    } else {
        LogNotifier::new()
    };
    let coordinator = build_coordinator(config, notifier)?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let mut updates = coordinator.subscribe();

    let runner = {
        let coordinator = coordinator.clone();
        tokio::spawn(async move { coordinator.run(shutdown_rx).await })
    };

    if !json {
        eprintln!("{}", "Monitoring hub, press Ctrl-C to stop".bold().cyan());
    }

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut printed_cycle = 0;

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result.context("Failed to listen for Ctrl-C")?;
                break;
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.cycles == printed_cycle {
                    continue;
                }
                printed_cycle = snapshot.cycles;
                print!("{}", formatter.format_snapshot(&snapshot)?);
            }
        }
    }

    let _ = shutdown_tx.send(true);
    coordinator.stop();
    runner.await.context("Polling task failed")??;
    Ok(())
}

async fn diagnose(
    config: AppConfig,
    formatter: &dyn OutputFormatter,
    wireless: bool,
) -> Result<()> {
    let coordinator = build_coordinator(config, LogNotifier::quiet())?;

    if wireless {
        let run = coordinator
            .diagnose_wireless()
            .await
            .context("Wireless diagnostic failed")?;
        let trend = coordinator.wireless_trend().await;
        print!("{}", formatter.format_wireless_run(&run, &trend)?);
        return Ok(());
    }

    if let Err(e) = coordinator.refresh().await {
        log::warn!("Poll cycle failed: {e}");
    }
    let report = coordinator.diagnostics().await;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn config_command(
    command: ConfigCommand,
    mut manager: ConfigManager,
    config: &AppConfig,
) -> Result<()> {
    match command {
        ConfigCommand::Show => {
            print!("{}", toml::to_string_pretty(config)?);
        }
        ConfigCommand::Path => {
            println!("{}", manager.get_config_path().display());
        }
        ConfigCommand::Get { key } => {
            println!("{}", manager.get(&key)?);
        }
        ConfigCommand::Set { key, value } => {
            manager.set(&key, &value)?;
            eprintln!("{}", format!("Set {key} = {value}").green());
            eprintln!(
                "Configuration saved to: {}",
                manager.get_config_path().display()
            );
        }
        ConfigCommand::List => {
            let items = manager.list()?;
            eprintln!("Config file: {}", manager.get_config_path().display());
            for (key, value) in items {
                println!("{} = {}", key.yellow(), value);
            }
        }
    }
    Ok(())
}
