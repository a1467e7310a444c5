mod cli;
pub mod commands;
pub mod config;
pub mod core;
pub mod db;
pub mod error;
pub mod firewall;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use colored::Colorize;

use cli::{Cli, Command};
use commands::logic::{build_status_rows, register_port, remove_port};
use commands::menu::Menu;
use commands::service::install_service;
use commands::table::render_table;
use config::Config;
use error::AppError;
use firewall::IptablesGateway;

pub fn run() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        tracing::error!("PANIC in portquota: {info}");
        default_hook(info);
    }));

    let cli = Cli::parse();
    let command = cli.resolved_command();
    let config = cli.config();

    // The daemon logs lifecycle events; front-end modes stay quiet unless asked.
    let default_filter = match command {
        Command::Daemon => "portquota_lib=info",
        _ => "portquota_lib=warn",
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let json = matches!(command, Command::Status { json: true });
    match dispatch(command, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if json {
                match serde_json::to_string(&e) {
                    Ok(body) => println!("{body}"),
                    Err(_) => eprintln!("{e}"),
                }
            } else {
                eprintln!("{} {e}", "Error:".red().bold());
            }
            ExitCode::FAILURE
        }
    }
}

fn dispatch(command: Command, config: &Config) -> Result<(), AppError> {
    match command {
        Command::Daemon => run_daemon(config),
        Command::Interactive => {
            let store = db::Database::open(&config.db_path)?;
            let firewall = IptablesGateway::from_config(config);
            Menu::new(config, &store, &firewall)?.run()
        }
        Command::Add {
            port,
            time_limit,
            data_limit,
        } => {
            let store = db::Database::open(&config.db_path)?;
            let firewall = IptablesGateway::from_config(config);
            let row = register_port(
                &store,
                &firewall,
                port,
                time_limit,
                data_limit,
                db::chrono_timestamp(),
            )?;
            println!(
                "{}",
                format!("Port {} is now being monitored.", row.port).green()
            );
            Ok(())
        }
        Command::Delete { port } => {
            let store = db::Database::open(&config.db_path)?;
            let firewall = IptablesGateway::from_config(config);
            if remove_port(&store, &firewall, port)? {
                println!("{}", format!("Port {port} removed.").green());
            } else {
                println!("{}", format!("Port {port} is not monitored.").yellow());
            }
            Ok(())
        }
        Command::Status { json } => print_status(config, json),
        Command::InstallService => {
            let unit = install_service(config)?;
            println!(
                "{}",
                format!("Service installed at {} and started.", unit.display()).green()
            );
            Ok(())
        }
    }
}

fn run_daemon(config: &Config) -> Result<(), AppError> {
    let database = Arc::new(db::Database::open(&config.db_path)?);
    tracing::info!("Database opened at {}", config.db_path.display());
    let firewall: Arc<dyn firewall::FirewallGateway> =
        Arc::new(IptablesGateway::from_config(config));
    let monitor = crate::core::MonitorLoop::new(database, firewall, config.poll_interval);

    // One thread, one cycle at a time.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    runtime.block_on(monitor.run());
    Ok(())
}

fn print_status(config: &Config, json: bool) -> Result<(), AppError> {
    if !config.db_path.exists() {
        return Err(AppError::InvalidInput(format!(
            "Database not found at {}. Run install-service or add a port first.",
            config.db_path.display()
        )));
    }
    let store = db::Database::open(&config.db_path)?;
    store.ensure_schema()?;
    let ports = store.list_all()?;

    if json {
        let body = serde_json::to_string_pretty(&ports)
            .map_err(|e| AppError::Io(e.to_string()))?;
        println!("{body}");
    } else {
        let rows = build_status_rows(&ports, db::chrono_timestamp());
        print!("{}", render_table(&rows, true));
    }
    Ok(())
}
