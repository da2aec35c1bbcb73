//! amt-power entry point: CLI dispatch, logging, Ctrl+C cancellation.

mod amt;
mod app;
mod config;
mod error;
mod power;
mod wsman;

use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use amt::Amt;
use app::cli::{Args, HELP_TEXT};
use app::logging::{filter_for_level, init_tracing, reload_level};
use config::persistence::{load_config, validate};
use config::setup::run_setup_wizard;
use config::types::AmtConfig;
use power::state::describe_all;
use power::toggle::{toggle_power, ToggleOptions, ToggleOutcome, WaitOptions};
use wsman::{Session, WsmanCli};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments with custom error handling
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            if err.kind() == clap::error::ErrorKind::DisplayHelp {
                print!("{}", HELP_TEXT);
                std::process::exit(0);
            }
            // Custom version output with architecture (green)
            if err.kind() == clap::error::ErrorKind::DisplayVersion {
                println!("\x1b[32mamt-power {} ({})\x1b[0m", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);
                std::process::exit(0);
            }

            eprintln!("{}", err);
            eprintln!();
            print!("{}", HELP_TEXT);
            eprintln!("\nFor more information, try '--help'.");
            std::process::exit(1);
        }
    };

    if !args.has_command() {
        eprintln!("ERROR: No command specified. You must specify a command.");
        eprintln!();
        Args::command().print_help()?;
        eprintln!();
        eprintln!("Common commands:");
        eprintln!("  ./amt-power --setup       Configure the AMT endpoint");
        eprintln!("  ./amt-power --toggle      Toggle the power state");
        eprintln!("  ./amt-power -i            Show system information");
        std::process::exit(1);
    }

    // Priority: 1. --log-level flag, 2. LOG_LEVEL env, 3. config file, 4. default (info)
    let explicit_level = args
        .log_level
        .clone()
        .or_else(|| std::env::var("LOG_LEVEL").ok());
    let filter = match explicit_level.as_deref() {
        Some(level) => filter_for_level(level).unwrap_or_else(|| {
            eprintln!(
                "Invalid log level '{}'. Using INFO. Valid levels: TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL",
                level
            );
            "info"
        }),
        None => "info",
    };
    init_tracing(filter);

    if args.setup {
        return run_setup_wizard(args.config_file.as_deref()).await;
    }

    let config = load_config(args.config_file.as_deref()).await?;

    if explicit_level.is_none() {
        match filter_for_level(&config.logging.log_level) {
            Some(level) => reload_level(level)?,
            None => warn!("Ignoring invalid logging.log_level '{}'", config.logging.log_level),
        }
    }

    if args.config {
        println!("\n{}", serde_json::to_string_pretty(&config.redacted())?);
        return Ok(());
    }

    validate(&config)?;

    let session = Session::from_config(&config);
    let url = session.url();
    debug!("Using wsman binary '{}' for {}", config.wsman.binary, url);
    let amt = Amt::new(Box::new(WsmanCli::new(session, &config.wsman.binary)), url);

    if args.info {
        print_inventory(&amt).await?;
    }

    if args.toggle {
        let options = toggle_options(&config, &args)?;

        let cancel = CancellationToken::new();
        let on_signal = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutdown signal received (Ctrl+C)");
                on_signal.cancel();
            }
        });

        let outcome = toggle_power(&amt, &options, &cancel)
            .await
            .with_context(|| format!("Power toggle on {} failed", amt.url()))?;
        if let ToggleOutcome::Reached { wait, .. } = outcome {
            debug!("Desired power state reached after {} poll(s)", wait.polls);
        }
    }

    Ok(())
}

/// Toggle settings from the config file, with `--timeout` and `--dry-run` on top.
fn toggle_options(config: &AmtConfig, args: &Args) -> Result<ToggleOptions> {
    let poll_interval = Duration::try_from_secs_f64(config.power.poll_interval_secs)
        .map_err(|e| anyhow!("Invalid poll interval {}: {}", config.power.poll_interval_secs, e))?;
    let deadline = match args.timeout.or(config.power.wait_timeout_secs) {
        Some(secs) => Some(
            Duration::try_from_secs_f64(secs).map_err(|e| anyhow!("Invalid wait timeout {}: {}", secs, e))?,
        ),
        None => None,
    };

    Ok(ToggleOptions {
        prefer_graceful: config.power.prefer_graceful,
        dry_run: args.dry_run,
        wait: WaitOptions { poll_interval, deadline },
    })
}

async fn print_inventory(amt: &Amt) -> Result<()> {
    let inventory = amt
        .inventory()
        .await
        .with_context(|| format!("Failed to read system information from {}", amt.url()))?;

    println!("amtUrl: {}", inventory.amt_url);
    println!("systemId: {}", inventory.system_id);
    println!("time: {}", inventory.time.to_rfc3339());
    println!("version: {}", inventory.version);
    println!("provisioningInfo: {}", inventory.provisioning_info);
    println!("bios: {}", inventory.bios);
    println!("chassis: {}", inventory.chassis);
    println!("motherboard: {}", inventory.motherboard);
    println!("processor: {}", inventory.processor);
    println!("powerState: {}", inventory.power_state);
    println!("availablePowerStates: {}", describe_all(&inventory.available_power_states));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timeout_flag_overrides_config() {
        let mut config = AmtConfig::default();
        config.power.wait_timeout_secs = Some(300.0);
        config.power.poll_interval_secs = 0.5;

        let args = Args::try_parse_from(["amt-power", "-t", "--timeout", "30"]).unwrap();
        let options = toggle_options(&config, &args).unwrap();
        assert_eq!(options.wait.deadline, Some(Duration::from_secs(30)));
        assert_eq!(options.wait.poll_interval, Duration::from_millis(500));
        assert!(options.prefer_graceful);
        assert!(!options.dry_run);

        let args = Args::try_parse_from(["amt-power", "-t", "-n"]).unwrap();
        let options = toggle_options(&config, &args).unwrap();
        assert_eq!(options.wait.deadline, Some(Duration::from_secs(300)));
        assert!(options.dry_run);
    }

    #[test]
    fn no_timeout_means_no_deadline() {
        let config = AmtConfig::default();
        let args = Args::try_parse_from(["amt-power", "-t"]).unwrap();
        assert_eq!(toggle_options(&config, &args).unwrap().wait.deadline, None);
    }

    #[test]
    fn negative_timeout_is_rejected() {
        let config = AmtConfig::default();
        let args = Args::try_parse_from(["amt-power", "-t", "--timeout=-5"]).unwrap();
        assert!(toggle_options(&config, &args).is_err());
    }
}
