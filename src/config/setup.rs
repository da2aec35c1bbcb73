//! Interactive setup wizard for first-run configuration.

use std::io::{self, BufRead, Write};

use anyhow::Result;

use crate::amt::Amt;
use crate::config::persistence::{load_config, resolve_config_path, save_config};
use crate::config::types::*;
use crate::wsman::executor::PASSWORD_VISIBILITY_NOTICE;
use crate::wsman::{Session, WsmanCli};

/// Print `label [default]: ` and read one line; empty input keeps the default.
fn prompt(input: &mut impl BufRead, label: &str, default: &str) -> Result<String> {
    if default.is_empty() {
        print!("{}: ", label);
    } else {
        print!("{} [{}]: ", label, default);
    }
    io::stdout().flush()?;

    let mut line = String::new();
    input.read_line(&mut line)?;
    let line = line.trim();
    Ok(if line.is_empty() { default.to_string() } else { line.to_string() })
}

fn prompt_yes_no(input: &mut impl BufRead, label: &str, default: bool) -> Result<bool> {
    let answer = prompt(input, &format!("{} ({})", label, if default { "Y/n" } else { "y/N" }), "")?;
    Ok(match answer.to_ascii_lowercase().as_str() {
        "y" | "yes" => true,
        "n" | "no" => false,
        _ => default,
    })
}

pub async fn run_setup_wizard(config_path: Option<&str>) -> Result<()> {
    let config_file = resolve_config_path(config_path)?;
    let stdin = io::stdin();
    let mut input = stdin.lock();

    println!("\n╔══════════════════════════════════════════╗");
    println!("║     Intel AMT Power Control Setup        ║");
    println!("╚══════════════════════════════════════════╝");
    println!("Build: \x1b[32mamt-power v{} ({})\x1b[0m\n", env!("CARGO_PKG_VERSION"), std::env::consts::ARCH);

    // Existing values become the defaults
    let existing = if config_file.exists() {
        println!("⚠️  Config file already exists: {:?}", config_file);
        if !prompt_yes_no(&mut input, "Overwrite?", false)? {
            println!("Config unchanged.");
            return Ok(());
        }
        load_config(config_file.to_str()).await.ok()
    } else {
        None
    };
    let base = existing.unwrap_or_default();

    println!("\n📋 Configuration:\n");
    println!("Values in [brackets] are defaults - press Enter to use them.\n");

    let default_host = if base.endpoint.hostname == HOSTNAME_PLACEHOLDER {
        String::new()
    } else {
        base.endpoint.hostname.clone()
    };
    let hostname = prompt(&mut input, "AMT hostname or IP address", &default_host)?;

    let tls = prompt_yes_no(&mut input, "Use TLS (port 16993)?", base.endpoint.tls)?;
    let verify_tls = if tls {
        prompt_yes_no(&mut input, "Verify the AMT TLS certificate?", base.endpoint.verify_tls)?
    } else {
        base.endpoint.verify_tls
    };

    let username = prompt(&mut input, "Username", &base.credentials.username)?;
    let password = prompt(&mut input, "Password", "")?;
    let password = if password.is_empty() { base.credentials.password.clone() } else { password };
    println!("   ⚠ {}", PASSWORD_VISIBILITY_NOTICE);
    println!("   Use a dedicated AMT account on shared hosts.");

    println!("\nGraceful power off needs Intel LMS running in the remote OS.");
    let prefer_graceful = prompt_yes_no(&mut input, "Prefer graceful power off when offered?", base.power.prefer_graceful)?;

    let default_timeout = base.power.wait_timeout_secs.map(|t| t.to_string()).unwrap_or_default();
    let timeout_str = prompt(&mut input, "Wait timeout in seconds (empty = wait until Ctrl+C)", &default_timeout)?;
    let wait_timeout_secs = if timeout_str.is_empty() {
        None
    } else {
        match timeout_str.parse::<f64>() {
            Ok(t) if t >= 0.0 => Some(t),
            _ => {
                println!("   ⚠ Invalid timeout '{}', waiting without a deadline", timeout_str);
                None
            }
        }
    };

    let config = AmtConfig {
        endpoint: EndpointSettings {
            hostname,
            tls,
            port: base.endpoint.port,
            verify_tls,
        },
        credentials: CredentialSettings { username, password },
        power: PowerSettings {
            prefer_graceful,
            poll_interval_secs: base.power.poll_interval_secs,
            wait_timeout_secs,
        },
        wsman: base.wsman,
        logging: base.logging,
    };

    save_config(&config, &config_file).await?;
    println!("\n✅ Configuration saved to: {:?}", config_file);

    if prompt_yes_no(&mut input, "\n🔍 Test AMT connectivity now?", true)? {
        println!("\nQuerying power state...\n");
        let session = Session::from_config(&config);
        let url = session.url();
        let amt = Amt::new(Box::new(WsmanCli::new(session, &config.wsman.binary)), url);

        match amt.power_state().await {
            Ok(state) => println!("✅ {} reports power state {}", amt.url(), state),
            Err(e) => println!("   ⚠ Could not reach {}: {}", amt.url(), e),
        }
    }

    println!("\n✨ Setup complete!");
    println!("\n   Toggle power with: ./amt-power --toggle");
    Ok(())
}
