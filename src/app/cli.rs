//! Command-line argument definitions (clap) and help text.

use clap::Parser;

pub const HELP_TEXT: &str = "
Intel AMT Power Control
Usage: amt-power [OPTIONS]

Options:
  -h, --help                    Print help
  -V, --version                 Print version
Power:
  -t, --toggle                  Toggle the power state (On -> Off, anything else -> On) and wait for it
  -n, --dry-run                 Decide the transition but do not request it
      --timeout <SECS>          Give up waiting after SECS seconds (default: wait until Ctrl+C)
Inventory:
  -i, --info                    Show firmware, hardware and power information
Config & Debug:
  -e, --setup                   Run interactive setup wizard
  -c, --config                  Show current configuration (password masked)
      --config-file <PATH>      Config file (default: config.json next to the executable)
      --log-level <LOG_LEVEL>   Set log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)

Environment:
  AMT_HOSTNAME, AMT_TLS, AMT_PORT, AMT_USERNAME, AMT_PASSWORD override the config file.
";

#[derive(Parser, Debug)]
#[command(name = "amt-power")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Intel AMT Power Control", long_about = None)]
pub struct Args {
    // === Power ===
    /// Toggle the power state and wait for the new state
    #[arg(short = 't', long, help_heading = "Power")]
    pub toggle: bool,

    /// Decide the transition but do not request it
    #[arg(short = 'n', long = "dry-run", help_heading = "Power")]
    pub dry_run: bool,

    /// Give up waiting after this many seconds
    #[arg(long, value_name = "SECS", help_heading = "Power")]
    pub timeout: Option<f64>,

    // === Inventory ===
    /// Show firmware, hardware and power information
    #[arg(short = 'i', long, help_heading = "Inventory")]
    pub info: bool,

    // === Config & Debug ===
    /// Run interactive setup wizard
    #[arg(short = 'e', long, help_heading = "Config & Debug")]
    pub setup: bool,

    /// Show current configuration
    #[arg(short = 'c', long, help_heading = "Config & Debug")]
    pub config: bool,

    /// Config file location
    #[arg(long = "config-file", value_name = "PATH", help_heading = "Config & Debug")]
    pub config_file: Option<String>,

    /// Set log level (TRACE, DEBUG, INFO, WARN, ERROR, CRITICAL)
    #[arg(long = "log-level", help_heading = "Config & Debug")]
    pub log_level: Option<String>,
}

impl Args {
    pub fn has_command(&self) -> bool {
        self.toggle || self.info || self.setup || self.config
    }
}
