//! CLI argument definitions for courier-daemon.
//!
//! Uses `clap` v4 derive macros to parse command-line arguments.

use std::path::PathBuf;

use clap::Parser;

use courier_core::config::CourierConfig;

/// Courier policy result delivery daemon.
///
/// Builds the configured delivery targets, keeps them in sync with
/// secret changes, and fans results out to them while holding the lease.
#[derive(Parser, Debug)]
#[command(name = "courier-daemon")]
#[command(version, about, long_about = None)]
pub struct DaemonCli {
    /// Path to courier.toml configuration file.
    #[arg(short, long, default_value = "/etc/courier/courier.toml")]
    pub config: PathBuf,

    /// Override log level (trace, debug, info, warn, error).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_level: Option<String>,

    /// Override log format (json, pretty).
    ///
    /// Takes precedence over the config file and environment variables.
    #[arg(long)]
    pub log_format: Option<String>,

    /// Load both config files, build the target tree, print the number of
    /// valid targets and exit.
    #[arg(long)]
    pub validate: bool,

    /// Override PID file path (takes precedence over config file).
    #[arg(long)]
    pub pid_file: Option<String>,
}

impl DaemonCli {
    /// Apply CLI overrides on top of file and environment values.
    pub fn apply_overrides(&self, config: &mut CourierConfig) {
        if let Some(level) = &self.log_level {
            config.general.log_level = level.clone();
        }
        if let Some(format) = &self.log_format {
            config.general.log_format = format.clone();
        }
        if let Some(pid_file) = &self.pid_file {
            config.general.pid_file = pid_file.clone();
        }
    }
}
