#[cfg(feature = "cli")]
pub mod cli;
#[cfg(feature = "lambda")]
pub mod lambda;
pub mod toml_config;

#[cfg(feature = "cli")]
use clap::Parser;

#[cfg(feature = "cli")]
#[derive(Debug, Clone, Parser)]
#[command(name = "sd-worker")]
#[command(about = "Job-queue worker for a local Stable Diffusion WebUI")]
pub struct CliConfig {
    /// Path to a worker TOML configuration file
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Override the WebUI root URL (default http://127.0.0.1:3000)
    #[arg(long, global = true)]
    pub api_root: Option<String>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Emit JSON formatted logs")]
    pub json_logs: bool,

    #[arg(long, global = true, help = "Log CPU and memory usage per job")]
    pub monitor: bool,

    #[command(subcommand)]
    pub command: cli::Command,
}
