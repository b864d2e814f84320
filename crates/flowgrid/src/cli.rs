use std::path::PathBuf;

use clap::{ArgAction, Parser};

#[derive(Debug, Parser)]
#[command(
    name = "flowgrid",
    version,
    about = "SDN policy controller for segmented two-LAN topologies"
)]
pub struct Cli {
    /// Path to the configuration file (defaults to the platform config dir).
    #[arg(short, long, value_name = "FILE", env = "FLOWGRID_CONFIG")]
    pub config: Option<PathBuf>,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,

    /// Print the effective configuration as TOML and exit.
    #[arg(long)]
    pub print_config: bool,
}
