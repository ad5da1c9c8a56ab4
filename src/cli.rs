use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

use crate::config::RunMode;

#[derive(Parser, Debug)]
#[command(name = "roomcast", version, about = "Room-based WebSocket fan-out server")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the server
    Start {
        #[arg(value_enum, default_value_t = Mode::Dev)]
        mode: Mode,

        /// Overrides `server.port`
        #[arg(short, long)]
        port: Option<u16>,

        #[arg(long, default_value = "config")]
        config_dir: PathBuf,
    },
    /// Write a default config file if none exists
    InitConfig {
        #[arg(long, default_value = "config/default.yaml")]
        path: PathBuf,
    },
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    #[value(alias = "development")]
    Dev,
    #[value(alias = "production")]
    Prod,
}

impl From<Mode> for RunMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Dev => RunMode::Dev,
            Mode::Prod => RunMode::Prod,
        }
    }
}
