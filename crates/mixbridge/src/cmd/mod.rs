use std::path::PathBuf;

use clap::{Args, Subcommand};

use crate::exit::{io_error, CliResult};
use crate::output::OutputFormat;

pub mod demo;
pub mod envinfo;
pub mod host;
pub mod version;

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Launch a plugin under a development host and print its frames.
    Host(HostArgs),
    /// Run the sample plugin (launch it with `host`).
    Demo(DemoArgs),
    /// Show version information.
    Version(VersionArgs),
    /// Print build and environment diagnostics.
    Envinfo(EnvinfoArgs),
}

pub fn run(command: Command, format: OutputFormat) -> CliResult<i32> {
    match command {
        Command::Host(args) => host::run(args, format),
        Command::Demo(args) => demo::run(args),
        Command::Version(args) => version::run(args),
        Command::Envinfo(args) => envinfo::run(args, format),
    }
}

fn runtime() -> CliResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| io_error("failed to start async runtime", err))
}

#[derive(Args, Debug)]
pub struct HostArgs {
    /// JSON file answered to `getManifest` (default: name and key from the program name).
    #[arg(long, value_name = "FILE")]
    pub manifest: Option<PathBuf>,
    /// JSON file answered to `getSettings` (default: `{}`).
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,
    /// How long to wait for the close acknowledgement (e.g. 5s, 500ms).
    #[arg(long, default_value = "5s")]
    pub close_timeout: String,
    /// Plugin program to launch.
    pub program: PathBuf,
    /// Arguments passed to the plugin.
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

#[derive(Args, Debug, Default)]
pub struct DemoArgs {}

#[derive(Args, Debug)]
pub struct VersionArgs {
    /// Show extended build provenance.
    #[arg(long)]
    pub extended: bool,
}

#[derive(Args, Debug, Default)]
pub struct EnvinfoArgs {}
