use mixbridge::channel::DEFAULT_INVOKE_TIMEOUT;
use mixbridge::transport::{ProcessKind, CHANNEL_FD_ENV, NODE_CHANNEL_FD_ENV};
use mixbridge::HostConfig;
use serde::Serialize;

use crate::cmd::EnvinfoArgs;
use crate::exit::{CliResult, SUCCESS};
use crate::output::OutputFormat;

/// Where a process would find its host channel.
#[derive(Serialize)]
struct ChannelEnv {
    process_kind: String,
    mixbridge_channel_fd: Option<String>,
    node_channel_fd: Option<String>,
}

/// Protocol timings this build uses by default.
#[derive(Serialize)]
struct Timings {
    invoke_timeout_ms: u128,
    indicator_window_ms: u128,
    stats_interval_ms: u128,
}

#[derive(Serialize)]
struct EnvInfoOutput {
    version: &'static str,
    target: String,
    host_name: String,
    channel: ChannelEnv,
    timings: Timings,
}

pub fn run(_args: EnvinfoArgs, format: OutputFormat) -> CliResult<i32> {
    let config = HostConfig::default();
    let output = EnvInfoOutput {
        version: env!("CARGO_PKG_VERSION"),
        target: target_triple(),
        host_name: config.host_name.clone(),
        channel: ChannelEnv {
            process_kind: describe(ProcessKind::detect()),
            mixbridge_channel_fd: std::env::var(CHANNEL_FD_ENV).ok(),
            node_channel_fd: std::env::var(NODE_CHANNEL_FD_ENV).ok(),
        },
        timings: Timings {
            invoke_timeout_ms: DEFAULT_INVOKE_TIMEOUT.as_millis(),
            indicator_window_ms: config.indicator_window.as_millis(),
            stats_interval_ms: config.stats_interval.as_millis(),
        },
    };

    print_envinfo(&output, format);
    Ok(SUCCESS)
}

fn target_triple() -> String {
    option_env!("MIXBRIDGE_BUILD_TARGET")
        .map(str::to_string)
        .unwrap_or_else(|| format!("{}-{}", std::env::consts::ARCH, std::env::consts::OS))
}

fn describe(kind: mixbridge::transport::Result<ProcessKind>) -> String {
    match kind {
        Ok(ProcessKind::Worker { fd }) => format!("worker (fd {fd})"),
        Ok(ProcessKind::Embedded) => "embedded".to_string(),
        Err(err) => format!("invalid: {err}"),
    }
}

fn print_envinfo(output: &EnvInfoOutput, format: OutputFormat) {
    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string(output).unwrap_or_else(|_| "{}".to_string())
        ),
        OutputFormat::Table | OutputFormat::Pretty => {
            let unset = |value: &Option<String>| value.clone().unwrap_or_else(|| "(not set)".into());
            println!("mixbridge {} ({})", output.version, output.target);
            println!("  host name:        {}", output.host_name);
            println!("  process:          {}", output.channel.process_kind);
            println!("  {CHANNEL_FD_ENV}: {}", unset(&output.channel.mixbridge_channel_fd));
            println!("  {NODE_CHANNEL_FD_ENV}:      {}", unset(&output.channel.node_channel_fd));
            println!("  invoke timeout:   {} ms", output.timings.invoke_timeout_ms);
            println!("  indicator window: {} ms", output.timings.indicator_window_ms);
            println!("  stats interval:   {} ms", output.timings.stats_interval_ms);
        }
        OutputFormat::Raw => println!("{}", output.version),
    }
}
