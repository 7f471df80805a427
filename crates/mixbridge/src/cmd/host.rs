//! Development host: runs a plugin over a real channel and shows its traffic.

use std::path::Path;
use std::time::Duration;

use mixbridge::frame::{Channel, FrameError, InboundFrame, OutboundFrame, Topic};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::cmd::HostArgs;
use crate::exit::{io_error, CliError, CliResult, DATA_INVALID, USAGE};
use crate::output::OutputFormat;

/// Canned answers for the plugin's invokes.
#[derive(Debug, Clone)]
struct Replies {
    manifest: Value,
    settings: Value,
}

impl Replies {
    fn load(args: &HostArgs) -> CliResult<Self> {
        let manifest = match &args.manifest {
            Some(path) => read_json(path)?,
            None => default_manifest(&args.program),
        };
        let settings = match &args.settings {
            Some(path) => read_json(path)?,
            None => json!({}),
        };
        Ok(Self { manifest, settings })
    }

    /// The reply for an invoke, or `None` for events and unknown channels.
    fn answer(&self, frame: &OutboundFrame) -> Option<InboundFrame> {
        let token = frame.reply_to.as_ref()?;
        let value = if frame.channel == Channel::GetManifest.wire_name() {
            self.manifest.clone()
        } else if frame.channel == Channel::GetSettings.wire_name() {
            self.settings.clone()
        } else {
            debug!(channel = %frame.channel, "no canned reply for invoke");
            return None;
        };
        Some(InboundFrame::reply(token, value))
    }
}

fn default_manifest(program: &Path) -> Value {
    let name = program
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| "plugin".to_string());
    json!({ "name": name, "key": name })
}

fn read_json(path: &Path) -> CliResult<Value> {
    let text = std::fs::read_to_string(path)
        .map_err(|err| io_error(&format!("failed reading {}", path.display()), err))?;
    serde_json::from_str(&text).map_err(|err| {
        CliError::new(
            DATA_INVALID,
            format!("{} is not valid JSON: {err}", path.display()),
        )
    })
}

/// Parse an inbound frame typed on stdin, e.g. `["plugin-onVolume-ch1", [0.5]]`.
fn parse_stdin_frame(line: &str) -> Result<InboundFrame, FrameError> {
    let value: Value = serde_json::from_str(line)?;
    InboundFrame::from_value(value)
}

fn parse_duration(input: &str) -> CliResult<Duration> {
    let input = input.trim();
    if input.is_empty() {
        return Err(CliError::new(USAGE, "duration must not be empty"));
    }

    let (number, millis) = if let Some(num) = input.strip_suffix("ms") {
        (num, true)
    } else if let Some(num) = input.strip_suffix('s') {
        (num, false)
    } else {
        (input, false)
    };

    let value: u64 = number
        .parse()
        .map_err(|_| CliError::new(USAGE, format!("invalid duration value: {input}")))?;
    if value == 0 {
        return Err(CliError::new(USAGE, "duration must be greater than zero"));
    }

    Ok(if millis {
        Duration::from_millis(value)
    } else {
        Duration::from_secs(value)
    })
}

fn is_close(topic_or_channel: &str) -> bool {
    topic_or_channel == Topic::Close.wire_name()
}

#[cfg(unix)]
pub fn run(args: HostArgs, format: OutputFormat) -> CliResult<i32> {
    let close_timeout = parse_duration(&args.close_timeout)?;
    let replies = Replies::load(&args)?;
    let runtime = super::runtime()?;
    let code = runtime.block_on(serve(args, replies, close_timeout, format));
    // A pending stdin read holds a blocking thread that would stall a normal
    // runtime drop until the next line arrives.
    runtime.shutdown_background();
    code
}

#[cfg(not(unix))]
pub fn run(_args: HostArgs, _format: OutputFormat) -> CliResult<i32> {
    Err(CliError::new(
        USAGE,
        "the development host is only available on unix",
    ))
}

#[cfg(unix)]
async fn serve(
    args: HostArgs,
    replies: Replies,
    close_timeout: Duration,
    format: OutputFormat,
) -> CliResult<i32> {
    use futures_util::{SinkExt, StreamExt};
    use mixbridge::frame::IpcCodec;
    use mixbridge::transport::spawn_with_channel;
    use tokio::io::{AsyncBufReadExt, BufReader};
    use tokio::time::Instant;
    use tokio_util::codec::{FramedRead, FramedWrite};

    use crate::exit::{frame_error, transport_error, FAILURE, SUCCESS, TIMEOUT};
    use crate::output::print_frame;

    let mut command = tokio::process::Command::new(&args.program);
    command.args(&args.args).stdin(std::process::Stdio::null());
    let (mut child, stream) = spawn_with_channel(command).map_err(|err| {
        transport_error(&format!("failed to launch {}", args.program.display()), err)
    })?;

    let (read, write) = tokio::io::split(stream);
    let mut frames = FramedRead::new(read, IpcCodec::new());
    let mut sink = FramedWrite::new(write, IpcCodec::new());
    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut close_deadline: Option<Instant> = None;

    let code = loop {
        tokio::select! {
            frame = frames.next() => {
                let value = match frame {
                    Some(Ok(value)) => value,
                    Some(Err(err)) => break Err(frame_error("failed reading from plugin", err)),
                    None => {
                        info!("plugin closed its channel");
                        break Ok(if close_deadline.is_some() { SUCCESS } else { FAILURE });
                    }
                };
                let frame = match OutboundFrame::from_value(value) {
                    Ok(frame) => frame,
                    Err(err) => break Err(frame_error("plugin sent a malformed frame", err)),
                };
                print_frame(&frame, format);

                if is_close(&frame.channel) {
                    if close_deadline.is_some() {
                        info!("plugin acknowledged close");
                        break Ok(SUCCESS);
                    }
                    warn!("plugin sent an unsolicited close acknowledgement");
                }
                if let Some(reply) = replies.answer(&frame) {
                    if let Err(err) = sink.send(reply).await {
                        break Err(frame_error("failed replying to plugin", err));
                    }
                }
            }
            line = stdin.next_line(), if stdin_open => {
                let line = match line {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        debug!("stdin closed");
                        stdin_open = false;
                        continue;
                    }
                    Err(err) => break Err(io_error("failed reading stdin", err)),
                };
                if line.trim().is_empty() {
                    continue;
                }
                let inbound = match parse_stdin_frame(&line) {
                    Ok(inbound) => inbound,
                    Err(err) => {
                        warn!(error = %err, "ignoring invalid frame on stdin");
                        continue;
                    }
                };
                let closing = is_close(&inbound.topic);
                debug!(topic = %inbound.topic, "forwarding frame to plugin");
                if let Err(err) = sink.send(inbound).await {
                    break Err(frame_error("failed writing to plugin", err));
                }
                if closing && close_deadline.is_none() {
                    close_deadline = Some(Instant::now() + close_timeout);
                }
            }
            _ = &mut ctrl_c, if close_deadline.is_none() => {
                info!("interrupted, asking plugin to close");
                if let Err(err) = sink.send(InboundFrame::new(Topic::Close.wire_name(), vec![])).await {
                    break Err(frame_error("failed writing to plugin", err));
                }
                close_deadline = Some(Instant::now() + close_timeout);
            }
            _ = expire(close_deadline) => {
                warn!(?close_timeout, "plugin did not acknowledge close");
                break Ok(TIMEOUT);
            }
            status = child.wait() => {
                let status = match status {
                    Ok(status) => status,
                    Err(err) => break Err(io_error("failed waiting for plugin", err)),
                };
                info!(%status, "plugin exited");
                break Ok(if status.success() { SUCCESS } else { FAILURE });
            }
        }
    };

    if let Err(err) = child.kill().await {
        debug!(error = %err, "plugin already gone");
    }
    code
}

#[cfg(unix)]
async fn expire(deadline: Option<tokio::time::Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
