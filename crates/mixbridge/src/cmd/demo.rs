//! Sample plugin: one assignment whose indicators follow the hardware.

use std::sync::Arc;
use std::time::Duration;

use mixbridge::{Assignment, AssignmentData, AssignmentEvent};
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::Notify;
use tracing::{debug, info, warn};

use crate::cmd::DemoArgs;
use crate::exit::{entity_error, host_error, CliError, CliResult, SUCCESS, USAGE};

const ASSIGNMENT_ID: &str = "demo";

/// The host normally kills the plugin right after the close acknowledgement.
const CLOSE_GRACE: Duration = Duration::from_secs(1);

pub fn run(_args: DemoArgs) -> CliResult<i32> {
    super::runtime()?.block_on(serve())
}

async fn serve() -> CliResult<i32> {
    let host = mixbridge::install()
        .map_err(|err| host_error("failed to attach to host", err))?
        .ok_or_else(|| {
            CliError::new(
                USAGE,
                "demo must be launched by a mixer host, e.g. `mixbridge host mixbridge demo`",
            )
        })?;

    let mut demo = Assignment::new(&host, ASSIGNMENT_ID, AssignmentData::named("Demo"))
        .map_err(|err| entity_error("failed to register assignment", err))?;
    let mut events = demo.subscribe();

    let closing = Arc::new(Notify::new());
    host.on_close({
        let closing = Arc::clone(&closing);
        move || async move {
            closing.notify_one();
            Ok::<(), std::convert::Infallible>(())
        }
    });

    host.ready()
        .map_err(|err| host_error("failed to signal ready", err))?;
    info!(id = ASSIGNMENT_ID, "demo plugin ready");

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(AssignmentEvent::VolumeChanged(level)) => {
                    debug!(level, "mirroring volume");
                    demo.set_volume(level)
                        .map_err(|err| entity_error("failed to set volume", err))?;
                }
                Ok(AssignmentEvent::MutePressed) => {
                    let muted = !demo.muted();
                    info!(muted, "toggling mute");
                    demo.set_muted(muted)
                        .map_err(|err| entity_error("failed to set mute", err))?;
                }
                Ok(event) => debug!(?event, "ignoring event"),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "dropped hardware events"),
                Err(RecvError::Closed) => break,
            },
            _ = closing.notified() => {
                info!("host asked the demo to close");
                tokio::time::sleep(CLOSE_GRACE).await;
                break;
            }
            _ = &mut ctrl_c, if !interrupted => {
                // The host shares our process group; it sends the close request.
                interrupted = true;
                debug!("interrupted, waiting for the host to close");
            }
        }
    }

    host.shutdown();
    Ok(SUCCESS)
}
