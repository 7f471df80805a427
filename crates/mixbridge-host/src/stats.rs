//! Process statistics reported to the host on a fixed heartbeat.

use std::sync::OnceLock;
use std::time::Duration;

use mixbridge_channel::{ChannelError, FrameSink};
use mixbridge_frame::Channel;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace, warn};

static PROCESS_START: OnceLock<std::time::Instant> = OnceLock::new();

/// Record the process start instant if it has not been recorded yet.
pub fn mark_process_start() {
    PROCESS_START.get_or_init(std::time::Instant::now);
}

/// Time since the process started.
///
/// On Linux this is derived from the kernel's process start time. Elsewhere,
/// or if `/proc` is unreadable, it is measured from the first
/// [`mark_process_start`] call.
pub fn uptime() -> Duration {
    #[cfg(target_os = "linux")]
    if let Some(uptime) = kernel_uptime() {
        return uptime;
    }
    PROCESS_START
        .get_or_init(std::time::Instant::now)
        .elapsed()
}

#[cfg(target_os = "linux")]
fn kernel_uptime() -> Option<Duration> {
    let stat = std::fs::read_to_string("/proc/self/stat").ok()?;
    let start_ticks = start_ticks(&stat)?;
    let boot = std::fs::read_to_string("/proc/uptime").ok()?;
    let since_boot: f64 = boot.split_whitespace().next()?.parse().ok()?;
    // SAFETY: sysconf has no preconditions.
    let ticks_per_sec = unsafe { libc::sysconf(libc::_SC_CLK_TCK) };
    let ticks_per_sec = u64::try_from(ticks_per_sec).ok().filter(|&t| t > 0)?;
    let started = start_ticks as f64 / ticks_per_sec as f64;
    Some(Duration::from_secs_f64((since_boot - started).max(0.0)))
}

/// Field 22 of `/proc/<pid>/stat`: start time in clock ticks after boot.
/// The command name may contain spaces, so fields are counted from its
/// closing parenthesis.
#[cfg(target_os = "linux")]
fn start_ticks(stat: &str) -> Option<u64> {
    let (_, fields) = stat.rsplit_once(')')?;
    fields.split_whitespace().nth(19)?.parse().ok()
}

/// CPU utilization of this process between consecutive samples.
#[derive(Debug, Clone)]
pub struct CpuSampler {
    wall: Instant,
    cpu: Duration,
}

impl CpuSampler {
    /// Start a sampling window now.
    pub fn new() -> Self {
        Self {
            wall: Instant::now(),
            cpu: cpu_time(),
        }
    }

    /// Percent of one core used since the previous sample, then start a new
    /// window.
    pub fn sample(&mut self) -> f64 {
        let wall = Instant::now();
        let cpu = cpu_time();
        let percent = utilization(
            cpu.saturating_sub(self.cpu),
            wall.saturating_duration_since(self.wall),
        );
        self.wall = wall;
        self.cpu = cpu;
        percent
    }
}

impl Default for CpuSampler {
    fn default() -> Self {
        Self::new()
    }
}

/// `100 * cpu / wall`, or 0 for an empty window.
pub fn utilization(cpu: Duration, wall: Duration) -> f64 {
    if wall.is_zero() {
        return 0.0;
    }
    100.0 * cpu.as_secs_f64() / wall.as_secs_f64()
}

/// Cumulative user + system CPU time of this process.
#[cfg(unix)]
pub fn cpu_time() -> Duration {
    let Some(usage) = rusage() else {
        return Duration::ZERO;
    };
    timeval(usage.ru_utime) + timeval(usage.ru_stime)
}

#[cfg(not(unix))]
pub fn cpu_time() -> Duration {
    Duration::ZERO
}

/// Resident set size in kilobytes.
pub fn resident_kb() -> u64 {
    #[cfg(target_os = "linux")]
    if let Some(kb) = statm_resident_kb() {
        return kb;
    }
    max_rss_kb()
}

#[cfg(target_os = "linux")]
fn statm_resident_kb() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    // SAFETY: sysconf has no preconditions.
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = u64::try_from(page_size).ok()?;
    Some(pages * page_size / 1024)
}

#[cfg(unix)]
fn max_rss_kb() -> u64 {
    let Some(usage) = rusage() else {
        return 0;
    };
    let max_rss = u64::try_from(usage.ru_maxrss).unwrap_or(0);
    // Reported in bytes on Apple platforms, kilobytes elsewhere.
    if cfg!(target_vendor = "apple") {
        max_rss / 1024
    } else {
        max_rss
    }
}

#[cfg(not(unix))]
fn max_rss_kb() -> u64 {
    0
}

#[cfg(unix)]
fn rusage() -> Option<libc::rusage> {
    let mut usage = std::mem::MaybeUninit::<libc::rusage>::uninit();
    // SAFETY: getrusage fills the struct on success and we only read it then.
    let rc = unsafe { libc::getrusage(libc::RUSAGE_SELF, usage.as_mut_ptr()) };
    if rc != 0 {
        return None;
    }
    // SAFETY: initialized by the successful call above.
    Some(unsafe { usage.assume_init() })
}

#[cfg(unix)]
fn timeval(tv: libc::timeval) -> Duration {
    let secs = u64::try_from(tv.tv_sec).unwrap_or(0);
    let micros = u32::try_from(tv.tv_usec).unwrap_or(0);
    Duration::from_secs(secs) + Duration::from_micros(u64::from(micros))
}

/// Payload of the `plugin-stats` heartbeat.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessStats {
    /// Resident memory in kilobytes.
    pub ram: u64,
    /// CPU utilization since the previous heartbeat, in percent.
    pub cpu: f64,
    /// Uptime in milliseconds.
    #[serde(rename = "runTime")]
    pub run_time: f64,
}

impl ProcessStats {
    pub fn collect(sampler: &mut CpuSampler) -> Self {
        Self {
            ram: resident_kb(),
            cpu: sampler.sample(),
            run_time: uptime().as_secs_f64() * 1000.0,
        }
    }
}

/// Send [`ProcessStats`] on `plugin-stats` every `interval`, starting one
/// interval from now.
///
/// The task ends only when the channel is closed or the handle is aborted.
pub fn spawn_heartbeat<S: FrameSink>(sink: S, interval: Duration) -> JoinHandle<()> {
    mark_process_start();
    tokio::spawn(async move {
        let mut sampler = CpuSampler::new();
        let mut ticker = tokio::time::interval_at(Instant::now() + interval, interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            let stats = ProcessStats::collect(&mut sampler);
            let payload = match serde_json::to_value(&stats) {
                Ok(payload) => payload,
                Err(err) => {
                    warn!(error = %err, "failed to encode process stats");
                    continue;
                }
            };
            trace!(ram = stats.ram, cpu = stats.cpu, "sending process stats");
            match sink.send(Channel::Stats, vec![payload]) {
                Ok(()) => {}
                Err(ChannelError::Closed) => {
                    debug!("channel closed, stopping stats heartbeat");
                    return;
                }
                Err(err) => warn!(error = %err, "failed to send process stats"),
            }
        }
    })
}
