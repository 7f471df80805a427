use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use mixbridge_frame::{FrameConfig, InboundFrame, IpcCodec, OutboundFrame, ReplyToken, Topic};
use serde_json::Value;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::codec::{FramedRead, FramedWrite};
use tracing::{debug, error, trace, warn};

use crate::error::{ChannelError, Result};
use crate::events::{EventBus, ListenerId};
use crate::pending::PendingTable;
use crate::sink::FrameSink;

/// How long `invoke` waits for a reply.
pub const DEFAULT_INVOKE_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration for a plugin channel.
#[derive(Debug, Clone)]
pub struct ChannelConfig {
    /// Reply deadline for every `invoke`. Default: 5 s.
    pub invoke_timeout: Duration,
    /// Frame codec limits.
    pub frame: FrameConfig,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            invoke_timeout: DEFAULT_INVOKE_TIMEOUT,
            frame: FrameConfig::default(),
        }
    }
}

/// What the receive path did with an inbound frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// The frame resolved a pending invocation.
    Reply,
    /// The frame was a broadcast event delivered to `listeners` handlers.
    Event { listeners: usize },
    /// Neither a pending reply nor a known topic; dropped.
    Unrouted,
}

/// Multiplexed plugin ↔ host channel.
///
/// Cheap to clone; all clones share the same stream, correlation table and
/// event bus. Outbound frames are queued to a writer task in call order.
/// Inbound frames are dispatched one at a time, in stream order, on the
/// reader task.
#[derive(Clone)]
pub struct IpcChannel {
    inner: Arc<Inner>,
}

/// A non-owning handle to an [`IpcChannel`].
///
/// Handlers registered on a channel hold this instead of a clone so they do
/// not keep the channel alive.
#[derive(Clone)]
pub struct WeakChannel {
    inner: Weak<Inner>,
}

impl WeakChannel {
    pub fn upgrade(&self) -> Option<IpcChannel> {
        self.inner.upgrade().map(|inner| IpcChannel { inner })
    }
}

impl std::fmt::Debug for WeakChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WeakChannel")
            .field("alive", &(self.inner.strong_count() > 0))
            .finish()
    }
}

struct Inner {
    outbound: mpsc::UnboundedSender<OutboundFrame>,
    pending: PendingTable,
    events: EventBus,
    config: ChannelConfig,
}

/// Handles of the reader and writer tasks driving a channel.
#[derive(Debug)]
pub struct ChannelTasks {
    reader: JoinHandle<Result<()>>,
    writer: JoinHandle<Result<()>>,
}

impl ChannelTasks {
    /// Wait until the inbound side stops.
    ///
    /// Returns `Ok(())` when the host closed the stream, or the error that
    /// stopped the reader (for example a protocol violation).
    pub async fn closed(self) -> Result<()> {
        match self.reader.await {
            Ok(result) => result,
            Err(err) => Err(ChannelError::TaskFailed(err.to_string())),
        }
    }

    /// Stop both tasks immediately.
    pub fn abort(&self) {
        self.reader.abort();
        self.writer.abort();
    }

    pub fn is_finished(&self) -> bool {
        self.reader.is_finished()
    }
}

/// A channel whose reader and writer tasks have not been started yet.
///
/// Frames sent and listeners registered before [`ChannelStarter::start`] are
/// kept, so handlers can be in place before the first inbound frame.
#[derive(Debug)]
pub struct ChannelStarter {
    channel: IpcChannel,
    queue: mpsc::UnboundedReceiver<OutboundFrame>,
}

impl ChannelStarter {
    /// Start the channel over a duplex stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn start<S>(self, stream: S) -> ChannelTasks
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (reader, writer) = tokio::io::split(stream);
        self.start_parts(reader, writer)
    }

    /// Start the channel over separate read and write halves.
    pub fn start_parts<R, W>(self, reader: R, writer: W) -> ChannelTasks
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let frame_config = &self.channel.inner.config.frame;
        let frames_in = FramedRead::new(reader, IpcCodec::with_config(frame_config.clone()));
        let frames_out = FramedWrite::new(writer, IpcCodec::with_config(frame_config.clone()));

        let writer = tokio::spawn(write_loop(frames_out, self.queue));
        let reader = tokio::spawn(read_loop(frames_in, self.channel));
        ChannelTasks { reader, writer }
    }
}

impl IpcChannel {
    /// Start a channel over a duplex stream.
    ///
    /// Must be called from within a Tokio runtime.
    pub fn open<S>(stream: S, config: ChannelConfig) -> (Self, ChannelTasks)
    where
        S: AsyncRead + AsyncWrite + Send + 'static,
    {
        let (channel, starter) = Self::unstarted(config);
        (channel, starter.start(stream))
    }

    /// Start a channel over separate read and write halves.
    pub fn from_parts<R, W>(reader: R, writer: W, config: ChannelConfig) -> (Self, ChannelTasks)
    where
        R: AsyncRead + Unpin + Send + 'static,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (channel, starter) = Self::unstarted(config);
        (channel, starter.start_parts(reader, writer))
    }

    /// Create a channel without attaching it to a stream yet.
    pub fn unstarted(config: ChannelConfig) -> (Self, ChannelStarter) {
        let (tx, rx) = mpsc::unbounded_channel();
        let channel = Self {
            inner: Arc::new(Inner {
                outbound: tx,
                pending: PendingTable::default(),
                events: EventBus::new(),
                config,
            }),
        };
        let starter = ChannelStarter {
            channel: channel.clone(),
            queue: rx,
        };
        (channel, starter)
    }

    /// Fire-and-forget: emit `[channel, null, args]`.
    ///
    /// Fails only when the stream is gone.
    pub fn send(&self, channel: impl Into<String>, args: Vec<Value>) -> Result<()> {
        self.enqueue(OutboundFrame::event(channel, args))
    }

    /// Emit `[channel, token, args]` and wait for the host's reply.
    ///
    /// The frame is queued before this returns, so frames leave in call order
    /// even if the future is awaited later. Resolves with the first reply
    /// argument, or fails with [`ChannelError::Timeout`] once the invoke
    /// timeout elapses. Dropping the future abandons the invocation.
    pub fn invoke(
        &self,
        channel: impl Into<String>,
        args: Vec<Value>,
    ) -> impl Future<Output = Result<Value>> + Send + 'static {
        let channel = channel.into();
        let token = ReplyToken::new();
        let reply = self.inner.pending.register(token.clone());
        let guard = PendingGuard {
            inner: Arc::clone(&self.inner),
            token: token.clone(),
        };
        let timeout = self.inner.config.invoke_timeout;
        let deadline = tokio::time::Instant::now() + timeout;

        trace!(%channel, reply_token = %token, "invoking");
        let sent = self.enqueue(OutboundFrame::request(channel.clone(), token, args));

        async move {
            let guard = guard;
            sent?;

            match tokio::time::timeout_at(deadline, reply).await {
                Ok(Ok(value)) => Ok(value),
                Ok(Err(_)) => Err(ChannelError::Closed),
                Err(_) => {
                    warn!(
                        %channel,
                        reply_token = %guard.token,
                        ?timeout,
                        "timed out waiting for reply"
                    );
                    Err(ChannelError::Timeout(timeout))
                }
            }
        }
    }

    /// Receive path: validate and route one decoded inbound value.
    ///
    /// A malformed frame is a protocol violation and is returned as
    /// [`ChannelError::Protocol`]; the reader task stops on it.
    pub fn dispatch(&self, value: Value) -> Result<Dispatch> {
        let frame = InboundFrame::from_value(value).map_err(|err| {
            error!(error = %err, "malformed frame from host");
            ChannelError::Protocol(err)
        })?;
        Ok(self.dispatch_frame(frame))
    }

    /// Route an already validated inbound frame.
    ///
    /// A topic naming a pending invocation is a reply; anything else is a
    /// broadcast event for the topic's listeners.
    pub fn dispatch_frame(&self, frame: InboundFrame) -> Dispatch {
        if self
            .inner
            .pending
            .resolve(&frame.topic, frame.first_arg())
        {
            trace!(reply_token = %frame.topic, "reply resolved");
            return Dispatch::Reply;
        }

        match Topic::parse(&frame.topic) {
            Some(topic) => {
                let listeners = self.inner.events.emit(&topic, &frame.args);
                trace!(topic = %frame.topic, listeners, "event dispatched");
                Dispatch::Event { listeners }
            }
            None => {
                debug!(topic = %frame.topic, "dropping unrouted frame");
                Dispatch::Unrouted
            }
        }
    }

    /// Subscribe to a broadcast topic.
    pub fn on<F>(&self, topic: Topic, handler: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.events.on(topic, Arc::new(handler))
    }

    /// Subscribe to the next occurrence of a broadcast topic only.
    pub fn once<F>(&self, topic: Topic, handler: F) -> ListenerId
    where
        F: Fn(&[Value]) + Send + Sync + 'static,
    {
        self.inner.events.once(topic, Arc::new(handler))
    }

    pub fn remove_listener(&self, topic: &Topic, id: ListenerId) -> bool {
        self.inner.events.remove(topic, id)
    }

    pub fn remove_all_listeners(&self, topic: &Topic) -> usize {
        self.inner.events.remove_all(topic)
    }

    pub fn listener_count(&self, topic: &Topic) -> usize {
        self.inner.events.listener_count(topic)
    }

    /// Number of invocations waiting for a reply.
    pub fn pending_count(&self) -> usize {
        self.inner.pending.len()
    }

    pub fn is_pending(&self, token: &str) -> bool {
        self.inner.pending.contains(token)
    }

    /// True once the writer side has stopped.
    pub fn is_closed(&self) -> bool {
        self.inner.outbound.is_closed()
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.inner.config
    }

    pub fn downgrade(&self) -> WeakChannel {
        WeakChannel {
            inner: Arc::downgrade(&self.inner),
        }
    }

    fn enqueue(&self, frame: OutboundFrame) -> Result<()> {
        self.inner
            .outbound
            .send(frame)
            .map_err(|_| ChannelError::Closed)
    }
}

impl FrameSink for IpcChannel {
    fn send_frame(&self, frame: OutboundFrame) -> Result<()> {
        self.enqueue(frame)
    }
}

impl std::fmt::Debug for IpcChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IpcChannel")
            .field("pending", &self.inner.pending.len())
            .field("closed", &self.inner.outbound.is_closed())
            .finish()
    }
}

/// Removes the correlation entry however the invocation ends.
struct PendingGuard {
    inner: Arc<Inner>,
    token: ReplyToken,
}

impl Drop for PendingGuard {
    fn drop(&mut self) {
        self.inner.pending.remove(self.token.as_str());
    }
}

async fn write_loop<W>(
    mut frames: FramedWrite<W, IpcCodec>,
    mut queue: mpsc::UnboundedReceiver<OutboundFrame>,
) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(frame) = queue.recv().await {
        trace!(channel = %frame.channel, "writing frame");
        if let Err(err) = frames.send(frame).await {
            error!(error = %err, "channel writer stopped");
            return Err(err.into());
        }
    }
    debug!("channel writer drained");
    Ok(())
}

async fn read_loop<R>(mut frames: FramedRead<R, IpcCodec>, channel: IpcChannel) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let result: Result<()> = async {
        while let Some(value) = frames.next().await {
            channel.dispatch(value?)?;
        }
        debug!("host closed the channel");
        Ok(())
    }
    .await;

    channel.inner.pending.clear();
    if let Err(err) = &result {
        error!(error = %err, "channel reader stopped");
    }
    result
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    use super::*;

    fn open_pair() -> (IpcChannel, ChannelTasks, DuplexStream) {
        let (plugin, host) = tokio::io::duplex(64 * 1024);
        let (channel, tasks) = IpcChannel::open(plugin, ChannelConfig::default());
        (channel, tasks, host)
    }

    #[tokio::test]
    async fn send_writes_event_frame() {
        let (channel, _tasks, host) = open_pair();
        channel.send("plugin-ready", vec![]).unwrap();

        let mut lines = BufReader::new(host).lines();
        let line = lines.next_line().await.unwrap().unwrap();
        assert_eq!(line, r#"["plugin-ready",null,[]]"#);
    }

    #[tokio::test]
    async fn dispatch_rejects_malformed_frame() {
        let (channel, _tasks, _host) = open_pair();
        let err = channel.dispatch(json!({"not": "a frame"})).unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn dispatch_routes_events_and_unrouted() {
        let (channel, _tasks, _host) = open_pair();
        let hits = Arc::new(AtomicUsize::new(0));
        {
            let hits = Arc::clone(&hits);
            channel.on(Topic::Close, move |_args| {
                hits.fetch_add(1, Ordering::SeqCst);
            });
        }

        assert_eq!(
            channel.dispatch(json!(["plugin-close", []])).unwrap(),
            Dispatch::Event { listeners: 1 }
        );
        assert_eq!(
            channel.dispatch(json!(["plugin-unknown", []])).unwrap(),
            Dispatch::Unrouted
        );
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn reader_stops_on_protocol_violation() {
        let (_channel, tasks, mut host) = open_pair();
        host.write_all(b"[42]\n").await.unwrap();

        let err = tasks.closed().await.unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn reader_ends_cleanly_on_eof() {
        let (_channel, tasks, host) = open_pair();
        drop(host);
        tasks.closed().await.unwrap();
    }

    #[tokio::test]
    async fn send_after_abort_reports_closed() {
        let (channel, tasks, _host) = open_pair();
        tasks.abort();
        while !channel.is_closed() {
            tokio::task::yield_now().await;
        }
        assert!(matches!(
            channel.send("plugin-ready", vec![]),
            Err(ChannelError::Closed)
        ));
    }

    #[tokio::test]
    async fn listeners_registered_before_start_see_first_frame() {
        let (plugin, mut host) = tokio::io::duplex(1024);
        host.write_all(b"[\"plugin-close\",[]]\n").await.unwrap();

        let (channel, starter) = IpcChannel::unstarted(ChannelConfig::default());
        let (tx, rx) = tokio::sync::oneshot::channel();
        let tx = std::sync::Mutex::new(Some(tx));
        channel.once(Topic::Close, move |_args| {
            if let Some(tx) = tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        });
        channel.send("plugin-ready", vec![]).unwrap();
        let _tasks = starter.start(plugin);

        rx.await.unwrap();
        let mut lines = BufReader::new(host).lines();
        assert_eq!(
            lines.next_line().await.unwrap().unwrap(),
            r#"["plugin-ready",null,[]]"#
        );
    }

    #[tokio::test]
    async fn dropped_invocation_leaves_no_entry() {
        let (channel, _tasks, _host) = open_pair();
        let call = channel.invoke("plugin-getSettings", vec![]);
        assert_eq!(channel.pending_count(), 1);
        drop(call);
        assert_eq!(channel.pending_count(), 0);
    }
}
