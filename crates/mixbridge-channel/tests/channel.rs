use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use mixbridge_channel::{ChannelConfig, ChannelError, ChannelTasks, IpcChannel};
use mixbridge_frame::{Button, InboundFrame, OutboundFrame, Topic};
use serde_json::{json, Value};
use tokio::io::{
    AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream, Lines, ReadHalf, WriteHalf,
};

/// The host end of an in-memory channel.
struct FakeHost {
    lines: Lines<BufReader<ReadHalf<DuplexStream>>>,
    writer: WriteHalf<DuplexStream>,
}

impl FakeHost {
    async fn next_frame(&mut self) -> OutboundFrame {
        let line = self
            .lines
            .next_line()
            .await
            .expect("read from plugin")
            .expect("plugin closed the stream");
        OutboundFrame::from_value(serde_json::from_str(&line).expect("valid json"))
            .expect("valid outbound frame")
    }

    async fn next_line(&mut self) -> String {
        self.lines.next_line().await.unwrap().unwrap()
    }

    async fn write(&mut self, frame: &InboundFrame) {
        let mut line = serde_json::to_vec(frame).unwrap();
        line.push(b'\n');
        self.writer.write_all(&line).await.unwrap();
    }

    async fn write_raw(&mut self, raw: &[u8]) {
        self.writer.write_all(raw).await.unwrap();
    }
}

fn open() -> (IpcChannel, ChannelTasks, FakeHost) {
    let (plugin, host) = tokio::io::duplex(64 * 1024);
    let (channel, tasks) = IpcChannel::open(plugin, ChannelConfig::default());
    let (read, writer) = tokio::io::split(host);
    let host = FakeHost {
        lines: BufReader::new(read).lines(),
        writer,
    };
    (channel, tasks, host)
}

#[tokio::test]
async fn send_emits_null_correlation() {
    let (channel, _tasks, mut host) = open();
    channel
        .send(
            "plugin-updateAssignment",
            vec![json!({"name": "ch1", "volume": 0.5})],
        )
        .unwrap();

    assert_eq!(
        host.next_line().await,
        r#"["plugin-updateAssignment",null,[{"name":"ch1","volume":0.5}]]"#
    );
}

#[tokio::test]
async fn frames_leave_in_call_order() {
    let (channel, _tasks, mut host) = open();
    channel.send("plugin-ready", vec![]).unwrap();
    let _settings = channel.invoke("plugin-getSettings", vec![]);
    channel.send("plugin-removeAssignment", vec![json!("a")]).unwrap();

    assert_eq!(host.next_frame().await.channel, "plugin-ready");
    let invoke = host.next_frame().await;
    assert_eq!(invoke.channel, "plugin-getSettings");
    assert!(invoke.reply_to.is_some());
    assert_eq!(host.next_frame().await.channel, "plugin-removeAssignment");
}

#[tokio::test]
async fn invoke_resolves_with_first_reply_arg() {
    let (channel, _tasks, mut host) = open();
    let call = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));

    let request = host.next_frame().await;
    let token = request.reply_to.expect("request carries a token");
    host.write(&InboundFrame::reply(&token, json!({"volume": 3})))
        .await;

    let value = call.await.unwrap().unwrap();
    assert_eq!(value, json!({"volume": 3}));
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test]
async fn concurrent_invocations_resolve_independently() {
    let (channel, _tasks, mut host) = open();
    let first = tokio::spawn(channel.invoke("plugin-getManifest", vec![]));
    let second = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));

    let a = host.next_frame().await;
    let b = host.next_frame().await;
    assert_ne!(a.reply_to, b.reply_to);

    // Reply out of order.
    host.write(&InboundFrame::reply(b.reply_to.as_ref().unwrap(), json!("b")))
        .await;
    host.write(&InboundFrame::reply(a.reply_to.as_ref().unwrap(), json!("a")))
        .await;

    let results = [first.await.unwrap().unwrap(), second.await.unwrap().unwrap()];
    let by_channel = |frame: &OutboundFrame| match frame.channel.as_str() {
        "plugin-getManifest" => 0,
        _ => 1,
    };
    assert_eq!(results[by_channel(&a)], json!("a"));
    assert_eq!(results[by_channel(&b)], json!("b"));
}

#[tokio::test]
async fn reply_without_args_resolves_to_null() {
    let (channel, _tasks, mut host) = open();
    let call = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));

    let token = host.next_frame().await.reply_to.unwrap();
    host.write_raw(format!("[\"{token}\"]\n").as_bytes()).await;

    assert_eq!(call.await.unwrap().unwrap(), Value::Null);
}

#[tokio::test(start_paused = true)]
async fn invoke_times_out_after_five_seconds() {
    let (channel, _tasks, mut host) = open();
    let started = tokio::time::Instant::now();
    let call = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));
    let _request = host.next_frame().await;

    let err = call.await.unwrap().unwrap_err();
    assert!(matches!(err, ChannelError::Timeout(d) if d == Duration::from_millis(5000)));
    assert!(started.elapsed() >= Duration::from_millis(5000));
    assert_eq!(channel.pending_count(), 0);
}

#[tokio::test(start_paused = true)]
async fn late_reply_is_dropped() {
    let (channel, tasks, mut host) = open();
    let call = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));
    let token = host.next_frame().await.reply_to.unwrap();

    assert!(call.await.unwrap().is_err());

    // Arrives after the deadline: no listener, no pending entry, no error.
    host.write(&InboundFrame::reply(&token, json!(1))).await;
    channel.send("plugin-ready", vec![]).unwrap();
    assert_eq!(host.next_frame().await.channel, "plugin-ready");
    assert!(!tasks.is_finished());
    assert!(!channel.is_pending(token.as_str()));
}

#[tokio::test]
async fn press_topic_fires_on_every_frame() {
    let (channel, _tasks, mut host) = open();
    let hits = Arc::new(AtomicUsize::new(0));
    {
        let hits = Arc::clone(&hits);
        channel.on(Topic::press("ch1", Button::Mute), move |_args| {
            hits.fetch_add(1, Ordering::SeqCst);
        });
    }

    for _ in 0..3 {
        host.write(&InboundFrame::new("plugin-onPress-mute-ch1", vec![]))
            .await;
    }
    // Round-trip through an invoke so all three presses have been dispatched.
    let call = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));
    let token = host.next_frame().await.reply_to.unwrap();
    host.write(&InboundFrame::reply(&token, json!(null))).await;
    call.await.unwrap().unwrap();

    assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn volume_event_carries_level() {
    let (channel, _tasks, mut host) = open();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let (done_tx, done_rx) = tokio::sync::oneshot::channel();
    let done_tx = Mutex::new(Some(done_tx));
    {
        let seen = Arc::clone(&seen);
        channel.on(Topic::volume("ch1"), move |args| {
            seen.lock().unwrap().extend_from_slice(args);
            if let Some(tx) = done_tx.lock().unwrap().take() {
                let _ = tx.send(());
            }
        });
    }

    host.write(&InboundFrame::new("plugin-onVolume-ch1", vec![json!(0.75)]))
        .await;
    done_rx.await.unwrap();
    assert_eq!(*seen.lock().unwrap(), vec![json!(0.75)]);
}

#[tokio::test]
async fn malformed_frame_is_fatal() {
    let (channel, tasks, mut host) = open();
    let call = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));
    let _request = host.next_frame().await;

    host.write_raw(b"{\"topic\":\"plugin-close\"}\n").await;

    let err = tasks.closed().await.unwrap_err();
    assert!(matches!(err, ChannelError::Protocol(_)));
    assert!(matches!(
        call.await.unwrap().unwrap_err(),
        ChannelError::Closed
    ));
}

#[tokio::test]
async fn invalid_json_is_fatal() {
    let (_channel, tasks, mut host) = open();
    host.write_raw(b"[\"plugin-close\", [\n").await;

    let err = tasks.closed().await.unwrap_err();
    assert!(matches!(err, ChannelError::Frame(_)));
}

#[tokio::test]
async fn host_hangup_fails_pending_invocations() {
    let (channel, tasks, mut host) = open();
    let call = tokio::spawn(channel.invoke("plugin-getSettings", vec![]));
    let _request = host.next_frame().await;
    drop(host);

    tasks.closed().await.unwrap();
    assert!(matches!(
        call.await.unwrap().unwrap_err(),
        ChannelError::Closed
    ));
}
