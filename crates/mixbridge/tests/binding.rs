use mixbridge::transport::{CHANNEL_FD_ENV, NODE_CHANNEL_FD_ENV};

#[tokio::test]
async fn embedded_process_installs_nothing() {
    if std::env::var_os(CHANNEL_FD_ENV).is_some() || std::env::var_os(NODE_CHANNEL_FD_ENV).is_some()
    {
        return;
    }

    assert!(mixbridge::install().unwrap().is_none());
    assert!(mixbridge::install().unwrap().is_none());
    assert!(mixbridge::installed().is_none());
}
