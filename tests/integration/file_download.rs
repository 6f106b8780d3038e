//! File transfer paths: the spawn commands, the download announcement, and
//! the byte drain with its end-of-stream sentinel.

use broker::connection::{ConnCommand, ConnTuning, FileAction};
use broker::listener::AgentListener;
use broker::registry::Registry;
use ov_protocol::{LogFormat, Mode, request_names};
use ov_test_utils::MockGhost;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

async fn start_broker() -> (SocketAddr, Arc<Registry>) {
    let registry = Arc::new(Registry::new(2300..=2310));
    let listener = AgentListener::bind("127.0.0.1:0", registry.clone(), ConnTuning::default())
        .await
        .expect("bind broker");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(listener.run());
    (addr, registry)
}

#[tokio::test]
async fn download_drains_to_the_operator_and_ends_with_the_sentinel() {
    let (addr, registry) = start_broker().await;

    // The ghost dials a FILE-mode connection and announces its download.
    let mut file_ghost = MockGhost::connect(addr).await.expect("connect");
    let res = file_ghost
        .register("f1", "m1", Mode::File, LogFormat::Text)
        .await
        .expect("register file connection");
    assert!(res.is_success());

    file_ghost
        .send_request(
            request_names::REQUEST_TO_DOWNLOAD,
            json!({"terminal_sid": "t1", "filename": "fw.bin", "size": 6}),
        )
        .await
        .expect("send download request");
    let res = file_ghost.recv_response().await.expect("download response");
    assert!(res.is_success());

    let mut stream = registry.take_download("f1").await.expect("download handoff");
    assert_eq!(stream.filename, "fw.bin");
    assert_eq!(stream.size, 6);

    // Every byte after the announcement is file data, not RPC.
    file_ghost.send_raw(b"abc").await.expect("send chunk");
    assert_eq!(
        timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("chunk timeout")
            .expect("chunk"),
        b"abc"
    );
    file_ghost.send_raw(b"def").await.expect("send chunk");
    file_ghost.shutdown_write().await.expect("half-close");

    assert_eq!(
        timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("chunk timeout")
            .expect("chunk"),
        b"def"
    );
    // EOF becomes the end-of-stream sentinel, then the connection goes away.
    assert!(
        timeout(Duration::from_secs(2), stream.recv())
            .await
            .expect("sentinel timeout")
            .is_none()
    );

    for _ in 0..50 {
        if registry.session("f1").await.is_none() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    panic!("file session still registered after EOF");
}

#[tokio::test]
async fn file_spawn_commands_carry_the_documented_shapes() {
    let (addr, registry) = start_broker().await;
    let mut agent = MockGhost::connect(addr).await.expect("connect");
    let res = agent
        .register("s1", "m1", Mode::Agent, LogFormat::Text)
        .await
        .expect("register agent");
    assert!(res.is_success());
    let cmd_tx = registry.agent_command_sender("m1").await.expect("agent online");

    // Download direction: {sid, filename}.
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ConnCommand::SpawnFileServer {
            sid: "f2".to_owned(),
            action: FileAction::Download,
            filename: "logs.tar".to_owned(),
            terminal_sid: String::new(),
            reply: reply_tx,
        })
        .await
        .expect("send command");
    let req = agent.expect_request().await.expect("file_download request");
    assert_eq!(req.name, request_names::FILE_DOWNLOAD);
    assert_eq!(req.params, json!({"sid": "f2", "filename": "logs.tar"}));
    agent
        .respond(&req.rid, ov_protocol::RESPONSE_SUCCESS, Value::Null)
        .await
        .expect("ack");
    assert_eq!(reply_rx.await.expect("reply"), "");

    // Upload direction: {sid, terminal_sid, filename}.
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ConnCommand::SpawnFileServer {
            sid: "f3".to_owned(),
            action: FileAction::Upload,
            filename: "image.bin".to_owned(),
            terminal_sid: "t1".to_owned(),
            reply: reply_tx,
        })
        .await
        .expect("send command");
    let req = agent.expect_request().await.expect("file_upload request");
    assert_eq!(req.name, request_names::FILE_UPLOAD);
    assert_eq!(
        req.params,
        json!({"sid": "f3", "terminal_sid": "t1", "filename": "image.bin"})
    );
    agent
        .respond(&req.rid, ov_protocol::RESPONSE_SUCCESS, Value::Null)
        .await
        .expect("ack");
    assert_eq!(reply_rx.await.expect("reply"), "");
}

#[tokio::test]
async fn clear_to_upload_is_recorded_without_a_reply() {
    let (addr, registry) = start_broker().await;
    let mut file_ghost = MockGhost::connect(addr).await.expect("connect");
    let res = file_ghost
        .register("f4", "m1", Mode::File, LogFormat::Text)
        .await
        .expect("register file connection");
    assert!(res.is_success());

    file_ghost
        .send_request(request_names::CLEAR_TO_UPLOAD, Value::Null)
        .await
        .expect("send clear_to_upload");

    // No reply by contract; a ping round-trip proves the verb was consumed.
    assert!(file_ghost.ping().await.expect("ping").is_success());
    assert!(registry.take_upload_request("f4").await);
}

#[tokio::test]
async fn fire_and_forget_commands_reach_the_agent() {
    let (addr, registry) = start_broker().await;
    let mut agent = MockGhost::connect(addr).await.expect("connect");
    let res = agent
        .register("s5", "m5", Mode::Agent, LogFormat::Text)
        .await
        .expect("register agent");
    assert!(res.is_success());
    let cmd_tx = registry.agent_command_sender("m5").await.expect("agent online");

    cmd_tx.send(ConnCommand::ClearToDownload).await.expect("send command");
    let req = agent.expect_request().await.expect("clear_to_download request");
    assert_eq!(req.name, request_names::CLEAR_TO_DOWNLOAD);
    assert_eq!(req.params, Value::Null);

    cmd_tx.send(ConnCommand::Upgrade).await.expect("send command");
    let req = agent.expect_request().await.expect("upgrade request");
    assert_eq!(req.name, request_names::UPGRADE);
}
