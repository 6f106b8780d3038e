//! Terminal and shell sessions: spawn command round trips, operator
//! pairing, the sid announcement, duplex byte flow, and pump shutdown.

use broker::connection::{ConnCommand, ConnTuning};
use broker::listener::AgentListener;
use broker::registry::Registry;
use broker::ws::{WsFrame, operator_channel};
use ov_protocol::{ControlMessage, LogFormat, Mode, request_names};
use ov_test_utils::MockGhost;
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::time::timeout;

async fn start_broker(tuning: ConnTuning) -> (SocketAddr, Arc<Registry>) {
    let registry = Arc::new(Registry::new(2300..=2310));
    let listener = AgentListener::bind("127.0.0.1:0", registry.clone(), tuning)
        .await
        .expect("bind broker");
    let addr = listener.local_addr().expect("local_addr");
    tokio::spawn(listener.run());
    (addr, registry)
}

async fn register_agent(addr: SocketAddr, sid: &str, mid: &str) -> MockGhost {
    let mut agent = MockGhost::connect(addr).await.expect("connect agent");
    let res = agent
        .register(sid, mid, Mode::Agent, LogFormat::Text)
        .await
        .expect("register agent");
    assert!(res.is_success());
    agent
}

#[tokio::test]
async fn terminal_spawn_pairs_operator_and_pipes_both_directions() {
    let (addr, registry) = start_broker(ConnTuning::default()).await;
    let mut agent = register_agent(addr, "s-agent", "m1").await;

    // The front-end stages the operator, then asks the agent for a terminal.
    let (op_conn, mut op) = operator_channel();
    registry.park_operator("t1", op_conn).await;
    let cmd_tx = registry.agent_command_sender("m1").await.expect("agent online");
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ConnCommand::SpawnTerminal {
            sid: "t1".to_owned(),
            tty_device: None,
            reply: reply_tx,
        })
        .await
        .expect("send command");

    // The agent sees the terminal request and dials back a TERMINAL socket.
    let req = timeout(Duration::from_secs(2), agent.expect_request())
        .await
        .expect("terminal request timeout")
        .expect("terminal request");
    assert_eq!(req.name, request_names::TERMINAL);
    assert_eq!(req.params["sid"], json!("t1"));
    assert!(req.params.get("tty_device").is_none());

    let mut term = MockGhost::connect(addr).await.expect("connect terminal");
    let res = term
        .register("t1", "m1", Mode::Terminal, LogFormat::Text)
        .await
        .expect("register terminal");
    assert!(res.is_success(), "terminal register failed: {}", res.response);

    agent
        .respond(&req.rid, ov_protocol::RESPONSE_SUCCESS, Value::Null)
        .await
        .expect("ack terminal request");
    let outcome = timeout(Duration::from_secs(2), reply_rx)
        .await
        .expect("spawn reply timeout")
        .expect("spawn reply");
    assert_eq!(outcome, "");

    // First frame on the operator side announces the session id.
    match timeout(Duration::from_secs(2), op.from_conn.recv()).await {
        Ok(Some(WsFrame::Text(text))) => {
            let control: ControlMessage = serde_json::from_str(&text).expect("control frame");
            assert_eq!(control, ControlMessage::sid("t1"));
        }
        other => panic!("expected sid control frame, got {other:?}"),
    }

    // Ghost -> operator.
    term.send_raw(b"$ ").await.expect("send prompt");
    match timeout(Duration::from_secs(2), op.from_conn.recv()).await {
        Ok(Some(WsFrame::Binary(data))) => assert_eq!(data, b"$ "),
        other => panic!("expected prompt bytes, got {other:?}"),
    }

    // Operator -> ghost, text and binary both flow on a terminal.
    op.to_conn
        .send(WsFrame::Text("ls\n".to_owned()))
        .await
        .expect("send text input");
    assert_eq!(term.recv_exact(3).await.expect("input bytes"), b"ls\n");
    op.to_conn
        .send(WsFrame::Binary(vec![0x1b, b'[', b'A']))
        .await
        .expect("send binary input");
    assert_eq!(term.recv_exact(3).await.expect("escape bytes"), [0x1b, b'[', b'A']);
}

#[tokio::test]
async fn shell_input_pump_drops_binary_frames() {
    let (addr, registry) = start_broker(ConnTuning::default()).await;

    let (op_conn, mut op) = operator_channel();
    registry.park_operator("sh1", op_conn).await;
    let mut shell = MockGhost::connect(addr).await.expect("connect shell");
    let res = shell
        .register("sh1", "m1", Mode::Shell, LogFormat::Text)
        .await
        .expect("register shell");
    assert!(res.is_success());

    // Binary input never reaches the shell's stdin; the text after it does.
    op.to_conn
        .send(WsFrame::Binary(b"\x00evil".to_vec()))
        .await
        .expect("send binary input");
    op.to_conn
        .send(WsFrame::Text("echo hi\n".to_owned()))
        .await
        .expect("send text input");
    assert_eq!(shell.recv_exact(8).await.expect("input bytes"), b"echo hi\n");

    // Shell output passes through unrewritten even though the connection
    // registered with the TEXT format.
    shell.send_raw(b"hi\n").await.expect("send output");
    match timeout(Duration::from_secs(2), op.from_conn.recv()).await {
        Ok(Some(WsFrame::Binary(data))) => assert_eq!(data, b"hi\n"),
        other => panic!("expected output bytes, got {other:?}"),
    }
}

#[tokio::test]
async fn operator_close_tears_the_session_down() {
    let (addr, registry) = start_broker(ConnTuning::default()).await;

    let (op_conn, mut op) = operator_channel();
    registry.park_operator("sh2", op_conn).await;
    let mut shell = MockGhost::connect(addr).await.expect("connect shell");
    let res = shell
        .register("sh2", "m1", Mode::Shell, LogFormat::Text)
        .await
        .expect("register shell");
    assert!(res.is_success());

    op.to_conn.send(WsFrame::Close).await.expect("send close");

    let next = timeout(Duration::from_secs(2), shell.recv_frame())
        .await
        .expect("close timeout");
    assert!(next.is_err(), "expected closed socket, got {next:?}");
    match timeout(Duration::from_secs(2), op.from_conn.recv()).await {
        Ok(Some(WsFrame::Close)) | Ok(None) => {}
        other => panic!("expected close frame, got {other:?}"),
    }
    assert!(registry.session("sh2").await.is_none());
}

#[tokio::test]
async fn spawn_failure_status_reaches_the_caller() {
    let (addr, registry) = start_broker(ConnTuning::default()).await;
    let mut agent = register_agent(addr, "s-agent", "m9").await;

    let cmd_tx = registry.agent_command_sender("m9").await.expect("agent online");
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ConnCommand::SpawnShell {
            sid: "sh9".to_owned(),
            command: "bash".to_owned(),
            reply: reply_tx,
        })
        .await
        .expect("send command");

    let req = agent.expect_request().await.expect("shell request");
    assert_eq!(req.name, request_names::SHELL);
    assert_eq!(req.params["command"], json!("bash"));
    agent
        .respond(&req.rid, "ghost busy", Value::Null)
        .await
        .expect("nack shell request");

    let outcome = timeout(Duration::from_secs(2), reply_rx)
        .await
        .expect("reply timeout")
        .expect("reply");
    assert_eq!(outcome, "ghost busy");
}

#[tokio::test]
async fn unanswered_spawn_times_out_with_command_timeout() {
    let tuning = ConnTuning {
        rpc_timeout: Duration::from_millis(300),
        tick: Duration::from_millis(100),
        ..ConnTuning::default()
    };
    let (addr, registry) = start_broker(tuning).await;
    let mut agent = register_agent(addr, "s-agent", "m2").await;

    let cmd_tx = registry.agent_command_sender("m2").await.expect("agent online");
    let (reply_tx, reply_rx) = oneshot::channel();
    cmd_tx
        .send(ConnCommand::SpawnForwarder {
            sid: "f1".to_owned(),
            port: 8022,
            reply: reply_tx,
        })
        .await
        .expect("send command");

    // The agent reads the request but never answers.
    let req = agent.expect_request().await.expect("forward request");
    assert_eq!(req.name, request_names::FORWARD);

    let outcome = timeout(Duration::from_secs(3), reply_rx)
        .await
        .expect("timeout sweep never fired")
        .expect("reply");
    assert_eq!(outcome, "command timeout");

    // The connection itself is still healthy.
    assert!(agent.ping().await.expect("ping").is_success());
}
