//! Ping-liveness supervision: a silent agent is cut off after twice the
//! ping interval, a chatty one stays.
//!
//! Timeouts are shrunk through [`ConnTuning`] so the suite runs in seconds.
//! Ping ages are tracked at whole-second granularity, so the shortened
//! deadline still needs a couple of real seconds of silence to trip.

use broker::connection::ConnTuning;
use broker::listener::AgentListener;
use broker::registry::Registry;
use ov_test_utils::MockGhost;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
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

fn fast_tuning() -> ConnTuning {
    ConnTuning {
        ping_timeout: Duration::from_secs(1),
        tick: Duration::from_millis(100),
        ..ConnTuning::default()
    }
}

#[tokio::test]
async fn silent_agent_is_terminated_and_unregistered() {
    let (addr, registry) = start_broker(fast_tuning()).await;
    let mut ghost = MockGhost::connect(addr).await.expect("connect");
    let res = ghost
        .register("s1", "m1", ov_protocol::Mode::Agent, ov_protocol::LogFormat::Text)
        .await
        .expect("register");
    assert!(res.is_success());

    // No pings from here on.  The broker closes the socket once the
    // silence exceeds twice the ping interval.
    let next = timeout(Duration::from_secs(10), ghost.recv_frame())
        .await
        .expect("broker never closed the connection");
    assert!(next.is_err(), "expected closed connection, got {next:?}");

    assert!(registry.session("s1").await.is_none());
    assert!(registry.agent_command_sender("m1").await.is_none());
}

#[tokio::test]
async fn pinging_agent_stays_connected() {
    let (addr, registry) = start_broker(fast_tuning()).await;
    let mut ghost = MockGhost::connect(addr).await.expect("connect");
    let res = ghost
        .register("s2", "m2", ov_protocol::Mode::Agent, ov_protocol::LogFormat::Text)
        .await
        .expect("register");
    assert!(res.is_success());

    // Ping well inside the deadline for several intervals.
    for _ in 0..4 {
        tokio::time::sleep(Duration::from_millis(700)).await;
        let res = timeout(Duration::from_secs(2), ghost.ping())
            .await
            .expect("ping timeout")
            .expect("ping");
        assert!(res.is_success());
    }
    assert!(registry.session("s2").await.is_some());
}

#[tokio::test]
async fn streaming_modes_are_exempt_from_ping_supervision() {
    let (addr, registry) = start_broker(fast_tuning()).await;
    let mut ghost = MockGhost::connect(addr).await.expect("connect");
    ghost
        .send_raw(
            b"{\"rid\":\"r1\",\"name\":\"register\",\"params\":{\"sid\":\"lc1\",\"mid\":\"m3\",\"mode\":4,\"format\":1}}\n",
        )
        .await
        .expect("send register");
    assert!(ghost.recv_response().await.expect("response").is_success());

    // A logcat stream never pings; three seconds of silence must not kill it.
    tokio::time::sleep(Duration::from_secs(3)).await;
    assert!(registry.session("lc1").await.is_some());
}
