mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

use bytes::Bytes;
use common::{agent_with, start, Gate, TestHost};
use spear_agent::{
    AgentConfig, AgentError, HostAgent, Response, RpcResult, OK, SHUTTING_DOWN, TOO_MANY_REQUESTS,
};

/// Register a handler that reports its start, then blocks on `gate`.
/// Tracks the highest number of concurrent invocations seen.
fn gated_handler(
    agent: &HostAgent,
    method: &str,
    gate: &Gate,
) -> (mpsc::Receiver<()>, Arc<AtomicUsize>) {
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = std::sync::Mutex::new(started_tx);
    let running = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let gate = gate.clone();
    let peak_out = Arc::clone(&peak);

    agent.register_handler(method, move |params: Bytes| -> RpcResult {
        let now = running.fetch_add(1, Ordering::SeqCst) + 1;
        peak.fetch_max(now, Ordering::SeqCst);
        let _ = started_tx.lock().unwrap().send(());
        gate.wait();
        running.fetch_sub(1, Ordering::SeqCst);
        Ok(params)
    });
    (started_rx, peak_out)
}

fn wait_until(condition: impl Fn() -> bool) {
    for _ in 0..500 {
        if condition() {
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
    panic!("condition not reached in time");
}

#[test]
fn admission_control_rejects_beyond_ceiling() {
    const MAX: usize = 2;

    let host = TestHost::bind();
    let agent = agent_with(AgentConfig::default().with_max_inflight(MAX));
    let gate = Gate::default();
    let (started, peak) = gated_handler(&agent, "slow", &gate);

    let (mut conn, runner) = start(&agent, &host);
    for id in 1..=(MAX as u64 + 1) {
        conn.request(id, "slow", Bytes::from(id.to_string()));
    }

    let rejected = conn.recv_response();
    assert_eq!(rejected.id, MAX as u64 + 1);
    assert_eq!(rejected.code, TOO_MANY_REQUESTS);

    for _ in 0..MAX {
        started.recv_timeout(Duration::from_secs(10)).unwrap();
    }
    assert_eq!(agent.inflight(), MAX);

    gate.open();
    let mut ids: Vec<u64> = (0..MAX)
        .map(|_| {
            let response = conn.recv_response();
            assert_eq!(response.code, OK);
            response.id
        })
        .collect();
    ids.sort_unstable();
    assert_eq!(ids, vec![1, 2]);
    assert!(peak.load(Ordering::SeqCst) <= MAX);

    // Slots are released once the workers finish.
    wait_until(|| agent.inflight() == 0);
    conn.request(10, "slow", Bytes::from_static(b"10"));
    assert_eq!(conn.recv_response().code, OK);

    conn.terminate();
    runner.join().unwrap().unwrap();
}

#[test]
fn terminate_drains_running_handlers_before_closing() {
    let host = TestHost::bind();
    let agent = HostAgent::new();
    let gate = Gate::default();
    let (started, _) = gated_handler(&agent, "slow", &gate);
    agent.register_handler("echo", |params: Bytes| -> RpcResult { Ok(params) });

    let (mut conn, runner) = start(&agent, &host);
    conn.request(1, "slow", Bytes::from_static(b"\"work\""));
    started.recv_timeout(Duration::from_secs(10)).unwrap();

    conn.terminate();
    conn.request(2, "echo", Bytes::from_static(b"\"late\""));

    let rejected = conn.recv_response();
    assert_eq!(rejected.id, 2);
    assert_eq!(rejected.code, SHUTTING_DOWN);
    assert!(agent.is_stopping());

    // Still draining: the socket stays open until the handler finishes.
    thread::sleep(Duration::from_millis(50));
    assert!(!runner.is_finished());
    assert_eq!(agent.inflight(), 1);

    gate.open();
    let finished = conn.recv_response();
    assert_eq!(finished.id, 1);
    assert_eq!(finished.payload.as_deref(), Some(&b"\"work\""[..]));

    conn.expect_closed();
    runner.join().unwrap().unwrap();
    assert_eq!(agent.inflight(), 0);
}

#[test]
fn draining_handler_can_still_call_host() {
    let host = TestHost::bind();
    let agent = HostAgent::new();
    let (started_tx, started_rx) = mpsc::channel();
    let started_tx = std::sync::Mutex::new(started_tx);
    {
        let inner = agent.clone();
        agent.register_handler("relay", move |params: Bytes| -> RpcResult {
            let _ = started_tx.lock().unwrap().send(());
            let response = inner
                .exec_request("host.lookup", params)
                .map_err(spear_agent::RpcError::internal)?;
            Ok(response.payload.unwrap_or_default())
        });
    }

    let (mut conn, runner) = start(&agent, &host);
    conn.request(1, "relay", Bytes::from_static(b"\"key\""));
    started_rx.recv_timeout(Duration::from_secs(10)).unwrap();

    let outbound = conn.recv_request();
    assert_eq!(outbound.method, "host.lookup");

    conn.terminate();
    thread::sleep(Duration::from_millis(20));
    conn.respond(Response::success(outbound.id, Bytes::from_static(b"\"value\"")));

    let relayed = conn.recv_response();
    assert_eq!(relayed.id, 1);
    assert_eq!(relayed.payload.as_deref(), Some(&b"\"value\""[..]));

    conn.expect_closed();
    runner.join().unwrap().unwrap();
}

#[test]
fn application_stop_drains_and_returns() {
    let host = TestHost::bind();
    let agent = HostAgent::new();
    let gate = Gate::default();
    let (started, _) = gated_handler(&agent, "slow", &gate);

    let (mut conn, runner) = start(&agent, &host);
    conn.request(7, "slow", Bytes::from_static(b"7"));
    started.recv_timeout(Duration::from_secs(10)).unwrap();

    agent.stop();
    agent.stop();
    assert!(agent.is_stopping());

    gate.open();
    assert_eq!(conn.recv_response().id, 7);
    conn.expect_closed();
    runner.join().unwrap().unwrap();

    assert!(matches!(
        agent.exec_request("host.op", Bytes::new()),
        Err(AgentError::Stopped)
    ));
}

#[test]
fn host_close_is_implicit_termination() {
    let host = TestHost::bind();
    let agent = HostAgent::new();
    let (conn, runner) = start(&agent, &host);

    conn.close();
    runner.join().unwrap().unwrap();
    assert!(agent.is_stopping());
}

#[test]
fn stop_before_connect_completes_cleanly() {
    let host = TestHost::bind();
    let agent = HostAgent::new();
    agent.stop();

    assert!(matches!(
        agent.run(Some(host.target())),
        Err(AgentError::Stopped)
    ));
}
