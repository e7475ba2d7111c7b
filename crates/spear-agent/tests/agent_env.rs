mod common;

use std::thread;

use bytes::Bytes;
use common::{TestHost, SECRET};
use spear_agent::{AgentError, HostAgent, RpcResult, ENV_SECRET, ENV_SERVICE_ADDR};

// Single test in this binary: it mutates the process environment.
#[test]
fn run_reads_target_from_environment() {
    std::env::remove_var(ENV_SERVICE_ADDR);
    std::env::remove_var(ENV_SECRET);
    let agent = HostAgent::new();
    assert!(matches!(agent.run(None), Err(AgentError::Config(_))));
    assert!(!agent.is_running());

    let host = TestHost::bind();
    std::env::set_var(ENV_SERVICE_ADDR, host.addr());
    std::env::set_var(ENV_SECRET, SECRET.to_string());

    agent.register_handler("echo", |params: Bytes| -> RpcResult { Ok(params) });
    let runner = {
        let agent = agent.clone();
        thread::spawn(move || agent.run(None))
    };

    let mut conn = host.accept();
    conn.request(1, "echo", Bytes::from_static(b"null"));
    assert_eq!(conn.recv_response().id, 1);

    conn.terminate();
    runner.join().unwrap().unwrap();
}
