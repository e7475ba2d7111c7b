//! Minimal agent: serves `echo` and a `greet` tool, then calls the host once.
//!
//! The host address and secret come from the environment:
//!   SERVICE_ADDR=127.0.0.1:9100 SECRET=42 cargo run --example echo-agent

use std::thread;
use std::time::Duration;

use bytes::Bytes;
use spear::agent::{AgentError, HostAgent, RpcError, RpcResult, ToolId, ToolParams, ToolSpec};

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let agent = HostAgent::new();
    agent.register_handler("echo", |params: Bytes| -> RpcResult { Ok(params) });

    // The host assigns the tool id, so this runs once the connection is up.
    let setup = {
        let agent = agent.clone();
        thread::spawn(move || -> Result<(), AgentError> {
            let tool_id = create_greet_tool(&agent)?;
            eprintln!("greet tool registered as {tool_id}");

            let status = agent.exec_request("host.status", Bytes::new())?;
            eprintln!("host status: {:?}", status.payload);
            Ok(())
        })
    };

    agent.run(None)?;
    if let Ok(Err(err)) = setup.join() {
        eprintln!("setup failed: {err}");
    }
    Ok(())
}

fn create_greet_tool(agent: &HostAgent) -> Result<ToolId, AgentError> {
    let mut attempts = 0;
    loop {
        let spec = ToolSpec::new("greet", "say hello").param("name", "who to greet", true);
        match agent.create_tool(spec, greet) {
            Err(AgentError::Disconnected(_)) if attempts < 50 => {
                attempts += 1;
                thread::sleep(Duration::from_millis(100));
            }
            result => return result,
        }
    }
}

fn greet(params: &ToolParams) -> Result<String, RpcError> {
    let name = params
        .get("name")
        .ok_or_else(|| RpcError::invalid_params("missing name"))?;
    Ok(format!("hello, {name}"))
}
