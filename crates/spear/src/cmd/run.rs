use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use spear_agent::{AgentConfig, HostAgent, HostTarget, RpcError, RpcResult, ToolParams};
use tracing::info;

use crate::cmd::RunArgs;
use crate::exit::{agent_error, CliError, CliResult, INTERNAL, SUCCESS};

pub fn run(args: RunArgs) -> CliResult<i32> {
    let agent = HostAgent::with_codec(agent_config(&args), args.codec.build());
    register_demo(&agent);
    install_ctrlc_handler(agent.clone())?;

    info!(
        addr = %args.addr,
        codec = agent.codec_name(),
        max_inflight = args.max_inflight,
        "starting agent"
    );
    agent
        .run(Some(HostTarget::new(args.addr, args.secret)))
        .map_err(|err| agent_error("agent failed", err))?;

    info!("agent stopped");
    Ok(SUCCESS)
}

/// The binary exits the process once shutdown has drained.
fn agent_config(args: &RunArgs) -> AgentConfig {
    AgentConfig::default()
        .with_max_inflight(args.max_inflight)
        .with_exit_process_on_stop(true)
}

fn register_demo(agent: &HostAgent) {
    agent.register_handler("echo", |params: Bytes| -> RpcResult { Ok(params) });
    agent.register_handler("ping", |_: Bytes| -> RpcResult {
        Ok(Bytes::from_static(b"\"pong\""))
    });
    let tool_id = agent.register_tool(datetime);
    info!(tool_id, "registered datetime tool");
}

/// Current time since the Unix epoch, in `unit` (`s` by default, or `ms`).
fn datetime(params: &ToolParams) -> Result<String, RpcError> {
    let elapsed = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(RpcError::internal)?;
    match params.get("unit").map(String::as_str) {
        None | Some("s") => Ok(elapsed.as_secs().to_string()),
        Some("ms") => Ok(elapsed.as_millis().to_string()),
        Some(other) => Err(RpcError::invalid_params(format!(
            "unknown unit '{other}' (expected s or ms)"
        ))),
    }
}

fn install_ctrlc_handler(agent: HostAgent) -> CliResult<()> {
    ctrlc::set_handler(move || {
        info!("interrupt received, draining");
        agent.stop();
    })
    .map_err(|err| CliError::new(INTERNAL, format!("signal handler setup failed: {err}")))
}
