use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use std::thread;

use bytes::Bytes;
use tracing::{debug, error, info, warn};

use crate::agent::Shared;
use crate::envelope::{Envelope, Request, Response, RpcError, RpcResult, SignalKind};
use crate::inflight::{InflightGuard, Rejected};
use crate::tool::ToolMessage;

/// Dispatcher main loop: route inbound envelopes until the reader hangs up.
///
/// Keeps running after a Terminate signal so that Responses still reach
/// handlers blocked in `exec_request` while the agent drains.
pub(crate) fn main_loop(shared: &Arc<Shared>, inbound: Receiver<Envelope>) {
    for envelope in inbound.iter() {
        dispatch(shared, envelope);
    }

    if !shared.is_stopping() {
        info!("connection closed; stopping");
        shared.stop();
    }
    debug!("dispatcher finished");
}

pub(crate) fn dispatch(shared: &Arc<Shared>, envelope: Envelope) {
    match envelope {
        Envelope::Request(request) => dispatch_request(shared, request),
        Envelope::Response(response) => {
            shared.pending.complete(response);
        }
        Envelope::Signal(signal) => match signal.kind {
            SignalKind::Terminate => {
                info!("terminate signal received");
                shared.stop();
            }
        },
    }
}

fn dispatch_request(shared: &Arc<Shared>, request: Request) {
    if shared.is_stopping() {
        debug!(id = request.id, method = %request.method, "rejecting request during shutdown");
        shared.reply(Response::error(request.id, &RpcError::shutting_down()));
        return;
    }

    if request.is_tool_invocation() {
        dispatch_tool(shared, request);
        return;
    }

    let Some(handler) = shared.handlers.get(&request.method) else {
        warn!(id = request.id, method = %request.method, "method not found");
        shared.reply(Response::error(
            request.id,
            &RpcError::method_not_found(&request.method),
        ));
        return;
    };

    let guard = match shared.inflight.try_acquire(shared.config.max_inflight) {
        Ok(guard) => guard,
        Err(rejected) => {
            reject(shared, request.id, rejected);
            return;
        }
    };

    let id = request.id;
    debug!(id, method = %request.method, "dispatching request");
    spawn_worker(shared, id, guard, move || handler.call(request.params));
}

fn dispatch_tool(shared: &Arc<Shared>, request: Request) {
    let id = request.id;
    let (tool_id, params) = match shared.codec.decode_tool(&request.params) {
        Ok(ToolMessage::Invoke { tool_id, params }) => (tool_id, params),
        Ok(other) => {
            warn!(id, kind = other.kind(), "unexpected tool message in invocation");
            shared.reply(Response::error(
                id,
                &RpcError::invalid_params(format!("expected tool invocation, got '{}'", other.kind())),
            ));
            return;
        }
        Err(err) => {
            warn!(id, error = %err, "undecodable tool invocation");
            shared.reply(Response::error(id, &RpcError::invalid_params(err)));
            return;
        }
    };

    let Some(tool) = shared.tools.get(tool_id) else {
        warn!(id, tool_id, "tool not found");
        shared.reply(Response::error(
            id,
            &RpcError::method_not_found(&format!("tool {tool_id}")),
        ));
        return;
    };

    let guard = match shared.inflight.acquire() {
        Ok(guard) => guard,
        Err(rejected) => {
            reject(shared, id, rejected);
            return;
        }
    };

    debug!(id, tool_id, "invoking tool");
    let codec = Arc::clone(&shared.codec);
    spawn_worker(shared, id, guard, move || {
        let result = tool.invoke(&params)?;
        let payload = codec
            .encode_tool(&ToolMessage::Output { result })
            .map_err(RpcError::internal)?;
        Ok(Bytes::from(payload))
    });
}

fn reject(shared: &Shared, id: u64, rejected: Rejected) {
    let err = match rejected {
        Rejected::Full => {
            warn!(id, max_inflight = shared.config.max_inflight, "too many requests in flight");
            RpcError::too_many_requests()
        }
        Rejected::Closed => RpcError::shutting_down(),
    };
    shared.reply(Response::error(id, &err));
}

/// Run `work` on its own thread and reply with its outcome. The slot held by
/// `guard` is released only after the Response has been queued.
fn spawn_worker<F>(shared: &Arc<Shared>, id: u64, guard: InflightGuard, work: F)
where
    F: FnOnce() -> RpcResult + Send + 'static,
{
    let worker_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name(format!("spear-handler-{id}"))
        .spawn(move || {
            let result = match panic::catch_unwind(AssertUnwindSafe(work)) {
                Ok(result) => result,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    error!(id, panic = %message, "worker panicked");
                    Err(RpcError::internal(format!("handler panicked: {message}")))
                }
            };
            if let Err(err) = &result {
                debug!(id, code = err.code, error = %err.message, "worker failed");
            }
            worker_shared.reply(Response::from_result(id, result));
            drop(guard);
        });

    if let Err(err) = spawned {
        error!(id, error = %err, "failed to spawn worker thread");
        shared.reply(Response::error(
            id,
            &RpcError::internal(format!("failed to spawn worker: {err}")),
        ));
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
