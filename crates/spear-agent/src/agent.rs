use std::net::Shutdown;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc;
use std::sync::{Arc, Condvar, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use bytes::Bytes;
use spear_frame::{FrameConfig, FrameError, FrameReader, FrameWriter};
use spear_transport::{HostStream, Notifier};
use tracing::{debug, error, info, warn};

use crate::codec::{CodecKind, WireCodec};
use crate::config::{AgentConfig, HostTarget};
use crate::dispatch;
use crate::envelope::{Envelope, Request, Response, RpcError, RpcResult, TOOL_CREATE};
use crate::error::{AgentError, Result};
use crate::handshake::send_secret;
use crate::inbound::{run_reader, ReaderExit};
use crate::inflight::InflightTracker;
use crate::outbound::{run_writer, OutboundQueue, WriterExit};
use crate::pending::PendingTable;
use crate::registry::{HandlerRegistry, ToolRegistry};
use crate::tool::{ToolId, ToolMessage, ToolParams, ToolSpec};

/// The live connection and the threads serving it.
struct Connection {
    stream: HostStream,
    shutdown: Arc<Notifier>,
    writer: JoinHandle<WriterExit>,
    reader: JoinHandle<ReaderExit>,
}

/// State shared by the agent handle, the I/O loops, the dispatcher and workers.
pub(crate) struct Shared {
    pub(crate) config: AgentConfig,
    pub(crate) codec: Arc<dyn WireCodec>,
    pub(crate) handlers: HandlerRegistry,
    pub(crate) tools: ToolRegistry,
    pub(crate) pending: PendingTable,
    pub(crate) inflight: Arc<InflightTracker>,
    next_id: AtomicU64,
    running: AtomicBool,
    stopping: AtomicBool,
    outbound: RwLock<Option<Arc<OutboundQueue>>>,
    connection: Mutex<Option<Connection>>,
    stopped: Mutex<bool>,
    stopped_cv: Condvar,
}

impl Shared {
    pub(crate) fn is_stopping(&self) -> bool {
        self.stopping.load(Ordering::SeqCst)
    }

    fn queue(&self) -> Result<Arc<OutboundQueue>> {
        self.outbound
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| AgentError::Disconnected("agent is not connected".to_string()))
    }

    /// Send a Response. An unencodable Response is replaced by an
    /// `INTERNAL_ERROR` Response with the same id.
    pub(crate) fn reply(&self, response: Response) {
        let id = response.id;
        let payload = match self.encode_outbound(&Envelope::Response(response)) {
            Ok(payload) => payload,
            Err(err) => {
                warn!(id, error = %err, "response cannot be sent; replying with internal error");
                let fallback = Response::error(id, &RpcError::internal(err));
                match self.encode_outbound(&Envelope::Response(fallback)) {
                    Ok(payload) => payload,
                    Err(err) => {
                        error!(id, error = %err, "failed to encode fallback response");
                        return;
                    }
                }
            }
        };

        let queued = self.queue().and_then(|queue| queue.push(payload));
        if let Err(err) = queued {
            debug!(id, error = %err, "dropping response");
        }
    }

    /// Encode an envelope into a frame payload that fits `max_payload_size`.
    fn encode_outbound(&self, envelope: &Envelope) -> Result<Bytes> {
        let payload = self.codec.encode(envelope)?;
        let max = self.config.max_payload_size;
        if payload.len() > max {
            return Err(FrameError::PayloadTooLarge {
                size: payload.len() as u64,
                max,
            }
            .into());
        }
        Ok(Bytes::from(payload))
    }

    /// Begin graceful shutdown. Only the first call has an effect.
    pub(crate) fn stop(self: &Arc<Self>) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        self.inflight.close();
        info!(inflight = self.inflight.current(), "stopping agent");

        let connected = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        if !connected {
            // Not started yet; `run` observes `stopping` and tears down itself.
            return;
        }

        let shared = Arc::clone(self);
        let spawned = thread::Builder::new()
            .name("spear-shutdown".to_string())
            .spawn(move || shared.take_and_close());
        if let Err(err) = spawned {
            error!(error = %err, "failed to spawn shutdown thread; closing inline");
            self.take_and_close();
        }
    }

    fn take_and_close(&self) {
        let conn = self
            .connection
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(conn) = conn {
            self.close(conn);
        }
    }

    /// Drain, then close: wait for workers, flush the writer, release the reader.
    fn close(&self, conn: Connection) {
        self.inflight.wait_idle();
        debug!("inflight work drained");

        if let Err(err) = conn.shutdown.notify() {
            warn!(error = %err, "failed to signal shutdown");
        }
        match conn.writer.join() {
            Ok(exit) => debug!(?exit, "writer joined"),
            Err(_) => error!("writer thread panicked"),
        }

        if let Err(err) = conn.stream.shutdown(Shutdown::Both) {
            debug!(error = %err, "socket shutdown failed");
        }
        match conn.reader.join() {
            Ok(exit) => debug!(?exit, "reader joined"),
            Err(_) => error!("reader thread panicked"),
        }
        drop(conn.stream);

        info!(pending = self.pending.len(), "agent stopped");
        *self.stopped.lock().unwrap_or_else(PoisonError::into_inner) = true;
        self.stopped_cv.notify_all();

        if self.config.exit_process_on_stop {
            std::process::exit(0);
        }
    }

    fn wait_stopped(&self) {
        let mut stopped = self.stopped.lock().unwrap_or_else(PoisonError::into_inner);
        while !*stopped {
            stopped = self
                .stopped_cv
                .wait(stopped)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }
}

/// One-slot rendezvous between a waiting caller and the dispatcher.
type Slot = Arc<(Mutex<Option<Response>>, Condvar)>;

/// Agent side of a host connection: RPC in both directions over one socket.
///
/// Cheap to clone; clones share the same connection, registries and state.
///
/// ```no_run
/// use bytes::Bytes;
/// use spear_agent::{HostAgent, RpcResult};
///
/// let agent = HostAgent::new();
/// agent.register_handler("echo", |params: Bytes| -> RpcResult { Ok(params) });
/// agent.run(None)?; // SERVICE_ADDR / SECRET from the environment
/// # Ok::<(), spear_agent::AgentError>(())
/// ```
#[derive(Clone)]
pub struct HostAgent {
    shared: Arc<Shared>,
}

impl Default for HostAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl HostAgent {
    /// Agent with default configuration and the JSON codec.
    pub fn new() -> Self {
        Self::with_config(AgentConfig::default())
    }

    pub fn with_config(config: AgentConfig) -> Self {
        Self::with_codec(config, CodecKind::default().build())
    }

    pub fn with_codec(config: AgentConfig, codec: Arc<dyn WireCodec>) -> Self {
        let next_id = AtomicU64::new(config.id_origin);
        Self {
            shared: Arc::new(Shared {
                config,
                codec,
                handlers: HandlerRegistry::new(),
                tools: ToolRegistry::new(),
                pending: PendingTable::new(),
                inflight: Arc::new(InflightTracker::new()),
                next_id,
                running: AtomicBool::new(false),
                stopping: AtomicBool::new(false),
                outbound: RwLock::new(None),
                connection: Mutex::new(None),
                stopped: Mutex::new(false),
                stopped_cv: Condvar::new(),
            }),
        }
    }

    pub fn config(&self) -> &AgentConfig {
        &self.shared.config
    }

    pub fn codec_name(&self) -> &'static str {
        self.shared.codec.name()
    }

    /// Register `handler` for `method`, replacing any previous one.
    pub fn register_handler<F>(&self, method: impl Into<String>, handler: F)
    where
        F: Fn(Bytes) -> RpcResult + Send + Sync + 'static,
    {
        let method = method.into();
        if self
            .shared
            .handlers
            .insert(method.clone(), Arc::new(handler))
            .is_some()
        {
            debug!(%method, "replaced handler");
        }
    }

    /// Returns whether a handler was registered.
    pub fn unregister_handler(&self, method: &str) -> bool {
        self.shared.handlers.remove(method).is_some()
    }

    /// Register a tool under a locally allocated id.
    pub fn register_tool<F>(&self, tool: F) -> ToolId
    where
        F: Fn(&ToolParams) -> std::result::Result<String, RpcError> + Send + Sync + 'static,
    {
        let tool_id = self.shared.tools.register(Arc::new(tool));
        debug!(tool_id, "registered tool");
        tool_id
    }

    /// Install a tool under an explicit id, replacing any previous one.
    pub fn set_tool<F>(&self, tool_id: ToolId, tool: F)
    where
        F: Fn(&ToolParams) -> std::result::Result<String, RpcError> + Send + Sync + 'static,
    {
        self.shared.tools.insert(tool_id, Arc::new(tool));
    }

    /// Returns whether a tool was registered under `tool_id`.
    pub fn remove_tool(&self, tool_id: ToolId) -> bool {
        self.shared.tools.remove(tool_id).is_some()
    }

    /// Announce a tool to the host and install it under the id the host assigns.
    pub fn create_tool<F>(&self, spec: ToolSpec, tool: F) -> Result<ToolId>
    where
        F: Fn(&ToolParams) -> std::result::Result<String, RpcError> + Send + Sync + 'static,
    {
        let name = spec.name.clone();
        let params = self.shared.codec.encode_tool(&ToolMessage::Create(spec))?;
        let response = self.exec_request(TOOL_CREATE, params)?;

        let payload = response.payload.unwrap_or_default();
        match self.shared.codec.decode_tool(&payload)? {
            ToolMessage::Created { tool_id } => {
                self.shared.tools.insert(tool_id, Arc::new(tool));
                info!(tool_id, tool = %name, "created tool");
                Ok(tool_id)
            }
            other => Err(AgentError::Protocol(format!(
                "expected created tool message, got '{}'",
                other.kind()
            ))),
        }
    }

    /// Call `method` on the host and block until its Response arrives.
    ///
    /// A non-zero response code is returned as [`AgentError::Remote`].
    pub fn exec_request(&self, method: &str, params: impl Into<Bytes>) -> Result<Response> {
        let (_, slot) = self.issue(method, params.into())?;
        let (lock, cv) = &*slot;
        let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(response) = guard.take() {
                return into_outcome(response);
            }
            guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
        }
    }

    /// Like [`exec_request`](Self::exec_request), but give up after `timeout`.
    ///
    /// On expiry the pending entry is removed, so a late Response is dropped.
    pub fn exec_request_timeout(
        &self,
        method: &str,
        params: impl Into<Bytes>,
        timeout: Duration,
    ) -> Result<Response> {
        let (id, slot) = self.issue(method, params.into())?;
        let deadline = Instant::now() + timeout;
        let (lock, cv) = &*slot;
        let mut guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
        loop {
            if let Some(response) = guard.take() {
                return into_outcome(response);
            }
            let now = Instant::now();
            if now >= deadline {
                if self.shared.pending.cancel(id) {
                    warn!(id, method, ?timeout, "request timed out");
                    return Err(AgentError::Timeout(timeout));
                }
                // Completion already claimed the entry; the Response is on its way.
                guard = cv.wait(guard).unwrap_or_else(PoisonError::into_inner);
                continue;
            }
            guard = cv
                .wait_timeout(guard, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    /// Allocate an id, register the pending entry, then enqueue the Request.
    fn issue(&self, method: &str, params: Bytes) -> Result<(u64, Slot)> {
        let queue = self.shared.queue()?;
        let id = self.shared.next_id.fetch_add(1, Ordering::SeqCst);
        let slot: Slot = Arc::new((Mutex::new(None), Condvar::new()));

        let completion_slot = Arc::clone(&slot);
        self.shared.pending.insert(
            id,
            method,
            Box::new(move |response| {
                let (lock, cv) = &*completion_slot;
                *lock.lock().unwrap_or_else(PoisonError::into_inner) = Some(response);
                cv.notify_all();
            }),
        );

        let request = Envelope::Request(Request::new(id, method, params));
        let sent = self
            .shared
            .encode_outbound(&request)
            .and_then(|payload| queue.push(payload));
        if let Err(err) = sent {
            self.shared.pending.cancel(id);
            return Err(err);
        }

        debug!(id, method, "request sent");
        Ok((id, slot))
    }

    /// Connect, handshake and serve until shutdown completes.
    ///
    /// With no explicit `target`, the address and secret come from the
    /// `SERVICE_ADDR` and `SECRET` environment variables.
    pub fn run(&self, target: Option<HostTarget>) -> Result<()> {
        let shared = &self.shared;
        if shared.running.swap(true, Ordering::SeqCst) {
            return Err(AgentError::AlreadyRunning);
        }
        if shared.is_stopping() {
            return Err(AgentError::Stopped);
        }

        let (conn, inbound) = match self.connect(target) {
            Ok(started) => started,
            Err(err) => {
                shared.running.store(false, Ordering::SeqCst);
                return Err(err);
            }
        };

        {
            let mut slot = shared
                .connection
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if shared.is_stopping() {
                drop(slot);
                shared.close(conn);
            } else {
                *slot = Some(conn);
            }
        }

        dispatch::main_loop(shared, inbound);
        shared.wait_stopped();
        Ok(())
    }

    fn connect(&self, target: Option<HostTarget>) -> Result<(Connection, mpsc::Receiver<Envelope>)> {
        let shared = &self.shared;
        let target = match target {
            Some(target) => target,
            None => HostTarget::from_env()?,
        };

        let mut stream = spear_transport::connect(&target.addr)?;
        send_secret(&mut stream, target.secret)?;
        info!(addr = %target.addr, codec = shared.codec.name(), "connected to host");

        let frame_config = FrameConfig {
            max_payload_size: shared.config.max_payload_size,
        };
        let shutdown = Arc::new(Notifier::new()?);
        let queue = Arc::new(OutboundQueue::new(shared.config.outbound_capacity)?);
        let writer_frames = FrameWriter::with_config(stream.try_clone()?, frame_config.clone());
        let reader_frames = FrameReader::with_config(stream.try_clone()?, frame_config);

        let writer = {
            let frames = writer_frames;
            let queue = Arc::clone(&queue);
            let shutdown = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("spear-writer".to_string())
                .spawn(move || run_writer(frames, &queue, &shutdown))?
        };

        let (tx, rx) = mpsc::channel();
        let reader = {
            let frames = reader_frames;
            let codec = Arc::clone(&shared.codec);
            let shutdown_for_reader = Arc::clone(&shutdown);
            thread::Builder::new()
                .name("spear-reader".to_string())
                .spawn(move || run_reader(frames, codec.as_ref(), tx, &shutdown_for_reader))
        };
        let reader = match reader {
            Ok(reader) => reader,
            Err(err) => {
                let _ = shutdown.notify();
                let _ = writer.join();
                return Err(err.into());
            }
        };

        // Published only once both loops run, so callers never queue into a
        // queue nobody drains.
        shared.next_id.store(shared.config.id_origin, Ordering::SeqCst);
        *shared
            .outbound
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(queue);

        Ok((
            Connection {
                stream,
                shutdown,
                writer,
                reader,
            },
            rx,
        ))
    }

    /// Begin graceful shutdown: refuse new requests, wait for running workers,
    /// flush outbound frames, then close the connection. Idempotent.
    pub fn stop(&self) {
        self.shared.stop();
    }

    pub fn is_running(&self) -> bool {
        self.shared.running.load(Ordering::SeqCst)
    }

    pub fn is_stopping(&self) -> bool {
        self.shared.is_stopping()
    }

    /// Workers currently executing.
    pub fn inflight(&self) -> usize {
        self.shared.inflight.current()
    }

    /// Outbound requests still awaiting a Response.
    pub fn pending_requests(&self) -> usize {
        self.shared.pending.len()
    }
}

fn into_outcome(response: Response) -> Result<Response> {
    if response.is_success() {
        return Ok(response);
    }
    Err(AgentError::Remote(RpcError {
        code: response.code,
        message: response.message.unwrap_or_default(),
        data: response.payload,
    }))
}
