#![allow(dead_code)]

use std::io::{ErrorKind, Read};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Condvar, Mutex};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use bytes::Bytes;
use spear_agent::{
    read_secret, AgentConfig, Envelope, HostAgent, HostTarget, JsonCodec, Request, Response,
    Result, Signal, ToolMessage, WireCodec,
};
use spear_frame::{FrameWriter, HEADER_SIZE};

pub const SECRET: u64 = 0x5EC2_E7;
const READ_TIMEOUT: Duration = Duration::from_secs(10);

/// Scripted host end of one agent connection.
pub struct TestHost {
    listener: TcpListener,
}

impl TestHost {
    pub fn bind() -> Self {
        Self {
            listener: TcpListener::bind("127.0.0.1:0").unwrap(),
        }
    }

    pub fn addr(&self) -> String {
        self.listener.local_addr().unwrap().to_string()
    }

    pub fn target(&self) -> HostTarget {
        HostTarget::new(self.addr(), SECRET)
    }

    /// Accept the agent and consume its handshake.
    pub fn accept(&self) -> HostConn {
        self.accept_with(Arc::new(JsonCodec))
    }

    pub fn accept_with(&self, codec: Arc<dyn WireCodec>) -> HostConn {
        let (mut stream, _) = self.listener.accept().unwrap();
        stream.set_read_timeout(Some(READ_TIMEOUT)).unwrap();
        let secret = read_secret(&mut stream).unwrap();
        assert_eq!(secret.value(), SECRET, "agent presented the wrong secret");

        let writer = FrameWriter::new(stream.try_clone().unwrap());
        HostConn {
            stream,
            writer,
            codec,
        }
    }
}

pub struct HostConn {
    stream: TcpStream,
    writer: FrameWriter<TcpStream>,
    pub codec: Arc<dyn WireCodec>,
}

impl HostConn {
    pub fn send(&mut self, envelope: &Envelope) {
        let payload = self.codec.encode(envelope).unwrap();
        self.writer.send(&payload).unwrap();
    }

    pub fn send_raw(&mut self, payload: &[u8]) {
        self.writer.send(payload).unwrap();
    }

    pub fn request(&mut self, id: u64, method: &str, params: impl Into<Bytes>) {
        self.send(&Envelope::Request(Request::new(id, method, params)));
    }

    pub fn respond(&mut self, response: Response) {
        self.send(&Envelope::Response(response));
    }

    pub fn terminate(&mut self) {
        self.send(&Envelope::Signal(Signal::terminate()));
    }

    pub fn invoke_tool(&mut self, id: u64, tool_id: u64, params: &[(&str, &str)]) {
        let message = ToolMessage::Invoke {
            tool_id,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        };
        let params = self.codec.encode_tool(&message).unwrap();
        self.request(id, spear_agent::TOOL_INVOKE, params);
    }

    /// Read one frame, or `None` once the agent has closed the connection.
    pub fn recv_frame(&mut self) -> Option<Vec<u8>> {
        let mut header = [0u8; HEADER_SIZE];
        match self.stream.read_exact(&mut header) {
            Ok(()) => {}
            Err(err) if err.kind() == ErrorKind::UnexpectedEof => return None,
            Err(err) if err.kind() == ErrorKind::ConnectionReset => return None,
            Err(err) => panic!("host read failed: {err}"),
        }
        let mut payload = vec![0u8; u64::from_le_bytes(header) as usize];
        self.stream.read_exact(&mut payload).unwrap();
        Some(payload)
    }

    pub fn recv(&mut self) -> Envelope {
        let payload = self.recv_frame().expect("agent closed the connection");
        self.codec.decode(&payload).unwrap()
    }

    pub fn recv_response(&mut self) -> Response {
        match self.recv() {
            Envelope::Response(response) => response,
            other => panic!("expected response, got {other:?}"),
        }
    }

    pub fn recv_request(&mut self) -> Request {
        match self.recv() {
            Envelope::Request(request) => request,
            other => panic!("expected request, got {other:?}"),
        }
    }

    pub fn expect_closed(&mut self) {
        if let Some(payload) = self.recv_frame() {
            panic!(
                "expected close, got frame {:?}",
                self.codec.decode(&payload)
            );
        }
    }

    pub fn close(self) {
        drop(self.writer);
        let _ = self.stream.shutdown(std::net::Shutdown::Both);
    }
}

/// Start `agent.run` against `host` on a background thread and accept it.
pub fn start(agent: &HostAgent, host: &TestHost) -> (HostConn, JoinHandle<Result<()>>) {
    let runner = {
        let agent = agent.clone();
        let target = host.target();
        thread::spawn(move || agent.run(Some(target)))
    };
    let conn = host.accept_with(codec_for(agent));
    (conn, runner)
}

fn codec_for(agent: &HostAgent) -> Arc<dyn WireCodec> {
    match agent.codec_name() {
        "binary" => Arc::new(spear_agent::BinaryCodec),
        _ => Arc::new(JsonCodec),
    }
}

pub fn agent_with(config: AgentConfig) -> HostAgent {
    HostAgent::with_config(config)
}

/// A gate that workers block on until the test opens it.
#[derive(Clone, Default)]
pub struct Gate {
    inner: Arc<(Mutex<bool>, Condvar)>,
}

impl Gate {
    pub fn wait(&self) {
        let (lock, cv) = &*self.inner;
        let mut open = lock.lock().unwrap();
        while !*open {
            open = cv.wait(open).unwrap();
        }
    }

    pub fn open(&self) {
        let (lock, cv) = &*self.inner;
        *lock.lock().unwrap() = true;
        cv.notify_all();
    }
}
