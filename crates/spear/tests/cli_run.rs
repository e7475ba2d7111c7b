#![cfg(all(unix, feature = "cli"))]

use std::io::Read;
use std::net::{TcpListener, TcpStream};
use std::process::{Child, Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use bytes::Bytes;
use spear_agent::{read_secret, Envelope, JsonCodec, Request, Signal, WireCodec, OK};
use spear_frame::{FrameWriter, HEADER_SIZE};

const SECRET: u64 = 4242;

fn spawn_agent(addr: &str) -> Child {
    Command::new(env!("CARGO_BIN_EXE_spear-agent"))
        .arg("--log-level")
        .arg("error")
        .arg("run")
        .env("SERVICE_ADDR", addr)
        .env("SECRET", SECRET.to_string())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()
        .expect("agent should start")
}

fn wait_with_timeout(child: &mut Child, timeout: Duration) -> std::process::ExitStatus {
    let start = Instant::now();
    loop {
        if let Some(status) = child.try_wait().expect("wait should succeed") {
            return status;
        }
        if start.elapsed() >= timeout {
            let _ = child.kill();
            panic!("agent did not exit in time");
        }
        thread::sleep(Duration::from_millis(25));
    }
}

fn recv(stream: &mut TcpStream) -> Envelope {
    let mut header = [0u8; HEADER_SIZE];
    stream.read_exact(&mut header).expect("frame header");
    let mut payload = vec![0u8; u64::from_le_bytes(header) as usize];
    stream.read_exact(&mut payload).expect("frame payload");
    JsonCodec.decode(&payload).expect("agent frames should decode")
}

#[test]
fn run_serves_demo_handlers_and_exits_on_terminate() {
    let listener = TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap().to_string();
    let mut child = spawn_agent(&addr);

    let (mut stream, _) = listener.accept().unwrap();
    stream
        .set_read_timeout(Some(Duration::from_secs(10)))
        .unwrap();
    assert_eq!(read_secret(&mut stream).unwrap().value(), SECRET);

    let mut writer = FrameWriter::new(stream.try_clone().unwrap());
    let codec = JsonCodec;
    let ping = Envelope::Request(Request::new(1, "ping", Bytes::new()));
    writer.send(&codec.encode(&ping).unwrap()).unwrap();

    match recv(&mut stream) {
        Envelope::Response(response) => {
            assert_eq!(response.id, 1);
            assert_eq!(response.code, OK);
            assert_eq!(response.payload.as_deref(), Some(&b"\"pong\""[..]));
        }
        other => panic!("expected response, got {other:?}"),
    }

    let terminate = Envelope::Signal(Signal::terminate());
    writer.send(&codec.encode(&terminate).unwrap()).unwrap();

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert_eq!(status.code(), Some(0));
}

#[test]
fn run_against_closed_port_reports_transport_error() {
    // Bind then drop to get a port nothing listens on.
    let addr = {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().to_string()
    };
    let mut child = spawn_agent(&addr);

    let status = wait_with_timeout(&mut child, Duration::from_secs(10));
    assert_eq!(status.code(), Some(3));

    let mut stderr = String::new();
    child
        .stderr
        .take()
        .unwrap()
        .read_to_string(&mut stderr)
        .unwrap();
    assert!(stderr.contains("agent failed"), "stderr: {stderr}");
}

#[test]
fn version_prints_binary_name() {
    let output = Command::new(env!("CARGO_BIN_EXE_spear-agent"))
        .arg("version")
        .output()
        .expect("version should run");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.starts_with("spear-agent "), "stdout: {stdout}");
}
