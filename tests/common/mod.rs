//! Shared utilities for integration testing.

#![allow(dead_code)]

use std::io;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_compression::tokio::bufread::GzipEncoder;
use http_handlers::http::{Handler, HttpServer};
use http_handlers::lifecycle::Shutdown;
use http_handlers::observability::Logger;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tracing_subscriber::fmt::MakeWriter;

/// In-memory destination for access log records.
#[derive(Clone, Default)]
pub struct LogSink {
    buf: Arc<Mutex<Vec<u8>>>,
}

pub struct LogSinkWriter {
    buf: Arc<Mutex<Vec<u8>>>,
}

impl io::Write for LogSinkWriter {
    fn write(&mut self, data: &[u8]) -> io::Result<usize> {
        self.buf.lock().unwrap().extend_from_slice(data);
        Ok(data.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogSink {
    type Writer = LogSinkWriter;

    fn make_writer(&'a self) -> Self::Writer {
        LogSinkWriter {
            buf: self.buf.clone(),
        }
    }
}

impl LogSink {
    pub fn records(&self) -> Vec<Value> {
        let text = String::from_utf8(self.buf.lock().unwrap().clone()).unwrap();
        text.lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    /// Wait until at least `count` records were written.
    pub async fn wait_for(&self, count: usize) -> Vec<Value> {
        for _ in 0..100 {
            let records = self.records();
            if records.len() >= count {
                return records;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("expected {count} log records, got {:?}", self.records());
    }
}

/// Info-level logger writing into a fresh sink.
pub fn test_logger() -> (Logger, LogSink) {
    let sink = LogSink::default();
    let logger = Logger::with_writer("test-service", tracing::Level::INFO, sink.clone());
    (logger, sink)
}

/// A handler chain served on an ephemeral local port.
pub struct TestServer {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    task: JoinHandle<io::Result<()>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub async fn stop(self) {
        self.shutdown.trigger();
        let _ = tokio::time::timeout(Duration::from_secs(5), self.task).await;
    }
}

/// Serve `handler` on 127.0.0.1 with an OS-assigned port.
pub async fn spawn_server<H: Handler>(handler: H) -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let shutdown = Shutdown::new();
    let signalled = shutdown.signalled();

    let task = tokio::spawn(async move { HttpServer::new(handler).run(listener, signalled).await });

    TestServer {
        addr,
        shutdown,
        task,
    }
}

pub async fn gzip(input: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    GzipEncoder::new(input).read_to_end(&mut out).await.unwrap();
    out
}

/// Send raw bytes and read until `marker` shows up in the reply (or EOF).
pub async fn raw_exchange(addr: SocketAddr, request: &[u8], marker: &str) -> (TcpStream, String) {
    let mut stream = TcpStream::connect(addr).await.unwrap();
    stream.write_all(request).await.unwrap();

    let mut received = Vec::new();
    let mut chunk = [0u8; 1024];
    let read = async {
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            received.extend_from_slice(&chunk[..n]);
            if String::from_utf8_lossy(&received).contains(marker) {
                break;
            }
        }
    };
    tokio::time::timeout(Duration::from_secs(5), read)
        .await
        .expect("timed out waiting for reply");

    let text = String::from_utf8_lossy(&received).into_owned();
    (stream, text)
}
