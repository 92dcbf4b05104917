//! A minimal HTTP/1.1 server for fetcher tests.
//!
//! Every request, whatever its path, gets the current canned response. The
//! response can be swapped between requests to simulate a remote change.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

#[derive(Clone)]
struct Response {
    status: u16,
    body: Vec<u8>,
    delay: Duration,
}

struct Shared {
    response: Mutex<Response>,
    requests: AtomicUsize,
}

/// Serves a canned response on 127.0.0.1 until dropped.
pub struct TestServer {
    addr: SocketAddr,
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl TestServer {
    /// Start serving `body` with `status`. Must be called inside a tokio
    /// runtime.
    pub async fn start(status: u16, body: Vec<u8>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let shared = Arc::new(Shared {
            response: Mutex::new(Response {
                status,
                body,
                delay: Duration::ZERO,
            }),
            requests: AtomicUsize::new(0),
        });

        let task = tokio::spawn({
            let shared = Arc::clone(&shared);
            async move {
                loop {
                    let Ok((stream, _)) = listener.accept().await else {
                        break;
                    };
                    tokio::spawn(serve(stream, Arc::clone(&shared)));
                }
            }
        });

        Self { addr, shared, task }
    }

    /// Serve a zip archive with status 200.
    pub async fn serving(body: Vec<u8>) -> Self {
        Self::start(200, body).await
    }

    /// URL of `path` on this server.
    pub fn url(&self, path: &str) -> String {
        format!("http://{}/{}", self.addr, path.trim_start_matches('/'))
    }

    pub fn set_response(&self, status: u16, body: Vec<u8>) {
        let mut response = self.shared.response.lock().unwrap();
        response.status = status;
        response.body = body;
    }

    /// Hold every response back for `delay` before sending it.
    pub fn set_delay(&self, delay: Duration) {
        self.shared.response.lock().unwrap().delay = delay;
    }

    /// Number of requests received so far.
    pub fn requests(&self) -> usize {
        self.shared.requests.load(Ordering::SeqCst)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn serve(mut stream: TcpStream, shared: Arc<Shared>) {
    let mut request = Vec::new();
    let mut buf = [0u8; 1024];
    while !request.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut buf).await {
            Ok(0) | Err(_) => return,
            Ok(n) => request.extend_from_slice(&buf[..n]),
        }
    }
    shared.requests.fetch_add(1, Ordering::SeqCst);

    let response = shared.response.lock().unwrap().clone();
    if !response.delay.is_zero() {
        tokio::time::sleep(response.delay).await;
    }

    let head = format!(
        "HTTP/1.1 {} Test\r\nContent-Type: application/zip\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        response.status,
        response.body.len()
    );
    if stream.write_all(head.as_bytes()).await.is_err() {
        return;
    }
    let _ = stream.write_all(&response.body).await;
    let _ = stream.shutdown().await;
}
