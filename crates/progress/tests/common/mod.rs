//! Loopback servers shared by the integration tests.
//!
//! [`spawn_backend`] listens on an ephemeral port and serves both halves
//! of the backend: requests whose path starts with `/ws/` are upgraded to
//! a WebSocket and handed to a per-connection handler; anything else gets
//! one canned HTTP response.

#![allow(dead_code)]

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures::{SinkExt, StreamExt};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::handshake::server::{Request, Response};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

pub type ServerSocket = WebSocketStream<TcpStream>;

/// Canned reply for plain HTTP requests.
#[derive(Clone)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn json(status: u16, body: &str) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }
}

/// What the backend saw.
#[derive(Default)]
pub struct Recorded {
    /// Number of WebSocket connections accepted.
    pub ws_connections: AtomicUsize,
    /// Number of plain HTTP requests served.
    pub http_requests: AtomicUsize,
    /// Request paths of WebSocket upgrades, in order.
    pub ws_paths: Mutex<Vec<String>>,
    /// Raw text of HTTP requests (headers and body), in order.
    pub http_raw: Mutex<Vec<String>>,
}

impl Recorded {
    pub fn ws_count(&self) -> usize {
        self.ws_connections.load(Ordering::SeqCst)
    }

    pub fn http_count(&self) -> usize {
        self.http_requests.load(Ordering::SeqCst)
    }

    pub fn ws_paths(&self) -> Vec<String> {
        self.ws_paths.lock().unwrap().clone()
    }

    pub fn http_raw(&self) -> Vec<String> {
        self.http_raw.lock().unwrap().clone()
    }
}

/// Start a backend. `on_socket` gets the zero-based connection index.
pub async fn spawn_backend<F, Fut>(http: Option<HttpReply>, on_socket: F) -> (String, Arc<Recorded>)
where
    F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    serve_on(listener, http, on_socket)
}

/// Serve on an already bound listener.
pub fn serve_on<F, Fut>(
    listener: TcpListener,
    http: Option<HttpReply>,
    on_socket: F,
) -> (String, Arc<Recorded>)
where
    F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let addr = listener.local_addr().unwrap();
    let recorded = Arc::new(Recorded::default());
    let on_socket = Arc::new(on_socket);

    let rec = Arc::clone(&recorded);
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            let rec = Arc::clone(&rec);
            let on_socket = Arc::clone(&on_socket);
            let http = http.clone();
            tokio::spawn(async move {
                if is_websocket(&stream).await {
                    let mut path = String::new();
                    let callback = |req: &Request, resp: Response| {
                        path = req.uri().path().to_string();
                        Ok(resp)
                    };
                    let Ok(ws) = tokio_tungstenite::accept_hdr_async(stream, callback).await else {
                        return;
                    };
                    rec.ws_paths.lock().unwrap().push(path);
                    let index = rec.ws_connections.fetch_add(1, Ordering::SeqCst);
                    on_socket(index, ws).await;
                } else if let Some(reply) = http {
                    serve_http(stream, &rec, &reply).await;
                }
            });
        }
    });

    (format!("http://{addr}"), recorded)
}

/// A backend that only speaks WebSocket.
pub async fn spawn_ws<F, Fut>(on_socket: F) -> (String, Arc<Recorded>)
where
    F: Fn(usize, ServerSocket) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    spawn_backend(None, on_socket).await
}

/// A backend that only answers HTTP.
pub async fn spawn_http(reply: HttpReply) -> (String, Arc<Recorded>) {
    spawn_backend(Some(reply), |_, _| async {}).await
}

async fn is_websocket(stream: &TcpStream) -> bool {
    let mut buf = [0u8; 8];
    for _ in 0..50 {
        match stream.peek(&mut buf).await {
            Ok(n) if n >= buf.len() => return &buf == b"GET /ws/",
            Ok(0) | Err(_) => return false,
            Ok(_) => tokio::time::sleep(Duration::from_millis(5)).await,
        }
    }
    false
}

async fn serve_http(mut stream: TcpStream, rec: &Recorded, reply: &HttpReply) {
    let raw = read_request(&mut stream).await;
    rec.http_raw.lock().unwrap().push(raw);
    rec.http_requests.fetch_add(1, Ordering::SeqCst);

    let response = format!(
        "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        reply.status,
        reply.body.len(),
        reply.body
    );
    let _ = stream.write_all(response.as_bytes()).await;
    let _ = stream.shutdown().await;
}

/// Read one request: headers, then a sized or chunked body.
async fn read_request(stream: &mut TcpStream) -> String {
    let mut data = Vec::new();
    let mut buf = [0u8; 8192];

    let header_end = loop {
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            return String::from_utf8_lossy(&data).into_owned();
        }
        data.extend_from_slice(&buf[..n]);
        if let Some(pos) = find(&data, b"\r\n\r\n") {
            break pos + 4;
        }
    };

    let headers = String::from_utf8_lossy(&data[..header_end]).to_ascii_lowercase();
    let content_length = headers
        .lines()
        .find_map(|line| line.strip_prefix("content-length:"))
        .and_then(|v| v.trim().parse::<usize>().ok());
    let chunked = headers.contains("transfer-encoding: chunked");

    loop {
        let body = &data[header_end..];
        let done = match content_length {
            Some(len) => body.len() >= len,
            None if chunked => body.ends_with(b"0\r\n\r\n"),
            None => true,
        };
        if done {
            break;
        }
        let n = stream.read(&mut buf).await.unwrap_or(0);
        if n == 0 {
            break;
        }
        data.extend_from_slice(&buf[..n]);
    }

    String::from_utf8_lossy(&data).into_owned()
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

// ---------------------------------------------------------------------------
// Socket helpers
// ---------------------------------------------------------------------------

pub async fn send_text(ws: &mut ServerSocket, text: &str) {
    ws.send(Message::Text(text.to_string())).await.unwrap();
}

/// Read until the client goes away.
pub async fn drain(ws: &mut ServerSocket) {
    while let Some(Ok(_)) = ws.next().await {}
}

/// Collect text frames received within `window`.
pub async fn collect_text(ws: &mut ServerSocket, window: Duration) -> Vec<String> {
    let mut frames = Vec::new();
    let deadline = tokio::time::Instant::now() + window;
    loop {
        match tokio::time::timeout_at(deadline, ws.next()).await {
            Ok(Some(Ok(Message::Text(text)))) => frames.push(text),
            Ok(Some(Ok(_))) => {}
            _ => break,
        }
    }
    frames
}

pub const EXTRACTING: &str = r#"{"type":"progress_update","data":{"stage":"extracting","percentage":40,"message":"Extracting CV data..."}}"#;
pub const RENDERING: &str = r#"{"type":"progress_update","data":{"stage":"rendering","percentage":80,"message":"Rendering CV..."}}"#;
pub const COMPLETED: &str = r#"{"type":"job_completed","data":{"result":{"pdf_path":"/x.pdf"}}}"#;
pub const KEEPALIVE: &str = r#"{"type":"keepalive"}"#;
