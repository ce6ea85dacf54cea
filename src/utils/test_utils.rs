use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;

use crate::api::{AiProvider, Message, Role};

/// A request as seen by [`serve_once`].
#[derive(Debug, Clone)]
pub struct CapturedRequest {
    pub method: String,
    pub path: String,
    pub headers: Vec<(String, String)>,
    pub body: Vec<u8>,
}

impl CapturedRequest {
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    pub fn body_text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// Canned response. Body chunks are written with a short pause between
/// them so the client sees them as separate reads.
#[derive(Debug, Clone)]
pub struct TestReply {
    pub status: &'static str,
    pub content_type: &'static str,
    pub chunks: Vec<Vec<u8>>,
}

impl TestReply {
    pub fn event_stream(chunks: &[&str]) -> Self {
        Self {
            status: "200 OK",
            content_type: "text/event-stream",
            chunks: chunks.iter().map(|c| c.as_bytes().to_vec()).collect(),
        }
    }

    pub fn json(status: &'static str, body: &str) -> Self {
        Self {
            status,
            content_type: "application/json",
            chunks: vec![body.as_bytes().to_vec()],
        }
    }
}

/// Accept exactly one HTTP/1.1 request on a loopback port and answer it.
///
/// Returns the base URL (with an `/api` suffix) and a handle resolving to
/// the captured request.
pub async fn serve_once(reply: TestReply) -> (String, JoinHandle<CapturedRequest>) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    let handle = tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let request = read_request(&mut stream).await;
        write_reply(&mut stream, &reply).await;
        request
    });

    (format!("http://{addr}/api"), handle)
}

async fn read_request(stream: &mut TcpStream) -> CapturedRequest {
    let mut data = Vec::new();
    let mut buf = [0_u8; 4096];

    let header_end = loop {
        let read = stream.read(&mut buf).await.unwrap();
        assert!(read > 0, "client closed before sending headers");
        data.extend_from_slice(&buf[..read]);
        if let Some(pos) = data.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
    };

    let head = String::from_utf8_lossy(&data[..header_end]).into_owned();
    let mut lines = head.split("\r\n");
    let request_line = lines.next().unwrap_or_default();
    let mut parts = request_line.split_whitespace();
    let method = parts.next().unwrap_or_default().to_string();
    let path = parts.next().unwrap_or_default().to_string();

    let headers: Vec<(String, String)> = lines
        .filter_map(|line| line.split_once(':'))
        .map(|(k, v)| (k.trim().to_ascii_lowercase(), v.trim().to_string()))
        .collect();

    let content_length = headers
        .iter()
        .find(|(k, _)| k == "content-length")
        .and_then(|(_, v)| v.parse::<usize>().ok())
        .unwrap_or(0);

    let mut body = data[header_end + 4..].to_vec();
    while body.len() < content_length {
        let read = stream.read(&mut buf).await.unwrap();
        if read == 0 {
            break;
        }
        body.extend_from_slice(&buf[..read]);
    }

    CapturedRequest {
        method,
        path,
        headers,
        body,
    }
}

async fn write_reply(stream: &mut TcpStream, reply: &TestReply) {
    // No content-length: the body ends when the connection closes.
    let head = format!(
        "HTTP/1.1 {}\r\nContent-Type: {}\r\nConnection: close\r\n\r\n",
        reply.status, reply.content_type
    );
    stream.write_all(head.as_bytes()).await.unwrap();
    stream.flush().await.unwrap();

    for chunk in &reply.chunks {
        stream.write_all(chunk).await.unwrap();
        stream.flush().await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    let _ = stream.shutdown().await;
}

pub fn create_test_message(role: Role, content: &str) -> Message {
    Message {
        role,
        content: content.to_string(),
        provider: match role {
            Role::Assistant => Some(AiProvider::Gemini),
            Role::User => None,
        },
        files: None,
        created_at: "2024-05-01T12:00:00.000Z".to_string(),
        is_error: None,
    }
}

pub fn create_test_messages(count: usize) -> Vec<Message> {
    (0..count)
        .map(|i| {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            create_test_message(role, &format!("message {i}"))
        })
        .collect()
}
