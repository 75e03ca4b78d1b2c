//! `Engine` implementation over the Docker Engine HTTP API.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tokio::io::AsyncWriteExt;

use console_core::{
    ContextDescriptor, EndpointAddr, Engine, EngineDialer, EngineError, ProcessId, ProcessSpec,
    ProcessStream, TerminalSize,
};

use crate::http::{self, Head, Request};
use crate::transport::EngineStream;

/// Error payload shape returned by the engine.
#[derive(Deserialize)]
struct ApiError {
    message: String,
}

/// Response to a process-creation request.
#[derive(Deserialize)]
struct CreatedProcess {
    #[serde(rename = "Id")]
    id: String,
}

/// Engine client bound to one endpoint address.
///
/// Each request opens its own connection; attach hands that connection
/// over to the caller as the process byte stream.
pub struct DockerEngine {
    addr: EndpointAddr,
    host_header: String,
}

impl DockerEngine {
    /// Create a client for an endpoint address.
    #[must_use]
    pub fn new(addr: EndpointAddr) -> Self {
        let host_header = match &addr {
            EndpointAddr::Tcp { host, port } => format!("{host}:{port}"),
            EndpointAddr::Unix { .. } => "localhost".to_string(),
        };
        Self { addr, host_header }
    }

    /// The endpoint this client is bound to.
    #[must_use]
    pub fn addr(&self) -> &EndpointAddr {
        &self.addr
    }

    async fn send(
        &self,
        method: &str,
        path: &str,
        body: Option<&serde_json::Value>,
        upgrade: bool,
    ) -> Result<(EngineStream, Head), EngineError> {
        let mut stream = EngineStream::connect(&self.addr).await?;
        let encoded = body
            .map(serde_json::to_vec)
            .transpose()
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        http::write_request(
            &mut stream,
            &Request {
                method,
                path,
                host: &self.host_header,
                body: encoded.as_deref(),
                upgrade,
            },
        )
        .await?;
        let head = http::read_head(&mut stream).await?;
        Ok((stream, head))
    }

    /// Run a plain request to completion and check its status.
    async fn request(
        &self,
        method: &str,
        path: &str,
        body: Option<&serde_json::Value>,
    ) -> Result<Vec<u8>, EngineError> {
        let (mut stream, head) = self.send(method, path, body, false).await?;
        let body = http::read_body(&mut stream, &head).await?;
        check_status(&head, &body)?;
        Ok(body)
    }
}

fn error_message(body: &[u8]) -> String {
    serde_json::from_slice::<ApiError>(body)
        .map_or_else(|_| String::from_utf8_lossy(body).trim().to_string(), |e| e.message)
}

fn check_status(head: &Head, body: &[u8]) -> Result<(), EngineError> {
    match head.status {
        200..=299 => Ok(()),
        404 => Err(EngineError::NotFound(error_message(body))),
        400 => Err(EngineError::InvalidRequest(error_message(body))),
        status => Err(EngineError::Api {
            status,
            message: error_message(body),
        }),
    }
}

#[async_trait]
impl Engine for DockerEngine {
    async fn create_process(
        &self,
        container_id: &str,
        spec: &ProcessSpec,
    ) -> Result<ProcessId, EngineError> {
        let mut payload = json!({
            "AttachStdin": true,
            "AttachStdout": true,
            "AttachStderr": true,
            "Tty": spec.tty,
            "Cmd": spec.command,
        });
        if let Some(keys) = &spec.detach_keys {
            payload["DetachKeys"] = json!(keys);
        }
        let body = self
            .request("POST", &format!("/containers/{container_id}/exec"), Some(&payload))
            .await?;
        let created: CreatedProcess = serde_json::from_slice(&body)
            .map_err(|e| EngineError::Protocol(format!("bad exec-create response: {e}")))?;
        Ok(ProcessId(created.id))
    }

    async fn attach(&self, process: &ProcessId) -> Result<ProcessStream, EngineError> {
        let payload = json!({ "Detach": false, "Tty": true });
        let (mut stream, head) = self
            .send("POST", &format!("/exec/{process}/start"), Some(&payload), true)
            .await?;
        // 101 is the upgrade handshake; some engine versions answer 200
        // and stream on the same connection.
        if head.status != 101 && head.status != 200 {
            let body = http::read_body(&mut stream, &head).await.unwrap_or_default();
            check_status(&head, &body)?;
        }
        Ok(Box::new(stream))
    }

    async fn start(&self, process: &ProcessId) -> Result<(), EngineError> {
        let payload = json!({ "Detach": false, "Tty": true });
        let (mut stream, head) = self
            .send("POST", &format!("/exec/{process}/start"), Some(&payload), false)
            .await?;
        // 409 means the process is already running after attach.
        if head.status == 409 || (200..=299).contains(&head.status) {
            let _ = stream.shutdown().await;
            return Ok(());
        }
        let body = http::read_body(&mut stream, &head).await.unwrap_or_default();
        check_status(&head, &body)
    }

    async fn resize(&self, process: &ProcessId, size: TerminalSize) -> Result<(), EngineError> {
        self.request(
            "POST",
            &format!("/exec/{process}/resize?h={}&w={}", size.rows, size.cols),
            None,
        )
        .await?;
        Ok(())
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.request("GET", "/_ping", None).await?;
        Ok(())
    }
}

/// Opens `DockerEngine` connections for context descriptors.
///
/// The dial includes an initial liveness probe so a dead endpoint is
/// reported at handle-creation time rather than on first use.
pub struct DockerDialer;

#[async_trait]
impl EngineDialer for DockerDialer {
    async fn dial(&self, descriptor: &ContextDescriptor) -> Result<Arc<dyn Engine>, EngineError> {
        let addr = descriptor
            .address()
            .map_err(|e| EngineError::InvalidRequest(e.to_string()))?;
        let engine = DockerEngine::new(addr);
        engine.ping().await?;
        tracing::info!(context = %descriptor.name, addr = %engine.addr(), "engine connected");
        Ok(Arc::new(engine))
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// One-shot canned HTTP server; returns the bound address and the
    /// request head it captured.
    async fn canned_server(
        response: &'static [u8],
    ) -> (EndpointAddr, tokio::sync::oneshot::Receiver<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (tx, rx) = tokio::sync::oneshot::channel();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                socket.read_exact(&mut byte).await.unwrap();
                head.push(byte[0]);
            }
            let _ = tx.send(String::from_utf8_lossy(&head).to_string());
            socket.write_all(response).await.unwrap();
        });
        (
            EndpointAddr::Tcp {
                host: "127.0.0.1".to_string(),
                port,
            },
            rx,
        )
    }

    #[tokio::test]
    async fn ping_hits_the_liveness_endpoint() {
        let (addr, head_rx) =
            canned_server(b"HTTP/1.1 200 OK\r\nContent-Length: 2\r\n\r\nOK").await;
        DockerEngine::new(addr).ping().await.unwrap();
        let head = head_rx.await.unwrap();
        assert!(head.starts_with("GET /_ping HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn create_process_parses_the_exec_id() {
        let (addr, head_rx) = canned_server(
            b"HTTP/1.1 201 Created\r\nContent-Type: application/json\r\nContent-Length: 16\r\n\r\n{\"Id\": \"abc123\"}",
        )
        .await;
        let id = DockerEngine::new(addr)
            .create_process("cafe", &ProcessSpec::interactive_shell())
            .await
            .unwrap();
        assert_eq!(id, ProcessId("abc123".to_string()));
        let head = head_rx.await.unwrap();
        assert!(head.starts_with("POST /containers/cafe/exec HTTP/1.1\r\n"));
        assert!(head.contains("Content-Type: application/json\r\n"));
    }

    #[tokio::test]
    async fn missing_container_maps_to_not_found() {
        let (addr, _head_rx) = canned_server(
            b"HTTP/1.1 404 Not Found\r\nContent-Length: 35\r\n\r\n{\"message\": \"no such container: x\"}",
        )
        .await;
        let err = DockerEngine::new(addr)
            .create_process("x", &ProcessSpec::interactive_shell())
            .await
            .unwrap_err();
        match err {
            EngineError::NotFound(msg) => assert_eq!(msg, "no such container: x"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn attach_hands_back_the_hijacked_stream() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut head = Vec::new();
            let mut byte = [0u8; 1];
            while !head.ends_with(b"\r\n\r\n") {
                socket.read_exact(&mut byte).await.unwrap();
                head.push(byte[0]);
            }
            // Drain the request body before speaking raw bytes.
            let mut body = [0u8; 27];
            socket.read_exact(&mut body).await.unwrap();
            socket
                .write_all(b"HTTP/1.1 101 UPGRADED\r\nConnection: Upgrade\r\nUpgrade: tcp\r\n\r\n")
                .await
                .unwrap();
            socket.write_all(b"$ ").await.unwrap();
            // Echo one inbound keystroke back.
            let mut key = [0u8; 3];
            socket.read_exact(&mut key).await.unwrap();
            socket.write_all(&key).await.unwrap();
        });

        let engine = DockerEngine::new(EndpointAddr::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        });
        let mut stream = engine.attach(&ProcessId("abc".to_string())).await.unwrap();

        let mut prompt = [0u8; 2];
        stream.read_exact(&mut prompt).await.unwrap();
        assert_eq!(&prompt, b"$ ");

        stream.write_all(b"ls\n").await.unwrap();
        let mut echo = [0u8; 3];
        stream.read_exact(&mut echo).await.unwrap();
        assert_eq!(&echo, b"ls\n");
    }

    #[tokio::test]
    async fn start_tolerates_conflict_after_attach() {
        let (addr, _head_rx) = canned_server(
            b"HTTP/1.1 409 Conflict\r\nContent-Length: 38\r\n\r\n{\"message\": \"exec is already running\"}",
        )
        .await;
        DockerEngine::new(addr)
            .start(&ProcessId("abc".to_string()))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn resize_sends_rows_and_cols_as_query() {
        let (addr, head_rx) =
            canned_server(b"HTTP/1.1 201 Created\r\nContent-Length: 0\r\n\r\n").await;
        DockerEngine::new(addr)
            .resize(&ProcessId("abc".to_string()), TerminalSize { rows: 40, cols: 120 })
            .await
            .unwrap();
        let head = head_rx.await.unwrap();
        assert!(head.starts_with("POST /exec/abc/resize?h=40&w=120 HTTP/1.1\r\n"));
    }

    #[tokio::test]
    async fn refused_connection_maps_to_unreachable() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let err = DockerEngine::new(EndpointAddr::Tcp {
            host: "127.0.0.1".to_string(),
            port,
        })
        .ping()
        .await
        .unwrap_err();
        assert!(matches!(err, EngineError::Unreachable(_)));
    }
}
