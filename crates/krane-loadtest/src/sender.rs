//! Observation requests against the release target.

use std::time::Duration;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{LoadTestError, LoadTestResult};

/// Path and query of the fixed observation request.
pub const OBSERVE_PATH: &str = "/observe?metric=hits&value=1";
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Sends one observation request.
#[async_trait]
pub trait RequestSender: Send + Sync {
    async fn send(&self) -> LoadTestResult<()>;
}

/// HTTP/1 sender over a fresh connection per request.
#[derive(Debug, Clone)]
pub struct HyperSender {
    address: String,
    timeout: Duration,
}

impl HyperSender {
    /// `target` is `host` or `host:port`; port 80 is assumed when absent.
    pub fn new(target: &str) -> Self {
        let address = if target.contains(':') {
            target.to_string()
        } else {
            format!("{target}:80")
        };
        Self {
            address,
            timeout: REQUEST_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn post(&self) -> LoadTestResult<()> {
        let uri = format!("http://{}{OBSERVE_PATH}", self.address);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| LoadTestError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| LoadTestError::Connect {
                address: self.address.clone(),
                reason: e.to_string(),
            })?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("POST")
            .uri(&uri)
            .header("host", &self.address)
            .header("user-agent", "krane-loadtest/0.1")
            .body(http_body_util::Empty::<bytes::Bytes>::new())
            .map_err(|e| LoadTestError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| LoadTestError::Request(e.to_string()))?;

        if resp.status().is_success() {
            Ok(())
        } else {
            debug!(status = %resp.status(), %uri, "observation rejected");
            Err(LoadTestError::Status(resp.status().as_u16()))
        }
    }
}

#[async_trait]
impl RequestSender for HyperSender {
    async fn send(&self) -> LoadTestResult<()> {
        match tokio::time::timeout(self.timeout, self.post()).await {
            Ok(result) => result,
            Err(_) => Err(LoadTestError::Timeout),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    use super::*;

    /// Accept one connection, capture the request head, answer `status_line`.
    async fn one_shot_server(status_line: &'static str) -> (String, tokio::task::JoinHandle<String>) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        let handle = tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut buf = vec![0u8; 2048];
            let n = socket.read(&mut buf).await.unwrap();
            let response = format!("{status_line}\r\ncontent-length: 0\r\n\r\n");
            socket.write_all(response.as_bytes()).await.unwrap();
            String::from_utf8_lossy(&buf[..n]).to_string()
        });
        (addr, handle)
    }

    #[test]
    fn default_port() {
        assert_eq!(HyperSender::new("api-release").address(), "api-release:80");
        assert_eq!(HyperSender::new("127.0.0.1:8080").address(), "127.0.0.1:8080");
    }

    #[tokio::test]
    async fn posts_observation() {
        let (addr, server) = one_shot_server("HTTP/1.1 204 No Content").await;
        HyperSender::new(&addr).send().await.unwrap();

        let head = server.await.unwrap();
        assert!(head.starts_with("POST /observe?metric=hits&value=1 HTTP/1.1"));
    }

    #[tokio::test]
    async fn non_success_status_is_an_error() {
        let (addr, _server) = one_shot_server("HTTP/1.1 503 Service Unavailable").await;
        let err = HyperSender::new(&addr).send().await.unwrap_err();
        assert!(matches!(err, LoadTestError::Status(503)));
    }

    #[tokio::test]
    async fn closed_port_is_a_connect_error() {
        let err = HyperSender::new("127.0.0.1:1")
            .with_timeout(Duration::from_millis(500))
            .send()
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            LoadTestError::Connect { .. } | LoadTestError::Timeout
        ));
    }
}
