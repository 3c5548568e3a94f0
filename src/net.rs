//! RTSP connection: TCP framing, asynchronous response queue, and
//! request/response pairing with a timeout.
//!
//! Drives a TCP socket by writing the request, then reading off the socket
//! through a sans-IO codec until a full response has been buffered. The
//! read side runs on its own task so `send_request` and `get_response` can
//! be called independently, with responses queued FIFO in between.

use std::net::SocketAddr;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::DEFAULT_RTSP_TIMEOUT;
use crate::error::{AirTunesError, Result};
use crate::protocol::rtsp::{RtspCodec, RtspRequest, RtspResponse};

const RTSP_TARGET: &str = "raop::rtsp";

/// An open TCP connection to one receiver's RTSP port.
///
/// `send_request` and `get_response` are independent: the reader task keeps
/// draining the socket into a response queue regardless of whether anyone is
/// currently waiting on `get_response`, so a slow caller cannot stall the
/// parser.
pub struct RtspConnection {
    write_half: OwnedWriteHalf,
    responses: mpsc::UnboundedReceiver<std::io::Result<RtspResponse>>,
    reader_task: JoinHandle<()>,
}

impl RtspConnection {
    /// Open a TCP connection to `addr` and start the background reader.
    ///
    /// # Errors
    /// Returns [`AirTunesError::NetworkError`] if the connection cannot be
    /// established.
    pub async fn open(addr: SocketAddr) -> Result<Self> {
        let stream = TcpStream::connect(addr).await?;
        stream.set_nodelay(true).ok();
        let (mut read_half, write_half) = stream.into_split();

        let (tx, rx) = mpsc::unbounded_channel();
        let reader_task = tokio::spawn(async move {
            let mut codec = RtspCodec::new();
            let mut buf = [0u8; 4096];
            loop {
                let n = match read_half.read(&mut buf).await {
                    Ok(0) => break,
                    Ok(n) => n,
                    Err(e) => {
                        let _ = tx.send(Err(e));
                        break;
                    }
                };
                if let Err(e) = codec.feed(&buf[..n]) {
                    tracing::warn!(target: RTSP_TARGET, error = %e, "malformed RTSP response");
                    let _ = tx.send(Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())));
                    break;
                }
                loop {
                    match codec.decode() {
                        Ok(Some(response)) => {
                            if tx.send(Ok(response)).is_err() {
                                return;
                            }
                        }
                        Ok(None) => break,
                        Err(e) => {
                            let _ = tx.send(Err(std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())));
                            return;
                        }
                    }
                }
            }
        });

        Ok(Self { write_half, responses: rx, reader_task })
    }

    /// Write a request's encoded bytes to the socket.
    ///
    /// # Errors
    /// Returns [`AirTunesError::NetworkError`] on a write failure.
    pub async fn send_request(&mut self, request: &RtspRequest) -> Result<()> {
        tracing::debug!(target: RTSP_TARGET, method = request.method.as_str(), uri = %request.uri, "sending RTSP request");
        self.write_half.write_all(&request.encode()).await?;
        self.write_half.flush().await?;
        Ok(())
    }

    /// Wait for the next queued response, up to `timeout`.
    ///
    /// # Errors
    /// Returns [`AirTunesError::Timeout`] if nothing arrives in time, or
    /// [`AirTunesError::NetworkError`] if the connection closed or the
    /// response was malformed.
    pub async fn get_response(&mut self, timeout: Duration) -> Result<RtspResponse> {
        match tokio::time::timeout(timeout, self.responses.recv()).await {
            Ok(Some(Ok(response))) => Ok(response),
            Ok(Some(Err(e))) => Err(AirTunesError::NetworkError(e)),
            Ok(None) => Err(AirTunesError::NetworkError(std::io::Error::new(
                std::io::ErrorKind::ConnectionAborted,
                "RTSP connection closed",
            ))),
            Err(_) => Err(AirTunesError::Timeout { duration_ms: timeout.as_millis() as u64 }),
        }
    }

    /// Wait for a response using [`DEFAULT_RTSP_TIMEOUT`].
    ///
    /// # Errors
    /// See [`Self::get_response`].
    pub async fn get_response_default(&mut self) -> Result<RtspResponse> {
        self.get_response(DEFAULT_RTSP_TIMEOUT).await
    }

    /// Close the connection: abort the reader task and drop the socket half.
    pub async fn close(mut self) {
        self.reader_task.abort();
        let _ = self.write_half.shutdown().await;
    }
}

impl Drop for RtspConnection {
    fn drop(&mut self) {
        self.reader_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::rtsp::Method;
    use tokio::io::AsyncReadExt as _;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn round_trips_a_simple_response() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut sock, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let n = sock.read(&mut buf).await.unwrap();
            assert!(String::from_utf8_lossy(&buf[..n]).starts_with("OPTIONS"));
            sock.write_all(b"RTSP/1.0 200 OK\r\nCSeq: 1\r\n\r\n").await.unwrap();
        });

        let mut conn = RtspConnection::open(addr).await.unwrap();
        let req = RtspRequest::builder(Method::Options, "*").cseq(1).build();
        conn.send_request(&req).await.unwrap();
        let resp = conn.get_response(Duration::from_secs(1)).await.unwrap();
        assert!(resp.is_success());

        server.await.unwrap();
    }

    #[tokio::test]
    async fn get_response_times_out_with_no_data() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let _server = tokio::spawn(async move {
            let (_sock, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let mut conn = RtspConnection::open(addr).await.unwrap();
        let result = conn.get_response(Duration::from_millis(50)).await;
        assert!(matches!(result, Err(AirTunesError::Timeout { .. })));
    }
}
