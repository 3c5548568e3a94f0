//! UDP plane: owns the control and timing server sockets, answers
//! timing probes, and raises resend requests to the scheduler.
//!
//! Holds long-lived sockets behind `Arc` and drains each on a dedicated
//! task per direction: two independent listener loops (timing vs.
//! control), plus a linear probe to find a free port pair to bind.

use std::collections::HashSet;
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;

use crate::clock::NtpTimestamp;
use crate::config::{DEFAULT_CONTROL_PORT, DEFAULT_TIMING_PORT};
use crate::error::{AirTunesError, Result};
use crate::protocol::rtp::{ResendRequest, SyncPacket, TimingRequest, TimingResponse};
use crate::seq;

const TIMING_TARGET: &str = "raop::timing";
const CONTROL_TARGET: &str = "raop::control";

/// A receiver's address as far as sync-packet fan-out cares.
#[derive(Debug, Clone, Copy)]
pub struct SyncTarget {
    /// Receiver IPv4 address.
    pub address: Ipv4Addr,
    /// Receiver's negotiated control port.
    pub control_port: u16,
}

/// Raised by the UDP plane when a receiver reports a missing audio packet.
#[async_trait]
pub trait UdpEvents: Send + Sync {
    /// `source` is missing `count` packets starting at `missed_seq`.
    async fn need_resend(&self, missed_seq: u16, count: u16, source: Ipv4Addr);
}

/// Bind a UDP socket starting at `start`, probing upward through the valid
/// port range until one succeeds. A finite search with early exit, per the
/// design note on "generators/lazy loops".
async fn bind_from(start: u16) -> Result<(UdpSocket, u16)> {
    for port in start..=u16::MAX {
        let addr = SocketAddrV4::new(Ipv4Addr::UNSPECIFIED, port);
        if let Ok(socket) = UdpSocket::bind(addr).await {
            return Ok((socket, port));
        }
    }
    Err(AirTunesError::NetworkError(std::io::Error::new(
        std::io::ErrorKind::AddrInUse,
        "no free UDP port available from the requested base",
    )))
}

/// Owns the two server-side UDP sockets for one playback group.
pub struct UdpPlane {
    control_socket: Arc<UdpSocket>,
    control_port: u16,
    timing_port: u16,
    known_sources: Arc<RwLock<HashSet<Ipv4Addr>>>,
    timing_task: JoinHandle<()>,
    control_task: JoinHandle<()>,
}

impl UdpPlane {
    /// Bind both sockets (probing from the default ports) and start both
    /// listener tasks. `events` receives `need_resend` callbacks from the
    /// control listener.
    ///
    /// # Errors
    /// [`AirTunesError::NetworkError`] if no free port is found for either
    /// socket.
    pub async fn open(events: Arc<dyn UdpEvents>) -> Result<Self> {
        let (control_socket, control_port) = bind_from(DEFAULT_CONTROL_PORT).await?;
        let (timing_socket, timing_port) = bind_from(DEFAULT_TIMING_PORT).await?;
        let control_socket = Arc::new(control_socket);
        let timing_socket = Arc::new(timing_socket);
        let known_sources: Arc<RwLock<HashSet<Ipv4Addr>>> = Arc::new(RwLock::new(HashSet::new()));

        let timing_task = tokio::spawn(Self::run_timing_listener(timing_socket, known_sources.clone()));
        let control_task =
            tokio::spawn(Self::run_control_listener(control_socket.clone(), known_sources.clone(), events));

        Ok(Self { control_socket, control_port, timing_port, known_sources, timing_task, control_task })
    }

    /// The local control port this plane bound.
    #[must_use]
    pub fn control_port(&self) -> u16 {
        self.control_port
    }

    /// The local timing port this plane bound.
    #[must_use]
    pub fn timing_port(&self) -> u16 {
        self.timing_port
    }

    /// Start accepting timing probes and resend requests from `address`.
    pub async fn register(&self, address: Ipv4Addr) {
        self.known_sources.write().await.insert(address);
    }

    /// Stop accepting packets from `address` (called on `remove_receiver`).
    pub async fn unregister(&self, address: Ipv4Addr) {
        self.known_sources.write().await.remove(&address);
    }

    async fn run_timing_listener(socket: Arc<UdpSocket>, known: Arc<RwLock<HashSet<Ipv4Addr>>>) {
        let mut buf = [0u8; 128];
        loop {
            let (n, src) = match socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(error) => {
                    tracing::debug!(target: TIMING_TARGET, %error, "timing socket closed, listener exiting");
                    return;
                }
            };
            let SocketAddr::V4(src_v4) = src else { continue };
            if !known.read().await.contains(src_v4.ip()) {
                continue;
            }
            let request = match TimingRequest::decode(&buf[..n]) {
                Ok(request) => request,
                Err(error) => {
                    tracing::warn!(target: TIMING_TARGET, %error, "dropping malformed timing packet");
                    continue;
                }
            };
            let response = TimingResponse::answer(&request);
            if let Err(error) = socket.send_to(&response.encode(), src).await {
                tracing::warn!(target: TIMING_TARGET, %error, peer = %src, "failed to send timing response");
            }
        }
    }

    async fn run_control_listener(
        socket: Arc<UdpSocket>,
        known: Arc<RwLock<HashSet<Ipv4Addr>>>,
        events: Arc<dyn UdpEvents>,
    ) {
        let mut buf = [0u8; 1024];
        loop {
            let (n, src) = match socket.recv_from(&mut buf).await {
                Ok(pair) => pair,
                Err(error) => {
                    tracing::debug!(target: CONTROL_TARGET, %error, "control socket closed, listener exiting");
                    return;
                }
            };
            let SocketAddr::V4(src_v4) = src else { continue };
            if !known.read().await.contains(src_v4.ip()) {
                continue;
            }
            match ResendRequest::decode(&buf[..n]) {
                Ok(request) => events.need_resend(request.missed_seq, request.count, *src_v4.ip()).await,
                Err(error) => tracing::warn!(target: CONTROL_TARGET, %error, "dropping unrecognized control packet"),
            }
        }
    }

    /// Build one sync packet sharing a single NTP timestamp and send it to
    /// every target's control port. `seq` is the scheduler's full
    /// (unwrapped) sequence counter; the packet body derives its timestamp
    /// fields from it directly (the sync packet carries no 16-bit sequence
    /// field of its own — the sync packet's 16-bit slot is fixed at
    /// `0x0007`).
    pub async fn send_control_sync(&self, seq: u32, is_first: bool, targets: &[SyncTarget]) {
        let packet = SyncPacket {
            is_first,
            now_minus_latency: seq::rtp_ts_without_latency(seq),
            ntp_time: NtpTimestamp::now(),
            now: seq::rtp_ts(seq),
        };
        let bytes = packet.encode();
        for target in targets {
            let addr = SocketAddr::V4(SocketAddrV4::new(target.address, target.control_port));
            if let Err(error) = self.control_socket.send_to(&bytes, addr).await {
                tracing::warn!(target: CONTROL_TARGET, receiver = %target.address, %error, "sync send failed");
            }
        }
    }
}

impl Drop for UdpPlane {
    fn drop(&mut self) {
        self.timing_task.abort();
        self.control_task.abort();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::time::{Duration, sleep};

    struct RecordingEvents {
        missed: Arc<RwLock<Vec<(u16, u16, Ipv4Addr)>>>,
    }

    #[async_trait]
    impl UdpEvents for RecordingEvents {
        async fn need_resend(&self, missed_seq: u16, count: u16, source: Ipv4Addr) {
            self.missed.write().await.push((missed_seq, count, source));
        }
    }

    #[tokio::test]
    async fn binds_distinct_control_and_timing_ports() {
        let events = Arc::new(RecordingEvents { missed: Arc::new(RwLock::new(Vec::new())) });
        let plane = UdpPlane::open(events).await.unwrap();
        assert_ne!(plane.control_port(), plane.timing_port());
    }

    #[tokio::test]
    async fn timing_probe_from_unregistered_source_is_ignored() {
        let events = Arc::new(RecordingEvents { missed: Arc::new(RwLock::new(Vec::new())) });
        let plane = UdpPlane::open(events).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        let request = TimingRequest { send_time: NtpTimestamp { sec: 42, frac: 0x8000_0000 } };
        let mut buf = [0u8; 32];
        buf[1] = 0xD2;
        buf[24..32].copy_from_slice(&request.send_time.encode());
        client.send_to(&buf, ("127.0.0.1", plane.timing_port())).await.unwrap();

        let mut reply = [0u8; 64];
        let result = tokio::time::timeout(Duration::from_millis(100), client.recv_from(&mut reply)).await;
        assert!(result.is_err(), "unregistered source should not receive a timing response");
    }

    #[tokio::test]
    async fn timing_probe_from_registered_source_gets_answered() {
        let events = Arc::new(RecordingEvents { missed: Arc::new(RwLock::new(Vec::new())) });
        let plane = UdpPlane::open(events).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        plane.register(client.local_addr().unwrap().ip().to_string().parse().unwrap()).await;

        let send_time = NtpTimestamp { sec: 42, frac: 0x8000_0000 };
        let mut buf = [0u8; 32];
        buf[1] = 0xD2;
        buf[24..32].copy_from_slice(&send_time.encode());
        client.send_to(&buf, ("127.0.0.1", plane.timing_port())).await.unwrap();

        let mut reply = [0u8; 64];
        let (_n, _) = tokio::time::timeout(Duration::from_secs(1), client.recv_from(&mut reply)).await.unwrap().unwrap();
        assert_eq!(reply[1], 0xD3);
        let response_ref = NtpTimestamp::decode(&reply[8..16].try_into().unwrap());
        assert_eq!(response_ref, send_time);
    }

    #[tokio::test]
    async fn control_listener_raises_need_resend_for_registered_source() {
        let missed = Arc::new(RwLock::new(Vec::new()));
        let events = Arc::new(RecordingEvents { missed: missed.clone() });
        let plane = UdpPlane::open(events).await.unwrap();

        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();
        plane.register(client.local_addr().unwrap().ip().to_string().parse().unwrap()).await;

        let mut buf = [0u8; 8];
        buf[1] = 0x55;
        buf[4..6].copy_from_slice(&1050u16.to_be_bytes());
        buf[6..8].copy_from_slice(&1u16.to_be_bytes());
        client.send_to(&buf, ("127.0.0.1", plane.control_port())).await.unwrap();

        for _ in 0..50 {
            if !missed.read().await.is_empty() {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
        let recorded = missed.read().await;
        assert_eq!(recorded.as_slice(), &[(1050, 1, Ipv4Addr::new(127, 0, 0, 1))]);
    }
}
