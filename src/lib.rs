//! # airtunes-sender
//!
//! A pure Rust sender for Apple's AirTunes v2 (RAOP) audio streaming
//! protocol: discover receivers, bring each through an authenticated RTSP
//! handshake, and feed them a continuous, synchronized flow of ALAC audio
//! over RTP/UDP.
//!
//! ## Example
//!
//! ```rust,no_run
//! use airtunes_sender::{Group, Receiver};
//! use std::net::Ipv4Addr;
//!
//! # async fn example() -> airtunes_sender::Result<()> {
//! let group = Group::new(None);
//! let receiver = Receiver::new("AABBCCDDEEFF@Kitchen", Ipv4Addr::new(192, 168, 1, 42), 5000);
//! group.add_receiver(receiver, "192.168.1.10", None, None).await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Sample-rate, port, and latency constants fixed by the protocol.
pub mod config;
/// NTP timestamp capture and conversion.
pub mod clock;
/// Error types.
pub mod error;
/// RTP sequence number and timestamp arithmetic.
pub mod seq;

/// Receiver data model: identity, capabilities, handshake state.
pub mod receiver;
/// PCM frame source trait and an in-memory implementation.
pub mod provider;
/// ALAC encoder wrapper.
pub mod alac;

/// Wire-format protocol building blocks (RTSP, RTP, SDP, plist, crypto,
/// DAAP, RAOP-specific framing).
pub mod protocol;

/// TCP transport for one receiver's RTSP connection.
pub mod net;
/// RTSP client: the authenticated handshake state machine.
pub mod client;
/// UDP plane: timing and control sockets shared by every receiver.
pub mod udp;
/// Audio packet scheduler: pacing, sequencing, pause/resume/seek.
pub mod scheduler;
/// Group controller: binds one scheduler to N RTSP receivers.
pub mod group;

/// Receiver discovery via mDNS (collaborator, optional).
pub mod discovery;

pub use client::RaopClient;
pub use error::{AirTunesError, Result};
pub use group::{Group, GroupEvents, GroupStatus};
pub use provider::{InMemoryPcmProvider, PcmFrame, PcmProvider};
pub use receiver::{Capabilities, CodecSupport, Credentials, EncryptionSupport, Receiver};

// Discovery functions
pub use discovery::scan;
