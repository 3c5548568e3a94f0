//! Group controller: the public API. Binds one scheduler and one
//! UDP plane to a set of RTSP clients, opening/closing the shared
//! sockets as the set transitions to/from empty and wiring the callbacks
//! that let the scheduler and UDP plane reach back into the receiver set
//! without holding a strong reference to it.
//!
//! The receiver set is an `RwLock<Vec<_>>` snapshotted before any
//! iteration that also allows concurrent mutation. [`GroupCallbacks`]
//! holds only a [`Weak`] pointer back to the shared state, so
//! `Group → scheduler/UDP → Group` never forms an `Arc` cycle.

use std::net::Ipv4Addr;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::{Mutex as AsyncMutex, RwLock};

use crate::client::RaopClient;
use crate::error::{AirTunesError, Result};
use crate::protocol::daap::{Artwork, TrackMetadata};
use crate::provider::PcmProvider;
use crate::receiver::{Credentials, Receiver};
use crate::scheduler::{AudioScheduler, AudioTarget, SchedulerEvents};
use crate::seq;
use crate::udp::{SyncTarget, UdpEvents, UdpPlane};

const GROUP_TARGET: &str = "raop::group";

/// Lifecycle status of a [`Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupStatus {
    /// No track loaded, or a track finished/was stopped.
    Stopped,
    /// Streaming.
    Playing,
    /// Streaming suspended; scheduler state retained for `resume`.
    Paused,
    /// Terminal; every method after this returns [`AirTunesError::GroupClosed`].
    Closed,
}

/// Lifecycle notifications a caller can subscribe to. Every method has a
/// no-op default so callers only override what they need.
#[async_trait]
pub trait GroupEvents: Send + Sync {
    /// Playback started or resumed at `current_ms`.
    async fn on_play(&self, _current_ms: u64) {}
    /// Playback paused at `current_ms`.
    async fn on_pause(&self, _current_ms: u64) {}
    /// Playback stopped at `current_ms`.
    async fn on_stop(&self, _current_ms: u64) {}
    /// A receiver's RTSP connection was closed (terminal error or TEARDOWN).
    async fn connection_closed(&self, _receiver_id: &str, _reason: &str) {}
}

struct NoopGroupEvents;

#[async_trait]
impl GroupEvents for NoopGroupEvents {
    async fn on_play(&self, _current_ms: u64) {}
    async fn on_pause(&self, _current_ms: u64) {}
    async fn on_stop(&self, _current_ms: u64) {}
    async fn connection_closed(&self, _receiver_id: &str, _reason: &str) {}
}

struct ReceiverEntry {
    id: String,
    address: Ipv4Addr,
    client: Arc<AsyncMutex<RaopClient>>,
}

struct RuntimeHandles {
    scheduler: Arc<AudioScheduler>,
    udp: Arc<UdpPlane>,
}

/// State shared between [`Group`] and the [`GroupCallbacks`] sink the
/// scheduler/UDP plane hold a weak reference to.
struct GroupShared {
    receivers: RwLock<Vec<ReceiverEntry>>,
    status: RwLock<GroupStatus>,
    runtime: RwLock<Option<RuntimeHandles>>,
    events: Arc<dyn GroupEvents>,
}

impl GroupShared {
    async fn snapshot(&self) -> Vec<(String, Ipv4Addr, Arc<AsyncMutex<RaopClient>>)> {
        self.receivers.read().await.iter().map(|e| (e.id.clone(), e.address, e.client.clone())).collect()
    }

    async fn audio_targets(&self) -> Vec<AudioTarget> {
        let mut targets = Vec::new();
        for entry in self.receivers.read().await.iter() {
            let client = entry.client.lock().await;
            let receiver = client.receiver();
            if let Some(server_port) = receiver.server_addr().map(|a| a.port()) {
                if receiver.is_connected() {
                    targets.push(AudioTarget {
                        address: entry.address,
                        server_port,
                        requires_encryption: receiver.capabilities.requires_rsa_encryption(),
                    });
                }
            }
        }
        targets
    }

    async fn sync_targets(&self) -> Vec<SyncTarget> {
        let mut targets = Vec::new();
        for entry in self.receivers.read().await.iter() {
            let client = entry.client.lock().await;
            let receiver = client.receiver();
            if let Some(control_port) = receiver.control_addr().map(|a| a.port()) {
                if receiver.is_connected() {
                    targets.push(SyncTarget { address: entry.address, control_port });
                }
            }
        }
        targets
    }
}

/// Holds only a [`Weak`] reference to [`GroupShared`]; installed into the
/// scheduler and UDP plane as their event sink. Upgrading a dead weak
/// reference (the group was dropped mid-callback) is treated as a no-op.
#[derive(Clone)]
struct GroupCallbacks {
    shared: Weak<GroupShared>,
}

#[async_trait]
impl SchedulerEvents for GroupCallbacks {
    async fn audio_targets(&self) -> Vec<AudioTarget> {
        match self.shared.upgrade() {
            Some(shared) => shared.audio_targets().await,
            None => Vec::new(),
        }
    }

    async fn need_sync(&self, seq: u32, is_first: bool) {
        let Some(shared) = self.shared.upgrade() else { return };
        let targets = shared.sync_targets().await;
        if let Some(runtime) = shared.runtime.read().await.as_ref() {
            runtime.udp.send_control_sync(seq, is_first, &targets).await;
        }
    }

    async fn stream_started(&self, seq: u32) {
        tracing::debug!(target: GROUP_TARGET, seq, "stream_started");
    }

    async fn stream_paused(&self, seq: u32) {
        tracing::debug!(target: GROUP_TARGET, seq, "stream_paused");
    }

    async fn stream_stopped(&self) {
        tracing::debug!(target: GROUP_TARGET, "stream_stopped");
    }

    async fn stream_ended(&self, seq: u32) {
        tracing::info!(target: GROUP_TARGET, seq, "track reached end of stream, stopping group");
        let Some(shared) = self.shared.upgrade() else { return };
        // Spawned so the pacing task (which is calling this callback) can
        // observe `is_streaming == false` and return before `Group::stop`
        // tries to join it.
        tokio::spawn(async move {
            let group = Group { shared };
            let _ = group.stop().await;
        });
    }
}

#[async_trait]
impl UdpEvents for GroupCallbacks {
    async fn need_resend(&self, missed_seq: u16, count: u16, source: Ipv4Addr) {
        let Some(shared) = self.shared.upgrade() else { return };
        let Some(runtime) = shared.runtime.read().await.as_ref().map(|r| r.scheduler.clone()) else { return };

        let mut resolved = Vec::new();
        for entry in shared.receivers.read().await.iter().filter(|e| e.address == source) {
            let client = entry.client.lock().await;
            let receiver = client.receiver();
            if let Some(server_port) = receiver.server_addr().map(|a| a.port()) {
                resolved.push(AudioTarget {
                    address: entry.address,
                    server_port,
                    requires_encryption: receiver.capabilities.requires_rsa_encryption(),
                });
            }
        }

        for seq in missed_seq..missed_seq.wrapping_add(count) {
            runtime.send_packet(u32::from(seq), &resolved).await;
        }
    }
}

/// Binds one [`AudioScheduler`]/[`UdpPlane`] pair to a set of receivers and
/// exposes the playback API.
pub struct Group {
    shared: Arc<GroupShared>,
}

impl Group {
    /// Build an empty, stopped group. `events` receives lifecycle
    /// notifications; pass `None` to ignore them.
    #[must_use]
    pub fn new(events: Option<Arc<dyn GroupEvents>>) -> Self {
        let shared = Arc::new(GroupShared {
            receivers: RwLock::new(Vec::new()),
            status: RwLock::new(GroupStatus::Stopped),
            runtime: RwLock::new(None),
            events: events.unwrap_or_else(|| Arc::new(NoopGroupEvents)),
        });
        Self { shared }
    }

    /// Current lifecycle status.
    pub async fn status(&self) -> GroupStatus {
        *self.shared.status.read().await
    }

    async fn guard_open(&self) -> Result<()> {
        if *self.shared.status.read().await == GroupStatus::Closed {
            return Err(AirTunesError::GroupClosed);
        }
        Ok(())
    }

    /// Add a receiver, opening the UDP plane/audio socket first if this is
    /// the group's first. Runs the RTSP handshake; on any failure the
    /// receiver is removed from the set before the error propagates.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`] if closed;
    /// [`AirTunesError::ClientAlreadyConnected`] if `receiver.service_name`
    /// is already present; any handshake failure from [`RaopClient::connect`].
    pub async fn add_receiver(
        &self,
        receiver: Receiver,
        client_ip: &str,
        password: Option<&str>,
        credentials: Option<&Credentials>,
    ) -> Result<()> {
        self.guard_open().await?;

        if self.shared.receivers.read().await.iter().any(|e| e.id == receiver.service_name) {
            return Err(AirTunesError::ClientAlreadyConnected);
        }

        let was_empty = self.shared.receivers.read().await.is_empty();
        if was_empty {
            self.open_runtime().await?;
        }

        let id = receiver.service_name.clone();
        let address = receiver.address;
        let mut client = RaopClient::new(receiver);

        let runtime_seq = {
            let runtime = self.shared.runtime.read().await;
            match runtime.as_ref() {
                Some(r) => r.scheduler.ref_seq().await,
                None => 0,
            }
        };
        let (control_port, timing_port) = {
            let runtime = self.shared.runtime.read().await;
            match runtime.as_ref() {
                Some(r) => (r.udp.control_port(), r.udp.timing_port()),
                None => (0, 0),
            }
        };

        let connect_result = client.connect(client_ip, password, credentials, control_port, timing_port, runtime_seq).await;

        if let Err(error) = connect_result {
            if was_empty {
                self.close_runtime_if_empty().await;
            }
            return Err(error);
        }

        if let Some(runtime) = self.shared.runtime.read().await.as_ref() {
            runtime.udp.register(address).await;
        }

        self.shared.receivers.write().await.push(ReceiverEntry { id, address, client: Arc::new(AsyncMutex::new(client)) });
        Ok(())
    }

    /// Remove a receiver by its `service_name`, tearing down its RTSP
    /// connection. If the set becomes empty, playback is stopped and the
    /// shared sockets are closed.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`] if closed.
    pub async fn remove_receiver(&self, service_name: &str) -> Result<()> {
        self.guard_open().await?;

        let removed = {
            let mut receivers = self.shared.receivers.write().await;
            let index = receivers.iter().position(|e| e.id == service_name);
            index.map(|i| receivers.remove(i))
        };

        let Some(entry) = removed else { return Ok(()) };
        entry.client.lock().await.disconnect().await;

        if let Some(runtime) = self.shared.runtime.read().await.as_ref() {
            runtime.udp.unregister(entry.address).await;
        }

        if self.shared.receivers.read().await.is_empty() {
            if *self.shared.status.read().await == GroupStatus::Playing {
                self.stop().await?;
            }
            self.close_runtime_if_empty().await;
        }
        Ok(())
    }

    /// Load `provider` and begin streaming. Requires [`GroupStatus::Stopped`].
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; [`AirTunesError::InvalidState`] if not
    /// stopped; propagates any per-receiver repair/`SET_PARAMETER` failure.
    pub async fn play(&self, provider: Arc<dyn PcmProvider>) -> Result<()> {
        self.guard_open().await?;
        if *self.shared.status.read().await != GroupStatus::Stopped {
            return Err(AirTunesError::invalid_state("play requires Stopped", *self.shared.status.read().await));
        }
        let Some(runtime) = self.shared.runtime.read().await.as_ref().map(|r| r.scheduler.clone()) else {
            return Err(AirTunesError::invalid_state("play requires at least one receiver", GroupStatus::Stopped));
        };

        runtime.load_track(provider, 0).await;
        let cur = runtime.current_seq().await;
        let start_rtp = seq::rtp_ts(runtime.start_seq().await);
        let cur_rtp = seq::rtp_ts(cur);
        let end_rtp = seq::rtp_ts(runtime.total_seq().await);

        for (_, _, client) in self.shared.snapshot().await {
            let mut client = client.lock().await;
            client.repair_connection(cur).await?;
            client.set_progress(start_rtp, cur_rtp, end_rtp).await?;
        }

        runtime.start_streaming(None).await?;
        *self.shared.status.write().await = GroupStatus::Playing;
        self.shared.events.on_play(runtime.current_ms().await).await;
        Ok(())
    }

    /// Pause the stream and FLUSH every receiver at the rewound sequence.
    /// Requires [`GroupStatus::Playing`].
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; [`AirTunesError::InvalidState`] if not playing.
    pub async fn pause(&self) -> Result<()> {
        self.guard_open().await?;
        if *self.shared.status.read().await != GroupStatus::Playing {
            return Err(AirTunesError::invalid_state("pause requires Playing", *self.shared.status.read().await));
        }
        let Some(scheduler) = self.shared.runtime.read().await.as_ref().map(|r| r.scheduler.clone()) else {
            return Err(AirTunesError::invalid_state("no active runtime", GroupStatus::Playing));
        };

        scheduler.pause_streaming().await;
        let seq = scheduler.current_seq().await;
        let rtp = seq::rtp_ts(seq);

        for (_, _, client) in self.shared.snapshot().await {
            client.lock().await.flush(seq, rtp).await?;
        }

        *self.shared.status.write().await = GroupStatus::Paused;
        self.shared.events.on_pause(scheduler.current_ms().await).await;
        Ok(())
    }

    /// Resume from [`GroupStatus::Paused`], repairing and re-syncing every
    /// receiver's progress before restarting the pacing task.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; [`AirTunesError::InvalidState`] if not paused.
    pub async fn resume(&self) -> Result<()> {
        self.guard_open().await?;
        if *self.shared.status.read().await != GroupStatus::Paused {
            return Err(AirTunesError::invalid_state("resume requires Paused", *self.shared.status.read().await));
        }
        let Some(scheduler) = self.shared.runtime.read().await.as_ref().map(|r| r.scheduler.clone()) else {
            return Err(AirTunesError::invalid_state("no active runtime", GroupStatus::Paused));
        };

        let cur = scheduler.current_seq().await;
        let start_rtp = seq::rtp_ts(scheduler.start_seq().await);
        let cur_rtp = seq::rtp_ts(cur);
        let end_rtp = seq::rtp_ts(scheduler.total_seq().await);

        for (_, _, client) in self.shared.snapshot().await {
            let mut client = client.lock().await;
            client.repair_connection(cur).await?;
            client.set_progress(start_rtp, cur_rtp, end_rtp).await?;
        }

        scheduler.resume_streaming().await?;
        *self.shared.status.write().await = GroupStatus::Playing;
        self.shared.events.on_play(scheduler.current_ms().await).await;
        Ok(())
    }

    /// Stop the stream and TEARDOWN every receiver's RTSP session. Requires
    /// any status other than [`GroupStatus::Stopped`].
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`].
    pub async fn stop(&self) -> Result<()> {
        self.guard_open().await?;
        if *self.shared.status.read().await == GroupStatus::Stopped {
            return Ok(());
        }

        let current_ms = if let Some(scheduler) = self.shared.runtime.read().await.as_ref().map(|r| r.scheduler.clone()) {
            scheduler.stop_streaming().await;
            scheduler.current_ms().await
        } else {
            0
        };

        for (_, _, client) in self.shared.snapshot().await {
            client.lock().await.disconnect().await;
        }

        *self.shared.status.write().await = GroupStatus::Stopped;
        self.shared.events.on_stop(current_ms).await;
        Ok(())
    }

    /// Seek while paused; `ms` is translated to a sequence number.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; [`AirTunesError::InvalidState`] if not paused.
    pub async fn set_progress(&self, ms: u64) -> Result<()> {
        self.guard_open().await?;
        if *self.shared.status.read().await != GroupStatus::Paused {
            return Err(AirTunesError::invalid_state("set_progress requires Paused", *self.shared.status.read().await));
        }
        let Some(scheduler) = self.shared.runtime.read().await.as_ref().map(|r| r.scheduler.clone()) else {
            return Err(AirTunesError::invalid_state("no active runtime", GroupStatus::Paused));
        };

        let start_seq = scheduler.start_seq().await;
        let new_seq = start_seq.wrapping_add(u32::try_from(seq::ms_to_seq(ms)).unwrap_or(u32::MAX));
        scheduler.set_progress(new_seq).await?;

        let rtp = seq::rtp_ts(new_seq);
        let end_rtp = seq::rtp_ts(scheduler.total_seq().await);
        for (_, _, client) in self.shared.snapshot().await {
            client.lock().await.set_progress(seq::rtp_ts(start_seq), rtp, end_rtp).await?;
        }
        Ok(())
    }

    /// `SET_PARAMETER(volume)` to every receiver. `volume` is a `0..=100`
    /// scalar, mapped to the protocol's dB scale before it's sent: `0.0` at
    /// `>=100`, `-144.0` (mute) at `<=0`, otherwise `-30 * (100 - volume) / 100`.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; propagates per-receiver RTSP failures.
    pub async fn set_volume(&self, volume: f32) -> Result<()> {
        self.guard_open().await?;
        let volume_db = if volume >= 100.0 {
            0.0
        } else if volume <= 0.0 {
            -144.0
        } else {
            -30.0 * (100.0 - volume) / 100.0
        };
        for (_, _, client) in self.shared.snapshot().await {
            client.lock().await.set_volume(volume_db).await?;
        }
        Ok(())
    }

    /// `SET_PARAMETER(dmap)` with encoded track metadata to every receiver.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; propagates per-receiver RTSP failures.
    pub async fn set_track_info(&self, metadata: &TrackMetadata) -> Result<()> {
        self.guard_open().await?;
        let body = metadata.encode_dmap();
        for (_, _, client) in self.shared.snapshot().await {
            client.lock().await.set_daap(body.clone()).await?;
        }
        Ok(())
    }

    /// `SET_PARAMETER` with artwork bytes to every receiver.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; propagates per-receiver RTSP failures.
    pub async fn set_artwork(&self, artwork: &Artwork) -> Result<()> {
        self.guard_open().await?;
        for (_, _, client) in self.shared.snapshot().await {
            client.lock().await.set_art(artwork.data.clone(), artwork.mime_type()).await?;
        }
        Ok(())
    }

    /// Ask `service_name`'s receiver to display a pairing PIN.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; [`AirTunesError::InvalidParameter`] if
    /// unknown; otherwise the RTSP failure from the pair-pin-start request.
    pub async fn request_pincode_for_device(&self, service_name: &str) -> Result<()> {
        self.guard_open().await?;
        let client = self.find_client(service_name).await?;
        client.lock().await.request_pincode().await
    }

    /// Complete pin pairing for `service_name` using the PIN the user read
    /// off the receiver's display, returning credentials to persist.
    ///
    /// # Errors
    /// [`AirTunesError::GroupClosed`]; [`AirTunesError::InvalidParameter`] if
    /// unknown; [`AirTunesError::WrongPinCode`]/[`AirTunesError::PairingFailed`]
    /// from the pairing dance.
    pub async fn request_login_credentials_for_device(&self, service_name: &str, pin: &str) -> Result<Credentials> {
        self.guard_open().await?;
        let client = self.find_client(service_name).await?;
        client.lock().await.pair_setup_with_pin(pin).await
    }

    /// Tear every receiver down, close the shared sockets, and mark the
    /// group permanently closed.
    pub async fn close(&self) {
        if *self.shared.status.read().await == GroupStatus::Closed {
            return;
        }
        let _ = self.stop().await;
        for entry in self.shared.receivers.write().await.drain(..) {
            entry.client.lock().await.disconnect().await;
        }
        *self.shared.runtime.write().await = None;
        *self.shared.status.write().await = GroupStatus::Closed;
    }

    async fn find_client(&self, service_name: &str) -> Result<Arc<AsyncMutex<RaopClient>>> {
        self.shared
            .receivers
            .read()
            .await
            .iter()
            .find(|e| e.id == service_name)
            .map(|e| e.client.clone())
            .ok_or_else(|| AirTunesError::InvalidParameter(format!("no such receiver: {service_name}")))
    }

    async fn open_runtime(&self) -> Result<()> {
        let callbacks = GroupCallbacks { shared: Arc::downgrade(&self.shared) };
        let udp = Arc::new(UdpPlane::open(Arc::new(callbacks.clone())).await?);
        let scheduler = Arc::new(AudioScheduler::new(Arc::new(callbacks)).await?);
        *self.shared.runtime.write().await = Some(RuntimeHandles { scheduler, udp });
        Ok(())
    }

    async fn close_runtime_if_empty(&self) {
        if self.shared.receivers.read().await.is_empty() {
            *self.shared.runtime.write().await = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn new_group_starts_stopped() {
        let group = Group::new(None);
        assert_eq!(group.status().await, GroupStatus::Stopped);
    }

    #[tokio::test]
    async fn operations_after_close_report_group_closed() {
        let group = Group::new(None);
        group.close().await;
        assert_eq!(group.status().await, GroupStatus::Closed);
        let result = group.set_volume(0.0).await;
        assert!(matches!(result, Err(AirTunesError::GroupClosed)));
    }

    #[tokio::test]
    async fn play_without_receivers_is_rejected() {
        let group = Group::new(None);
        let provider: Arc<dyn PcmProvider> = Arc::new(crate::provider::InMemoryPcmProvider::new(vec![0u8; 1024]));
        let result = group.play(provider).await;
        assert!(matches!(result, Err(AirTunesError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn remove_unknown_receiver_is_a_no_op() {
        let group = Group::new(None);
        assert!(group.remove_receiver("nope").await.is_ok());
    }

    #[tokio::test]
    async fn request_pincode_for_unknown_device_is_invalid_parameter() {
        let group = Group::new(None);
        let result = group.request_pincode_for_device("nope").await;
        assert!(matches!(result, Err(AirTunesError::InvalidParameter(_))));
    }
}
