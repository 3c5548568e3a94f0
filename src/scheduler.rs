//! Audio scheduler: paces bursts of audio packets, fires sync
//! callbacks every [`crate::config::SYNC_PERIOD`] packets, and implements
//! pause/resume/stop/seek.
//!
//! A recurring tick computes how many packets "should" have gone out by
//! now and sends them in a burst. The scheduler never references the
//! group that owns it, only a trait object supplying the data (current
//! receiver set) and sinks (sync/lifecycle events) it needs each tick.

use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use bytes::Bytes;
use rand::Rng;
use tokio::net::UdpSocket;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::alac::AlacCodec;
use crate::clock::milliseconds_since_epoch;
use crate::config::{self, SYNC_PERIOD};
use crate::error::{AirTunesError, Result};
use crate::protocol::raop::encryption::RaopEncryptor;
use crate::protocol::raop::key_exchange::RaopSessionKeys;
use crate::protocol::rtp::AudioPacket;
use crate::provider::{PcmFrame, PcmProvider};
use crate::seq;

const SCHEDULER_TARGET: &str = "raop::scheduler";

/// One receiver's audio-send address plus whether this session's shared
/// AES key should be applied to its payload.
#[derive(Debug, Clone, Copy)]
pub struct AudioTarget {
    /// Receiver IPv4 address.
    pub address: Ipv4Addr,
    /// Receiver's negotiated audio data port.
    pub server_port: u16,
    /// Whether the receiver's capability bitmap includes the RSA bit.
    pub requires_encryption: bool,
}

/// Sinks and data sources the scheduler calls out to every tick. Never
/// implemented by anything that itself holds a strong reference back to
/// the scheduler, to avoid a group/scheduler/UDP reference cycle.
#[async_trait]
pub trait SchedulerEvents: Send + Sync {
    /// Current set of receivers audio should be sent to.
    async fn audio_targets(&self) -> Vec<AudioTarget>;
    /// A sync packet for `seq` must be sent before the matching audio
    /// packet; called synchronously from the pacing tick so ordering holds.
    async fn need_sync(&self, seq: u32, is_first: bool);
    /// `start_streaming`/`resume_streaming` began emitting at `seq`.
    async fn stream_started(&self, seq: u32);
    /// `pause_streaming` stopped emitting; `seq` is the pre-rewind position.
    async fn stream_paused(&self, seq: u32);
    /// `stop_streaming` was called.
    async fn stream_stopped(&self);
    /// The provider reported EOS; `seq` is the last sequence number sent
    /// (capped at `total_seq`).
    async fn stream_ended(&self, seq: u32);
}

struct StreamState {
    start_seq: u32,
    ref_seq: u32,
    next_seq: u32,
    total_seq: Option<u32>,
    burst_time_ref: i64,
}

impl StreamState {
    fn fresh() -> Self {
        Self { start_seq: 0, ref_seq: 0, next_seq: 0, total_seq: None, burst_time_ref: 0 }
    }

    fn current_ms(&self) -> u64 {
        seq::seq_to_ms(u64::from(self.next_seq.saturating_sub(self.start_seq)))
    }
}

/// Owns the audio-send socket and the pacing task for one playback group.
pub struct AudioScheduler {
    socket: UdpSocket,
    alac: Mutex<AlacCodec>,
    encryptor: RaopEncryptor,
    device_magic: u32,
    provider: Mutex<Option<Arc<dyn PcmProvider>>>,
    state: Mutex<StreamState>,
    is_streaming: AtomicBool,
    events: Arc<dyn SchedulerEvents>,
    tick_task: Mutex<Option<JoinHandle<()>>>,
}

impl AudioScheduler {
    /// Bind the audio-send socket and build a fresh scheduler with no track
    /// loaded. `events` is consulted every tick for the live receiver set
    /// and receives lifecycle/sync callbacks.
    ///
    /// # Errors
    /// [`AirTunesError::NetworkError`] if the send socket cannot be bound,
    /// or [`AirTunesError::CodecError`] if the fixed legacy AES key/IV
    /// constants fail to decode (a packaging bug).
    pub async fn new(events: Arc<dyn SchedulerEvents>) -> Result<Self> {
        let socket = UdpSocket::bind((Ipv4Addr::UNSPECIFIED, 0)).await?;
        let keys = RaopSessionKeys::generate().map_err(|e| AirTunesError::CodecError(e.to_string()))?;
        let encryptor = RaopEncryptor::new(*keys.aes_key(), *keys.aes_iv());
        let device_magic = rand::thread_rng().gen_range(100_000_000u32..=999_999_999u32);

        Ok(Self {
            socket,
            alac: Mutex::new(AlacCodec::new()),
            encryptor,
            device_magic,
            provider: Mutex::new(None),
            state: Mutex::new(StreamState::fresh()),
            is_streaming: AtomicBool::new(false),
            events,
            tick_task: Mutex::new(None),
        })
    }

    /// This session's SSRC, shared by every audio packet.
    #[must_use]
    pub fn device_magic(&self) -> u32 {
        self.device_magic
    }

    /// Load a new track: `start_seq` becomes the sequence assigned to frame
    /// 0, and `ref_seq`/`next_seq` reset to it. Must be called before
    /// `start_streaming`.
    pub async fn load_track(&self, provider: Arc<dyn PcmProvider>, start_seq: u32) {
        let total_frames = provider.total_frames();
        let last_offset = u32::try_from(total_frames.saturating_sub(1)).unwrap_or(u32::MAX);
        let mut state = self.state.lock().await;
        state.start_seq = start_seq;
        state.ref_seq = start_seq;
        state.next_seq = start_seq;
        state.total_seq = Some(start_seq.wrapping_add(last_offset));
        *self.provider.lock().await = Some(provider);
    }

    /// The sequence number assigned to frame 0 of the loaded track.
    pub async fn start_seq(&self) -> u32 {
        self.state.lock().await.start_seq
    }

    /// The next sequence number the pacing loop will emit.
    pub async fn current_seq(&self) -> u32 {
        self.state.lock().await.next_seq
    }

    /// The sequence number the most recent play/resume started from — the
    /// time origin late-joining receivers should connect at.
    pub async fn ref_seq(&self) -> u32 {
        self.state.lock().await.ref_seq
    }

    /// The last sequence number of the loaded track, as computed by
    /// `load_track` from the provider's frame count. Falls back to
    /// `start_seq` if no track is loaded.
    pub async fn total_seq(&self) -> u32 {
        let state = self.state.lock().await;
        state.total_seq.unwrap_or(state.start_seq)
    }

    /// Elapsed playback position, in milliseconds, derived from `next_seq`.
    pub async fn current_ms(&self) -> u64 {
        self.state.lock().await.current_ms()
    }

    /// `rtp_ts` for the current `next_seq`, for SET_PARAMETER(progress)/FLUSH.
    pub async fn current_rtp_ts(&self) -> u32 {
        seq::rtp_ts(self.state.lock().await.next_seq)
    }

    /// Start (or restart) pacing from `seq`, defaulting to `start_seq`.
    ///
    /// # Errors
    /// [`AirTunesError::InvalidState`] if no track is loaded or a pacing
    /// task is already running.
    pub async fn start_streaming(self: &Arc<Self>, seq: Option<u32>) -> Result<()> {
        if self.provider.lock().await.is_none() {
            return Err(AirTunesError::invalid_state("no track loaded", "no provider"));
        }
        if self.is_streaming.swap(true, Ordering::AcqRel) {
            return Err(AirTunesError::invalid_state("already streaming", "is_streaming"));
        }

        let started_at = {
            let mut state = self.state.lock().await;
            let s = seq.unwrap_or(state.start_seq);
            state.ref_seq = s;
            state.next_seq = s;
            state.burst_time_ref = milliseconds_since_epoch();
            s
        };

        self.events.stream_started(started_at).await;
        self.spawn_pacing_task();
        Ok(())
    }

    /// Equivalent to `start_streaming(current_seq)`.
    ///
    /// # Errors
    /// See [`Self::start_streaming`].
    pub async fn resume_streaming(self: &Arc<Self>) -> Result<()> {
        let next = self.current_seq().await;
        self.start_streaming(Some(next)).await
    }

    /// Stop pacing and rewind `next_seq` by `sequence_latency` so resume
    /// replays ~2s of buffered audio into the receiver's jitter buffer.
    pub async fn pause_streaming(&self) {
        self.is_streaming.store(false, Ordering::Release);
        self.join_pacing_task().await;

        let mut state = self.state.lock().await;
        self.events.stream_paused(state.next_seq).await;
        state.next_seq = state.next_seq.wrapping_sub(config::sequence_latency());
    }

    /// Stop pacing, drop the loaded provider, and reset to `start_seq`.
    pub async fn stop_streaming(&self) {
        self.is_streaming.store(false, Ordering::Release);
        self.join_pacing_task().await;

        self.events.stream_stopped().await;
        *self.provider.lock().await = None;
        let mut state = self.state.lock().await;
        state.next_seq = state.start_seq;
        state.ref_seq = state.start_seq;
    }

    /// Seek while paused. Allowed only when not streaming and
    /// `start_seq <= new_seq <= total_seq`.
    ///
    /// # Errors
    /// [`AirTunesError::InvalidState`] while streaming;
    /// [`AirTunesError::InvalidParameter`] if `new_seq` is out of range.
    pub async fn set_progress(&self, new_seq: u32) -> Result<()> {
        if self.is_streaming.load(Ordering::Acquire) {
            return Err(AirTunesError::invalid_state("set_progress requires a paused scheduler", "is_streaming"));
        }
        let mut state = self.state.lock().await;
        let total = state.total_seq.unwrap_or(state.start_seq);
        if new_seq < state.start_seq || new_seq > total {
            return Err(AirTunesError::InvalidParameter(format!(
                "seq {new_seq} out of range [{}, {total}]",
                state.start_seq
            )));
        }
        state.next_seq = new_seq;
        Ok(())
    }

    /// Retransmit one already-sent sequence number to `targets`, bypassing
    /// `next_seq` and suppressing the sync callback even if `seq` would
    /// otherwise land on a sync boundary (property 7).
    pub async fn send_packet(&self, seq: u32, targets: &[AudioTarget]) {
        self.emit(seq, false, targets).await;
    }

    fn spawn_pacing_task(self: &Arc<Self>) {
        let this = Arc::clone(self);
        let handle = tokio::spawn(async move { this.run_pacing_loop().await });
        // `start_streaming` already checked no task was running; store the
        // handle without blocking (no prior task to await).
        if let Ok(mut slot) = self.tick_task.try_lock() {
            *slot = Some(handle);
        }
    }

    async fn join_pacing_task(&self) {
        if let Some(handle) = self.tick_task.lock().await.take() {
            let _ = handle.await;
        }
    }

    async fn run_pacing_loop(self: Arc<Self>) {
        loop {
            tokio::time::sleep(config::STREAM_LATENCY).await;
            if !self.is_streaming.load(Ordering::Acquire) {
                return;
            }
            self.tick().await;
            if !self.is_streaming.load(Ordering::Acquire) {
                return;
            }
        }
    }

    /// Send every packet in `[next_seq, target_seq)`, where `target_seq` is
    /// how far along the stream should be given the elapsed wall-clock time
    /// since `burst_time_ref`.
    async fn tick(&self) {
        let targets = self.events.audio_targets().await;
        let now = milliseconds_since_epoch();

        loop {
            let seq = {
                let mut state = self.state.lock().await;
                let elapsed = u64::try_from(now - state.burst_time_ref).unwrap_or(0);
                let advance = u32::try_from(seq::ms_to_seq(elapsed)).unwrap_or(u32::MAX);
                let target_seq = state.ref_seq.wrapping_add(advance);
                if !self.is_streaming.load(Ordering::Acquire) || state.next_seq >= target_seq {
                    return;
                }
                let seq = state.next_seq;
                state.next_seq = state.next_seq.wrapping_add(1);
                seq
            };

            if !self.send_scheduled(seq, &targets).await {
                return;
            }
        }
    }

    /// Send the scheduled (non-retransmit) packet at `seq`; returns `false`
    /// if the stream ended so the caller can stop the burst.
    async fn send_scheduled(&self, seq: u32, targets: &[AudioTarget]) -> bool {
        let ref_seq = self.state.lock().await.ref_seq;
        let is_first = seq == ref_seq;

        if seq.wrapping_sub(ref_seq) % SYNC_PERIOD == 0 {
            self.events.need_sync(seq, is_first).await;
        }

        let Some(provider) = self.provider.lock().await.clone() else {
            return false;
        };
        let start_seq = self.state.lock().await.start_seq;
        let relative = i64::from(seq) - i64::from(start_seq);

        match provider.frame(relative) {
            PcmFrame::Eos => {
                let total = self.state.lock().await.total_seq.unwrap_or(seq);
                self.is_streaming.store(false, Ordering::Release);
                self.events.stream_ended(seq.min(total)).await;
                false
            }
            PcmFrame::Frame(pcm) => {
                self.send_encoded(seq, &pcm, is_first, targets).await;
                true
            }
            PcmFrame::Silence => {
                let silent = vec![0u8; config::pcm_frame_bytes()];
                self.send_encoded(seq, &silent, is_first, targets).await;
                true
            }
        }
    }

    /// Build and send one audio packet for `seq`, ignoring pacing/sync state
    /// entirely (the retransmit path).
    async fn emit(&self, seq: u32, is_first: bool, targets: &[AudioTarget]) {
        let start_seq = self.state.lock().await.start_seq;
        let relative = i64::from(seq) - i64::from(start_seq);

        let Some(provider) = self.provider.lock().await.clone() else {
            tracing::warn!(target: SCHEDULER_TARGET, seq, "retransmit requested with no track loaded");
            return;
        };

        match provider.frame(relative) {
            PcmFrame::Eos => {
                tracing::debug!(target: SCHEDULER_TARGET, seq, "retransmit requested past end of track");
            }
            PcmFrame::Frame(pcm) => self.send_encoded(seq, &pcm, is_first, targets).await,
            PcmFrame::Silence => {
                let silent = vec![0u8; config::pcm_frame_bytes()];
                self.send_encoded(seq, &silent, is_first, targets).await;
            }
        }
    }

    async fn send_encoded(&self, seq: u32, pcm: &[u8], is_first: bool, targets: &[AudioTarget]) {
        let encoded = {
            let mut alac = self.alac.lock().await;
            alac.encode(pcm)
        };
        let timestamp = seq::rtp_ts(seq);
        let wire_seq = seq::low16(seq);

        let plain = Bytes::from(encoded);
        let mut encrypted_cache: Option<Bytes> = None;

        for target in targets {
            let payload = if target.requires_encryption {
                if encrypted_cache.is_none() {
                    match self.encryptor.encrypt(&plain) {
                        Ok(bytes) => encrypted_cache = Some(Bytes::from(bytes)),
                        Err(error) => {
                            tracing::warn!(target: SCHEDULER_TARGET, %error, "AES encrypt failed, skipping packet");
                            continue;
                        }
                    }
                }
                encrypted_cache.clone().unwrap()
            } else {
                plain.clone()
            };

            let packet = AudioPacket::new(wire_seq, timestamp, self.device_magic, payload, is_first);
            let addr = SocketAddr::V4(SocketAddrV4::new(target.address, target.server_port));
            if let Err(error) = self.socket.send_to(&packet.encode(), addr).await {
                tracing::warn!(target: SCHEDULER_TARGET, receiver = %target.address, %error, "audio send failed");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::InMemoryPcmProvider;
    use tokio::sync::Mutex as TokioMutex;

    struct RecordingEvents {
        targets: Vec<AudioTarget>,
        syncs: TokioMutex<Vec<(u32, bool)>>,
        ended: TokioMutex<Option<u32>>,
    }

    #[async_trait]
    impl SchedulerEvents for RecordingEvents {
        async fn audio_targets(&self) -> Vec<AudioTarget> {
            self.targets.clone()
        }
        async fn need_sync(&self, seq: u32, is_first: bool) {
            self.syncs.lock().await.push((seq, is_first));
        }
        async fn stream_started(&self, _seq: u32) {}
        async fn stream_paused(&self, _seq: u32) {}
        async fn stream_stopped(&self) {}
        async fn stream_ended(&self, seq: u32) {
            *self.ended.lock().await = Some(seq);
        }
    }

    async fn new_scheduler(targets: Vec<AudioTarget>) -> (Arc<AudioScheduler>, Arc<RecordingEvents>) {
        let events = Arc::new(RecordingEvents {
            targets,
            syncs: TokioMutex::new(Vec::new()),
            ended: TokioMutex::new(None),
        });
        let scheduler = Arc::new(AudioScheduler::new(events.clone()).await.unwrap());
        (scheduler, events)
    }

    #[tokio::test]
    async fn load_track_sets_total_seq_from_frame_count() {
        let (scheduler, _events) = new_scheduler(vec![]).await;
        let provider: Arc<dyn PcmProvider> =
            Arc::new(InMemoryPcmProvider::new(vec![0u8; config::pcm_frame_bytes() * 5]));
        scheduler.load_track(provider, 1000).await;
        assert_eq!(scheduler.start_seq().await, 1000);
        assert_eq!(scheduler.state.lock().await.total_seq, Some(1004));
    }

    #[tokio::test]
    async fn start_streaming_requires_a_loaded_track() {
        let (scheduler, _events) = new_scheduler(vec![]).await;
        let result = scheduler.start_streaming(None).await;
        assert!(matches!(result, Err(AirTunesError::InvalidState { .. })));
    }

    #[tokio::test]
    async fn pause_rewinds_next_seq_by_sequence_latency() {
        let (scheduler, _events) = new_scheduler(vec![]).await;
        let provider: Arc<dyn PcmProvider> =
            Arc::new(InMemoryPcmProvider::new(vec![0u8; config::pcm_frame_bytes() * 1000]));
        scheduler.load_track(provider, 0).await;
        scheduler.state.lock().await.next_seq = 500;
        scheduler.state.lock().await.ref_seq = 500;

        scheduler.pause_streaming().await;
        assert_eq!(scheduler.current_seq().await, 500 - config::sequence_latency());
    }

    #[tokio::test]
    async fn set_progress_rejects_out_of_range_seek() {
        let (scheduler, _events) = new_scheduler(vec![]).await;
        let provider: Arc<dyn PcmProvider> =
            Arc::new(InMemoryPcmProvider::new(vec![0u8; config::pcm_frame_bytes() * 2]));
        scheduler.load_track(provider, 0).await;
        assert!(scheduler.set_progress(100).await.is_err());
        assert!(scheduler.set_progress(1).await.is_ok());
    }

    #[tokio::test]
    async fn set_progress_rejects_while_streaming() {
        let (scheduler, _events) = new_scheduler(vec![]).await;
        let provider: Arc<dyn PcmProvider> =
            Arc::new(InMemoryPcmProvider::new(vec![0u8; config::pcm_frame_bytes() * 1000]));
        scheduler.load_track(provider, 0).await;
        scheduler.start_streaming(None).await.unwrap();
        assert!(matches!(scheduler.set_progress(5).await, Err(AirTunesError::InvalidState { .. })));
        scheduler.stop_streaming().await;
    }

    #[tokio::test]
    async fn first_burst_packet_reaches_loopback_receiver_with_expected_header() {
        let receiver_socket = UdpSocket::bind(("127.0.0.1", 0)).await.unwrap();
        let receiver_addr = receiver_socket.local_addr().unwrap();
        let target = AudioTarget {
            address: Ipv4Addr::new(127, 0, 0, 1),
            server_port: receiver_addr.port(),
            requires_encryption: false,
        };
        let (scheduler, events) = new_scheduler(vec![target]).await;
        let provider: Arc<dyn PcmProvider> =
            Arc::new(InMemoryPcmProvider::new(vec![0u8; config::pcm_frame_bytes() * 10]));
        scheduler.load_track(provider, 0).await;
        scheduler.start_streaming(None).await.unwrap();

        let mut buf = [0u8; 2048];
        let (n, _) = tokio::time::timeout(std::time::Duration::from_secs(2), receiver_socket.recv_from(&mut buf))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(buf[0], 0x80);
        assert_eq!(buf[1], 0xE0);
        let rtp_ts = u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]);
        assert_eq!(rtp_ts, 88200);
        let _ = n;

        scheduler.stop_streaming().await;
        assert!(events.syncs.lock().await.contains(&(0, true)));
    }

    #[tokio::test]
    async fn retransmit_does_not_advance_next_seq_or_emit_sync() {
        let (scheduler, events) = new_scheduler(vec![]).await;
        let provider: Arc<dyn PcmProvider> =
            Arc::new(InMemoryPcmProvider::new(vec![0u8; config::pcm_frame_bytes() * 2000]));
        scheduler.load_track(provider, 0).await;
        scheduler.state.lock().await.ref_seq = 1000;
        scheduler.state.lock().await.next_seq = 2000;

        scheduler.send_packet(1050, &[]).await;
        assert_eq!(scheduler.current_seq().await, 2000);
        assert!(events.syncs.lock().await.is_empty());
    }
}
