//! RAOP RTSP session: request construction and response-driven state.

use super::auth::RaopAuthenticator;
use super::key_exchange::RaopSessionKeys;
use crate::protocol::rtsp::{
    Method, RtspRequest, RtspRequestBuilder, RtspResponse, headers::names, headers::raop,
};

/// `User-Agent` header value sent on every request.
const USER_AGENT: &str = concat!("Raopy/", env!("CARGO_PKG_VERSION"));

/// RAOP per-receiver RTSP status, matching the handshake/command state the
/// receiver's own RTSP verbs drive it through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RaopSessionState {
    /// No RTSP exchange has happened yet (or TEARDOWN has completed).
    Closed,
    /// OPTIONS round trip completed.
    Options,
    /// ANNOUNCE round trip completed.
    Announce,
    /// SETUP round trip completed; transport ports known.
    Setup,
    /// RECORD has been sent (transport established, waiting for the 200).
    Record,
    /// Streaming: RECORD succeeded and audio packets are flowing.
    Playing,
    /// FLUSH round trip completed (paused).
    Flush,
    /// A volume SET_PARAMETER round trip completed.
    SetVolume,
    /// A progress SET_PARAMETER round trip completed.
    SetProgress,
    /// A DAAP metadata SET_PARAMETER round trip completed.
    SetDaap,
    /// An artwork SET_PARAMETER round trip completed.
    SetArt,
    /// TEARDOWN has been sent.
    Teardown,
}

/// Transport configuration from SETUP
#[derive(Debug, Clone)]
pub struct RaopTransport {
    /// Server audio data port
    pub server_port: u16,
    /// Server control port
    pub control_port: u16,
    /// Server timing port
    pub timing_port: u16,
    /// Client control port
    pub client_control_port: u16,
    /// Client timing port
    pub client_timing_port: u16,
}

/// RAOP RTSP session manager
pub struct RaopRtspSession {
    /// Current state
    state: RaopSessionState,
    /// `CSeq` counter
    cseq: u32,
    /// Server session ID
    pub(crate) session_id: Option<String>,
    /// Client instance ID (64-bit hex), doubles as `Client-Instance` and the
    /// announce URI path.
    pub(crate) client_instance: String,
    /// DACP ID for remote control (equal to `client_instance` per the wire spec)
    dacp_id: String,
    /// Active remote token
    active_remote: String,
    /// Server address
    server_addr: String,
    /// Server port
    server_port: u16,
    /// Authentication state (Apple-Challenge/-Response only)
    authenticator: RaopAuthenticator,
    /// Session encryption keys
    session_keys: Option<RaopSessionKeys>,
    /// Transport configuration
    transport: Option<RaopTransport>,
    /// Audio latency (samples), as reported by RECORD's `Audio-Latency`
    /// header. Parsed and exposed for observation only — see the design
    /// note on `RAOP_LATENCY_MIN` in the scheduler.
    audio_latency: u32,
}

impl RaopRtspSession {
    /// Create a new RAOP session
    #[must_use]
    pub fn new(server_addr: &str, server_port: u16) -> Self {
        use rand::Rng;

        let mut rng = rand::thread_rng();
        let client_instance = format!("{:016X}", rng.r#gen::<u64>());

        Self {
            state: RaopSessionState::Closed,
            cseq: 0,
            session_id: None,
            dacp_id: client_instance.clone(),
            client_instance,
            active_remote: rng.r#gen_range(0..1_000_000_000u32).to_string(),
            server_addr: server_addr.to_string(),
            server_port,
            authenticator: RaopAuthenticator::new(),
            session_keys: None,
            transport: None,
            audio_latency: 11025,
        }
    }

    /// Get current state
    #[must_use]
    pub fn state(&self) -> RaopSessionState {
        self.state
    }

    /// Get transport configuration
    #[must_use]
    pub fn transport(&self) -> Option<&RaopTransport> {
        self.transport.as_ref()
    }

    /// Get session keys
    #[must_use]
    pub fn session_keys(&self) -> Option<&RaopSessionKeys> {
        self.session_keys.as_ref()
    }

    /// Get session ID
    #[must_use]
    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    /// The reported (not necessarily used) receiver jitter-buffer latency.
    #[must_use]
    pub fn audio_latency(&self) -> u32 {
        self.audio_latency
    }

    /// The client instance identifier, reused as the pin-pairing `user` field.
    #[must_use]
    pub fn client_instance(&self) -> &str {
        &self.client_instance
    }

    /// Get next `CSeq`
    fn next_cseq(&mut self) -> u32 {
        self.cseq += 1;
        self.cseq
    }

    /// Base URI; every request but OPTIONS targets the announce path.
    fn uri(&self, path: &str) -> String {
        if path.is_empty() {
            format!(
                "rtsp://{}:{}/{}",
                self.server_addr, self.server_port, self.client_instance
            )
        } else {
            format!("rtsp://{}:{}/{}", self.server_addr, self.server_port, path)
        }
    }

    /// Add common headers to request
    fn add_common_headers(&self, builder: RtspRequestBuilder, cseq: u32) -> RtspRequestBuilder {
        let mut b = builder
            .cseq(cseq)
            .header(names::USER_AGENT, USER_AGENT)
            .header(raop::CLIENT_INSTANCE, &self.client_instance)
            .header(raop::DACP_ID, &self.dacp_id)
            .header(raop::ACTIVE_REMOTE, &self.active_remote);

        if let Some(ref session) = self.session_id {
            b = b.session(session);
        }

        b
    }

    /// Create OPTIONS request
    pub fn options_request(&mut self) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::Options, self.uri("*"));

        self.add_common_headers(builder, cseq)
            .header(raop::APPLE_CHALLENGE, self.authenticator.challenge_header())
            .build()
    }

    /// Create ANNOUNCE request with SDP
    pub fn announce_request(&mut self, sdp: &str) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::Announce, self.uri(""));

        self.add_common_headers(builder, cseq)
            .header(names::CONTENT_TYPE, "application/sdp")
            .body(sdp.as_bytes().to_vec())
            .build()
    }

    /// Create SETUP request
    pub fn setup_request(&mut self, control_port: u16, timing_port: u16) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::Setup, self.uri(""));

        let transport = format!(
            "RTP/AVP/UDP;unicast;interleaved=0-1;mode=record;control_port={control_port};timing_port={timing_port}"
        );

        self.add_common_headers(builder, cseq)
            .header(names::TRANSPORT, &transport)
            .build()
    }

    /// Create RECORD request
    pub fn record_request(&mut self, seq: u16, rtptime: u32) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::Record, self.uri(""));

        self.add_common_headers(builder, cseq)
            .header(raop::RANGE, "npt=0-")
            .header("RTP-Info", format!("seq={seq};rtptime={rtptime}"))
            .build()
    }

    /// Create `SET_PARAMETER` request for volume.
    ///
    /// `volume_db` follows the protocol's mapping: `0.0` at `>=100`,
    /// `-144.0` at `<=0`, otherwise `-30 * (100 - v) / 100` — the caller is
    /// expected to have already applied that mapping to a `0..=100` input.
    pub fn set_volume_request(&mut self, volume_db: f32) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::SetParameter, self.uri(""));

        let body = format!("volume: {volume_db:.6}\r\n");

        self.add_common_headers(builder, cseq)
            .header(names::CONTENT_TYPE, "text/parameters")
            .body(body.into_bytes())
            .build()
    }

    /// Create `SET_PARAMETER` request for progress (RTP timestamps, latency included).
    pub fn set_progress_request(&mut self, start: u32, current: u32, end: u32) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::SetParameter, self.uri(""));

        let body = format!("progress: {start}/{current}/{end}\r\n");

        self.add_common_headers(builder, cseq)
            .header(names::CONTENT_TYPE, "text/parameters")
            .body(body.into_bytes())
            .build()
    }

    /// Create `SET_PARAMETER` request carrying a DMAP-tagged metadata body.
    pub fn set_daap_request(&mut self, dmap_body: Vec<u8>) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::SetParameter, self.uri(""));

        self.add_common_headers(builder, cseq)
            .header(names::CONTENT_TYPE, "application/x-dmap-tagged")
            .body(dmap_body)
            .build()
    }

    /// Create `SET_PARAMETER` request carrying artwork bytes.
    pub fn set_art_request(&mut self, image: Vec<u8>, content_type: &str) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::SetParameter, self.uri(""));

        self.add_common_headers(builder, cseq)
            .header(names::CONTENT_TYPE, content_type)
            .body(image)
            .build()
    }

    /// Create FLUSH request
    pub fn flush_request(&mut self, seq: u16, rtptime: u32) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::Flush, self.uri(""));

        self.add_common_headers(builder, cseq)
            .header("RTP-Info", format!("seq={seq};rtptime={rtptime}"))
            .build()
    }

    /// Create TEARDOWN request
    pub fn teardown_request(&mut self) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::Teardown, self.uri(""));

        self.add_common_headers(builder, cseq).build()
    }

    /// Create a `POST` request against one of the pin-pairing/pair-verify
    /// endpoints (`pair-pin-start`, `pair-setup-pin`, `pair-verify`), carrying
    /// `body` verbatim with no `Content-Type` override.
    pub fn pairing_post_request(&mut self, path: &str, body: Vec<u8>) -> RtspRequest {
        let cseq = self.next_cseq();
        let builder = RtspRequest::builder(Method::Post, self.uri(path));

        self.add_common_headers(builder, cseq).body(body).build()
    }

    /// Process a response and update state.
    ///
    /// `SET_PARAMETER` requests are ambiguous by method alone; `set_parameter_kind`
    /// disambiguates which of the four named sub-states a `SetParameter`
    /// response resolves to, and is ignored for every other method.
    ///
    /// # Errors
    ///
    /// Returns `String` (error message) if response indicates failure or is invalid.
    pub fn process_response(
        &mut self,
        method: Method,
        set_parameter_kind: Option<SetParameterKind>,
        response: &RtspResponse,
    ) -> Result<(), String> {
        if !response.is_success() {
            return Err(format!(
                "{} failed: {} {}",
                method.as_str(),
                response.status.as_u16(),
                response.reason
            ));
        }

        if let Some(session) = response.session() {
            let session_id = session.split(';').next().unwrap_or(session);
            self.session_id = Some(session_id.to_string());
        }

        match method {
            Method::Options => {
                self.authenticator.mark_sent();
                self.state = RaopSessionState::Options;
            }
            Method::Announce => {
                self.state = RaopSessionState::Announce;
            }
            Method::Setup => {
                if let Some(transport) = response.headers.get(names::TRANSPORT) {
                    self.transport = Some(Self::parse_transport(transport)?);
                }
                if let Some(latency) = response.headers.get(raop::AUDIO_LATENCY) {
                    self.audio_latency = latency.parse().unwrap_or(self.audio_latency);
                }
                self.state = RaopSessionState::Setup;
            }
            Method::Record => {
                self.state = RaopSessionState::Playing;
            }
            Method::Flush => {
                self.state = RaopSessionState::Flush;
            }
            Method::SetParameter => {
                self.state = match set_parameter_kind {
                    Some(SetParameterKind::Volume) => RaopSessionState::SetVolume,
                    Some(SetParameterKind::Progress) => RaopSessionState::SetProgress,
                    Some(SetParameterKind::Daap) => RaopSessionState::SetDaap,
                    Some(SetParameterKind::Art) => RaopSessionState::SetArt,
                    None => self.state,
                };
            }
            Method::Teardown => {
                self.state = RaopSessionState::Closed;
            }
            _ => {}
        }

        Ok(())
    }

    pub(crate) fn parse_transport(transport: &str) -> Result<RaopTransport, String> {
        let mut server_port = 0u16;
        let mut control_port = 0u16;
        let mut timing_port = 0u16;

        for part in transport.split(';') {
            let part = part.trim();
            if let Some((key, value)) = part.split_once('=') {
                match key {
                    "server_port" => server_port = value.parse().unwrap_or(0),
                    "control_port" => control_port = value.parse().unwrap_or(0),
                    "timing_port" => timing_port = value.parse().unwrap_or(0),
                    _ => {}
                }
            }
        }

        if server_port == 0 {
            return Err("missing server_port in transport".to_string());
        }

        Ok(RaopTransport {
            server_port,
            control_port,
            timing_port,
            client_control_port: 0,
            client_timing_port: 0,
        })
    }

    /// Render the ANNOUNCE SDP body, generating session keys first iff the
    /// receiver advertised RSA-bit encryption support.
    ///
    /// # Errors
    ///
    /// Returns `String` error if key material cannot be produced.
    pub fn prepare_announce(&mut self, client_ip: &str, encrypt: bool) -> Result<String, String> {
        if !encrypt {
            self.session_keys = None;
            return Ok(crate::protocol::sdp::SdpBuilder::new()
                .origin("iTunes", &self.client_instance, "1", client_ip)
                .session_name("iTunes")
                .connection(&self.server_addr)
                .timing(0, 0)
                .media("audio", 0, "RTP/AVP", &["96"])
                .media_attribute("rtpmap", Some("96 AppleLossless"))
                .media_attribute("fmtp", Some("96 352 0 16 40 10 14 2 255 0 0 44100"))
                .encode());
        }

        let keys = RaopSessionKeys::generate().map_err(|e| e.to_string())?;

        let sdp = crate::protocol::sdp::create_raop_announce_sdp(
            &self.client_instance,
            client_ip,
            &self.server_addr,
            &keys.rsaaeskey(),
            &keys.aesiv(),
        );

        self.session_keys = Some(keys);
        Ok(sdp)
    }
}

/// Disambiguates which named sub-state a successful `SET_PARAMETER`
/// response resolves the session to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetParameterKind {
    /// `volume: <v>` body
    Volume,
    /// `progress: start/current/end` body
    Progress,
    /// DMAP-tagged metadata body
    Daap,
    /// Artwork image body
    Art,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::rtsp::Headers;

    #[test]
    fn options_request_carries_challenge_and_common_headers() {
        let mut session = RaopRtspSession::new("192.168.1.50", 5000);
        let request = session.options_request();

        assert_eq!(request.method, Method::Options);
        assert!(request.headers.get("Apple-Challenge").is_some());
        assert!(request.headers.get("CSeq").is_some());
        assert!(request.headers.get("Client-Instance").is_some());
        assert!(request.headers.get("User-Agent").unwrap().starts_with("Raopy/"));
    }

    #[test]
    fn setup_request_encodes_transport_ports() {
        let mut session = RaopRtspSession::new("192.168.1.50", 5000);
        let request = session.setup_request(6001, 6002);

        assert_eq!(request.method, Method::Setup);
        let transport = request.headers.get("Transport").unwrap();
        assert!(transport.contains("control_port=6001"));
        assert!(transport.contains("timing_port=6002"));
    }

    #[test]
    fn transport_response_is_parsed() {
        let transport_str =
            "RTP/AVP/UDP;unicast;mode=record;server_port=6000;control_port=6001;timing_port=6002";
        let transport = RaopRtspSession::parse_transport(transport_str).unwrap();

        assert_eq!(transport.server_port, 6000);
        assert_eq!(transport.control_port, 6001);
        assert_eq!(transport.timing_port, 6002);
    }

    #[test]
    fn volume_request_renders_db_value() {
        let mut session = RaopRtspSession::new("192.168.1.50", 5000);
        let request = session.set_volume_request(-15.0);

        assert_eq!(request.method, Method::SetParameter);
        let body = String::from_utf8_lossy(&request.body);
        assert!(body.contains("volume:"));
        assert!(body.contains("-15"));
    }

    fn ok_response() -> RtspResponse {
        RtspResponse {
            version: "RTSP/1.0".to_string(),
            status: crate::protocol::rtsp::StatusCode::OK,
            reason: "OK".to_string(),
            headers: Headers::new(),
            body: Vec::new(),
        }
    }

    #[test]
    fn handshake_drives_state_through_to_playing() {
        let mut session = RaopRtspSession::new("192.168.1.50", 5000);

        session
            .process_response(Method::Options, None, &ok_response())
            .unwrap();
        assert_eq!(session.state(), RaopSessionState::Options);

        session
            .process_response(Method::Announce, None, &ok_response())
            .unwrap();
        assert_eq!(session.state(), RaopSessionState::Announce);

        session
            .process_response(Method::Setup, None, &ok_response())
            .unwrap();
        assert_eq!(session.state(), RaopSessionState::Setup);

        session
            .process_response(Method::Record, None, &ok_response())
            .unwrap();
        assert_eq!(session.state(), RaopSessionState::Playing);
    }

    #[test]
    fn set_parameter_kind_selects_sub_state() {
        let mut session = RaopRtspSession::new("192.168.1.50", 5000);
        session
            .process_response(Method::SetParameter, Some(SetParameterKind::Volume), &ok_response())
            .unwrap();
        assert_eq!(session.state(), RaopSessionState::SetVolume);
    }

    #[test]
    fn non_success_response_is_rejected() {
        let mut session = RaopRtspSession::new("192.168.1.50", 5000);
        let mut response = ok_response();
        response.status = crate::protocol::rtsp::StatusCode::UNAUTHORIZED;
        assert!(session.process_response(Method::Options, None, &response).is_err());
    }
}
