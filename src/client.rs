//! RTSP client per receiver: the OPTIONS→ANNOUNCE→SETUP→RECORD handshake,
//! digest authentication, pin-pairing/pair-verify, and the FLUSH/SET_PARAMETER/
//! TEARDOWN commands a connected receiver accepts.
//!
//! Built on [`crate::net::RtspConnection`] for transport and
//! [`crate::protocol::raop::session::RaopRtspSession`] for request
//! construction and state tracking. Only one request may be in flight per
//! receiver; `&mut self` on every method enforces that at compile time
//! rather than with an explicit mutex, since a `Group` already
//! guards each client behind one.

use crate::error::{AirTunesError, Result};
use crate::net::RtspConnection;
use crate::protocol::crypto::Ed25519KeyPair;
use crate::protocol::raop::pin_pairing::{
    AtvSrpClient, PairVerifyState, extract_atv_curve_public, extract_pk_salt, extract_proof,
    pair_setup_pin_encrypted_plist, pair_setup_pin_proof_plist, pair_setup_pin_request_plist,
};
use crate::protocol::raop::session::{RaopRtspSession, RaopSessionState, SetParameterKind};
use crate::protocol::rtsp::{DigestInfo, Method, RtspRequest, RtspResponse, headers::names};
use crate::receiver::{Credentials, Receiver};

/// Username attached to digest-auth responses and carried as the SRP
/// identity in pin-pairing. Matches the `iTunes` identity already used in
/// the ANNOUNCE SDP origin line.
const DIGEST_USERNAME: &str = "iTunes";

const CLIENT_TARGET: &str = "raop::rtsp";

/// Parameters cached across a disconnect so `repair_connection` can replay
/// the handshake without the caller re-supplying anything.
#[derive(Debug, Clone, Default)]
struct RepairParams {
    client_ip: Option<String>,
    password: Option<String>,
    credentials: Option<Credentials>,
    client_control_port: Option<u16>,
    client_timing_port: Option<u16>,
}

/// Drives one receiver through its RTSP handshake and subsequent commands.
pub struct RaopClient {
    receiver: Receiver,
    session: RaopRtspSession,
    connection: Option<RtspConnection>,
    repair: RepairParams,
}

impl RaopClient {
    /// Build a client for `receiver`, not yet connected.
    #[must_use]
    pub fn new(receiver: Receiver) -> Self {
        let server_addr = receiver.address.to_string();
        let server_port = receiver.port;
        Self {
            receiver,
            session: RaopRtspSession::new(&server_addr, server_port),
            connection: None,
            repair: RepairParams::default(),
        }
    }

    /// Current receiver data, including the RTSP status the handshake has
    /// reached.
    #[must_use]
    pub fn receiver(&self) -> &Receiver {
        &self.receiver
    }

    /// Run the full handshake: OPTIONS, ANNOUNCE, SETUP, RECORD.
    ///
    /// `password`/`credentials` are supplied up front when the caller already
    /// knows the receiver needs them; otherwise OPTIONS returning 401/403
    /// surfaces [`AirTunesError::RequiresPassword`]/[`AirTunesError::RequiresPinCode`]
    /// without closing the connection, and the caller should retry with
    /// credentials once obtained.
    ///
    /// # Errors
    /// Terminal conditions close the connection and reset state to
    /// `Closed`; auth-required conditions leave it open.
    pub async fn connect(
        &mut self,
        client_ip: &str,
        password: Option<&str>,
        credentials: Option<&Credentials>,
        client_control_port: u16,
        client_timing_port: u16,
        start_seq: u32,
    ) -> Result<()> {
        self.repair.client_ip = Some(client_ip.to_string());
        self.repair.password = password.map(str::to_string);
        self.repair.credentials = credentials.cloned();
        self.repair.client_control_port = Some(client_control_port);
        self.repair.client_timing_port = Some(client_timing_port);

        if self.connection.is_none() {
            let conn = RtspConnection::open(self.receiver.rtsp_addr()).await?;
            self.connection = Some(conn);
        }

        self.run_options(password, credentials).await?;
        self.run_announce(client_ip).await?;
        self.run_setup(client_control_port, client_timing_port).await?;
        self.run_record(start_seq).await?;

        self.receiver.last_password = password.map(str::to_string);
        Ok(())
    }

    /// Replay the full handshake from cached parameters, for use after a
    /// connection was lost (status observed `Closed`).
    ///
    /// # Errors
    /// [`AirTunesError::NoCredentials`] if `connect` was never called.
    pub async fn repair_connection(&mut self, next_seq: u32) -> Result<()> {
        let client_ip = self.repair.client_ip.clone().ok_or(AirTunesError::NoCredentials)?;
        let password = self.repair.password.clone();
        let credentials = self.repair.credentials.clone();
        let control_port = self.repair.client_control_port.unwrap_or(0);
        let timing_port = self.repair.client_timing_port.unwrap_or(0);

        self.connect(
            &client_ip,
            password.as_deref(),
            credentials.as_ref(),
            control_port,
            timing_port,
            next_seq,
        )
        .await
    }

    /// `FLUSH` with the sequence/timestamp the stream will resume from.
    ///
    /// # Errors
    /// Terminal RTSP failures close the connection.
    pub async fn flush(&mut self, seq: u32, rtptime: u32) -> Result<()> {
        let request = self.session.flush_request(crate::seq::low16(seq), rtptime);
        self.command_roundtrip(Method::Flush, None, request).await
    }

    /// `SET_PARAMETER` with a volume already mapped to the protocol's dB scale.
    ///
    /// # Errors
    /// Terminal RTSP failures close the connection.
    pub async fn set_volume(&mut self, volume_db: f32) -> Result<()> {
        let request = self.session.set_volume_request(volume_db);
        self.command_roundtrip(Method::SetParameter, Some(SetParameterKind::Volume), request).await
    }

    /// `SET_PARAMETER` with playback progress (start/current/end RTP timestamps).
    ///
    /// # Errors
    /// Terminal RTSP failures close the connection.
    pub async fn set_progress(&mut self, start: u32, current: u32, end: u32) -> Result<()> {
        let request = self.session.set_progress_request(start, current, end);
        self.command_roundtrip(Method::SetParameter, Some(SetParameterKind::Progress), request).await
    }

    /// `SET_PARAMETER` carrying a DMAP-tagged metadata body.
    ///
    /// # Errors
    /// Terminal RTSP failures close the connection.
    pub async fn set_daap(&mut self, dmap_body: Vec<u8>) -> Result<()> {
        let request = self.session.set_daap_request(dmap_body);
        self.command_roundtrip(Method::SetParameter, Some(SetParameterKind::Daap), request).await
    }

    /// `SET_PARAMETER` carrying artwork bytes.
    ///
    /// # Errors
    /// Terminal RTSP failures close the connection.
    pub async fn set_art(&mut self, image: Vec<u8>, content_type: &str) -> Result<()> {
        let request = self.session.set_art_request(image, content_type);
        self.command_roundtrip(Method::SetParameter, Some(SetParameterKind::Art), request).await
    }

    /// `TEARDOWN`, then close the socket regardless of the response.
    pub async fn disconnect(&mut self) {
        if self.connection.is_some() {
            let request = self.session.teardown_request();
            let _ = self.send_and_receive(&request).await;
        }
        self.cleanup().await;
    }

    /// Run the pin-setup dance against a receiver whose OPTIONS answered 403
    /// with no cached credentials, returning freshly minted credentials the
    /// caller is responsible for persisting.
    ///
    /// # Errors
    /// [`AirTunesError::WrongPinCode`] if the PIN does not match;
    /// [`AirTunesError::PairingFailed`] for any other protocol failure.
    pub async fn pair_setup_with_pin(&mut self, pin: &str) -> Result<Credentials> {
        if self.connection.is_none() {
            let conn = RtspConnection::open(self.receiver.rtsp_addr()).await?;
            self.connection = Some(conn);
        }

        let start_request = self.session.pairing_post_request("pair-pin-start", Vec::new());
        let start_response = self.send_and_receive(&start_request).await?;
        if !start_response.status.is_success() {
            return Err(self.fail_bad_response(&start_response).await);
        }

        let user = self.session.client_instance().to_string();
        let request_body = crate::protocol::plist::encode(&pair_setup_pin_request_plist(&user))
            .map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;
        let first = self.session.pairing_post_request("pair-setup-pin", request_body);
        let first_response = self.send_and_receive(&first).await?;
        if !first_response.status.is_success() {
            return Err(self.fail_bad_response(&first_response).await);
        }
        let challenge = first_response.body_as_plist().map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;
        let (pk, salt) = extract_pk_salt(&challenge)
            .ok_or_else(|| AirTunesError::PairingFailed("missing pk/salt in pair-setup-pin response".into()))?;

        let ed25519 = Ed25519KeyPair::generate();
        let seed = ed25519.secret_bytes();
        let srp = AtvSrpClient::new(&seed).map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;
        let verifier = srp
            .process_challenge(user.as_bytes(), pin.as_bytes(), &salt, &pk)
            .map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;

        let proof_body = crate::protocol::plist::encode(&pair_setup_pin_proof_plist(srp.public_key(), verifier.client_proof()))
            .map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;
        let proof_request = self.session.pairing_post_request("pair-setup-pin", proof_body);
        let proof_response = self.send_and_receive(&proof_request).await?;
        if !proof_response.status.is_success() {
            return Err(self.fail_bad_response(&proof_response).await);
        }
        let proof_plist = proof_response.body_as_plist().map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;
        let server_proof = extract_proof(&proof_plist)
            .ok_or_else(|| AirTunesError::PairingFailed("missing proof in pair-setup-pin response".into()))?;
        verifier.verify_server(&server_proof).map_err(|_| AirTunesError::WrongPinCode)?;

        let our_public = *ed25519.public_key().as_bytes();
        let encrypted_body = crate::protocol::plist::encode(
            &pair_setup_pin_encrypted_plist(&verifier, &our_public).map_err(|e| AirTunesError::PairingFailed(e.to_string()))?,
        )
        .map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;
        let encrypted_request = self.session.pairing_post_request("pair-setup-pin", encrypted_body);
        let encrypted_response = self.send_and_receive(&encrypted_request).await?;
        if !encrypted_response.status.is_success() {
            return Err(self.fail_bad_response(&encrypted_response).await);
        }

        let credentials = Credentials { auth_identifier: user, auth_secret: seed };
        self.receiver.last_credentials = Some(credentials.clone());
        Ok(credentials)
    }

    /// `POST /pair-pin-start` only, to make the receiver display its PIN
    /// without running the rest of the pair-setup-pin dance. Call
    /// [`Self::pair_setup_with_pin`] afterward with the PIN the user read.
    ///
    /// # Errors
    /// Terminal RTSP/network failures.
    pub async fn request_pincode(&mut self) -> Result<()> {
        if self.connection.is_none() {
            let conn = RtspConnection::open(self.receiver.rtsp_addr()).await?;
            self.connection = Some(conn);
        }

        let request = self.session.pairing_post_request("pair-pin-start", Vec::new());
        let response = self.send_and_receive(&request).await?;
        if !response.status.is_success() {
            return Err(self.fail_bad_response(&response).await);
        }
        Ok(())
    }

    async fn run_options(&mut self, password: Option<&str>, credentials: Option<&Credentials>) -> Result<()> {
        let request = self.session.options_request();
        let response = self.send_and_receive(&request).await?;

        match response.status.as_u16() {
            200 => {
                self.apply_process_response(Method::Options, None, &response).await?;
                Ok(())
            }
            401 => {
                if let Some(header) = response.headers.get(names::WWW_AUTHENTICATE) {
                    self.receiver.digest_info = DigestInfo::parse(header);
                }
                let Some(pw) = password else {
                    return Err(AirTunesError::RequiresPassword);
                };
                let digest = self.receiver.digest_info.clone().ok_or(AirTunesError::RequiresPassword)?;
                let mut retry = self.session.options_request();
                retry.headers.insert(names::AUTHORIZATION, digest.authorization_header(DIGEST_USERNAME, pw, "OPTIONS", "*"));
                let retry_response = self.send_and_receive(&retry).await?;
                if retry_response.status.as_u16() == 401 {
                    return Err(AirTunesError::WrongPassword);
                }
                if !retry_response.status.is_success() {
                    return Err(self.fail_bad_response(&retry_response).await);
                }
                self.apply_process_response(Method::Options, None, &retry_response).await?;
                Ok(())
            }
            403 => {
                let Some(creds) = credentials else {
                    return Err(AirTunesError::RequiresPinCode);
                };
                self.pair_verify(creds).await?;
                let retry = self.session.options_request();
                let retry_response = self.send_and_receive(&retry).await?;
                if !retry_response.status.is_success() {
                    return Err(self.fail_bad_response(&retry_response).await);
                }
                self.apply_process_response(Method::Options, None, &retry_response).await?;
                Ok(())
            }
            _ => Err(self.fail_bad_response(&response).await),
        }
    }

    async fn run_announce(&mut self, client_ip: &str) -> Result<()> {
        let encrypt = self.receiver.capabilities.requires_rsa_encryption();
        let sdp = self
            .session
            .prepare_announce(client_ip, encrypt)
            .map_err(AirTunesError::CodecError)?;
        let mut request = self.session.announce_request(&sdp);
        self.attach_digest_if_known(&mut request, Method::Announce.as_str());

        let response = self.send_and_receive(&request).await?;
        if response.status.as_u16() == 401 {
            self.cleanup().await;
            return Err(AirTunesError::WrongPassword);
        }
        if !response.status.is_success() {
            return Err(self.fail_bad_response(&response).await);
        }
        self.apply_process_response(Method::Announce, None, &response).await
    }

    async fn run_setup(&mut self, control_port: u16, timing_port: u16) -> Result<()> {
        let mut request = self.session.setup_request(control_port, timing_port);
        self.attach_digest_if_known(&mut request, Method::Setup.as_str());

        let response = self.send_and_receive(&request).await?;
        if !response.status.is_success() {
            return Err(self.fail_bad_response(&response).await);
        }
        self.apply_process_response(Method::Setup, None, &response).await?;

        if let Some(transport) = self.session.transport() {
            self.receiver.server_port = Some(transport.server_port);
            self.receiver.control_port = Some(transport.control_port);
            self.receiver.timing_port = Some(transport.timing_port);
        }
        self.receiver.audio_latency = Some(self.session.audio_latency());
        self.receiver.client_control_port = Some(control_port);
        self.receiver.client_timing_port = Some(timing_port);
        self.receiver.session_id = self.session.session_id().map(str::to_string);
        Ok(())
    }

    async fn run_record(&mut self, start_seq: u32) -> Result<()> {
        let rtptime = crate::seq::rtp_ts(start_seq);
        let mut request = self.session.record_request(crate::seq::low16(start_seq), rtptime);
        self.attach_digest_if_known(&mut request, Method::Record.as_str());

        let response = self.send_and_receive(&request).await?;
        if !response.status.is_success() {
            return Err(self.fail_bad_response(&response).await);
        }
        self.apply_process_response(Method::Record, None, &response).await
    }

    async fn pair_verify(&mut self, credentials: &Credentials) -> Result<()> {
        let state =
            PairVerifyState::new(&credentials.auth_secret).map_err(|e| AirTunesError::PairingFailed(e.to_string()))?;

        let first = self.session.pairing_post_request("pair-verify", state.first_request_body());
        let first_response = self.send_and_receive(&first).await?;
        if !first_response.status.is_success() {
            return Err(self.fail_bad_response(&first_response).await);
        }
        let atv_pub = extract_atv_curve_public(&first_response.body).ok_or_else(|| AirTunesError::AuthenticationFailed {
            message: "pair-verify response shorter than 32 bytes".to_string(),
            recoverable: false,
        })?;

        let second_body = state
            .second_request_body(atv_pub)
            .map_err(|e| AirTunesError::AuthenticationFailed { message: e.to_string(), recoverable: true })?;
        let second = self.session.pairing_post_request("pair-verify", second_body);
        let second_response = self.send_and_receive(&second).await?;
        if !second_response.status.is_success() {
            return Err(AirTunesError::AuthenticationFailed {
                message: format!("pair-verify rejected: {}", second_response.status.as_u16()),
                recoverable: false,
            });
        }

        self.receiver.last_credentials = Some(credentials.clone());
        Ok(())
    }

    /// Generic helper for the post-handshake commands (FLUSH, SET_PARAMETER,
    /// variants): send, map any non-success status to the terminal path, and
    /// advance session state on success.
    async fn command_roundtrip(
        &mut self,
        method: Method,
        set_parameter_kind: Option<SetParameterKind>,
        mut request: RtspRequest,
    ) -> Result<()> {
        self.attach_digest_if_known(&mut request, method.as_str());
        let response = self.send_and_receive(&request).await?;
        if response.status.as_u16() == 453 {
            self.cleanup().await;
            return Err(AirTunesError::NotEnoughBandwidth);
        }
        if !response.status.is_success() {
            return Err(self.fail_bad_response(&response).await);
        }
        self.apply_process_response(method, set_parameter_kind, &response).await
    }

    async fn apply_process_response(
        &mut self,
        method: Method,
        set_parameter_kind: Option<SetParameterKind>,
        response: &RtspResponse,
    ) -> Result<()> {
        match self.session.process_response(method, set_parameter_kind, response) {
            Ok(()) => {
                self.receiver.status = self.session.state();
                Ok(())
            }
            Err(message) => Err(self.fail_bad_response_with_message(response, message).await),
        }
    }

    fn attach_digest_if_known(&self, request: &mut RtspRequest, method: &str) {
        if let (Some(digest), Some(password)) = (&self.receiver.digest_info, &self.receiver.last_password) {
            request
                .headers
                .insert(names::AUTHORIZATION, digest.authorization_header(DIGEST_USERNAME, password, method, &request.uri));
        }
    }

    async fn send_and_receive(&mut self, request: &RtspRequest) -> Result<RtspResponse> {
        let outcome = async {
            let connection = self
                .connection
                .as_mut()
                .ok_or_else(|| AirTunesError::invalid_state("no open RTSP connection", self.session.state()))?;
            connection.send_request(request).await?;
            connection.get_response_default().await
        }
        .await;

        if let Err(ref error) = outcome {
            tracing::warn!(target: CLIENT_TARGET, %error, "RTSP round trip failed, closing connection");
            self.cleanup().await;
        }
        outcome
    }

    async fn fail_bad_response(&mut self, response: &RtspResponse) -> AirTunesError {
        self.cleanup().await;
        AirTunesError::bad_response(response.status.as_u16(), response.reason.clone())
    }

    async fn fail_bad_response_with_message(&mut self, response: &RtspResponse, message: String) -> AirTunesError {
        self.cleanup().await;
        AirTunesError::RtspError { message, status_code: Some(response.status.as_u16()) }
    }

    /// Best-effort TEARDOWN already attempted by the caller (or skipped on a
    /// transport failure); close the socket and reset to `Closed`.
    async fn cleanup(&mut self) {
        if let Some(connection) = self.connection.take() {
            connection.close().await;
        }
        self.receiver.status = RaopSessionState::Closed;
        tracing::debug!(target: CLIENT_TARGET, receiver = %self.receiver.service_name, "connection_closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn test_receiver() -> Receiver {
        Receiver::new("AABBCCDDEEFF@Test", Ipv4Addr::new(127, 0, 0, 1), 5000)
    }

    #[test]
    fn new_client_starts_with_no_connection() {
        let client = RaopClient::new(test_receiver());
        assert!(client.connection.is_none());
        assert_eq!(client.receiver().status, RaopSessionState::Closed);
    }

    #[tokio::test]
    async fn repair_without_prior_connect_reports_no_credentials() {
        let mut client = RaopClient::new(test_receiver());
        let result = client.repair_connection(0).await;
        assert!(matches!(result, Err(AirTunesError::NoCredentials)));
    }

    #[tokio::test]
    async fn disconnect_with_no_connection_is_a_no_op() {
        let mut client = RaopClient::new(test_receiver());
        client.disconnect().await;
        assert_eq!(client.receiver().status, RaopSessionState::Closed);
    }
}
