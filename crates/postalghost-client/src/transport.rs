//! QUIC transport for client connections.
//!
//! TLS encrypts the channel but does not authenticate the server: key
//! servers present self-signed, usually ephemeral certificates, so the
//! client accepts any certificate on purpose. Server identity is proven
//! in-band by the Ed25519 challenge handshake against the public key from
//! the share package. An interceptor can hold the channel, but without the
//! server's signing key it can never produce the signature that convinces
//! the session layer to send an operation.

use std::{
    net::{Ipv4Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};

use postalghost_proto::{ALPN_PROTOCOL, Frame, FrameHeader};
use quinn::{Endpoint, crypto::rustls::QuicClientConfig};
use rustls::{
    DigitallySignedStruct, SignatureScheme,
    client::danger::{HandshakeSignatureValid, ServerCertVerified, ServerCertVerifier},
    pki_types::{CertificateDer, ServerName, UnixTime},
};

use crate::error::ClientError;

/// Idle timeout after which quinn abandons a silent connection.
///
/// Covers both a stalled TLS handshake and a server that stops mid-session,
/// so probes against dead hosts fail instead of hanging forever.
const IDLE_TIMEOUT: Duration = Duration::from_secs(30);

/// One QUIC connection carrying one two-round-trip session.
///
/// Both round trips travel on a single bidirectional stream. There is no
/// frame multiplexing: the session protocol is strictly send-then-receive,
/// so the stream pair is all the state a driver needs.
pub struct ServerConnection {
    connection: quinn::Connection,
    send: quinn::SendStream,
    recv: quinn::RecvStream,
}

impl ServerConnection {
    /// Encode and send one frame.
    ///
    /// # Errors
    ///
    /// - `ClientError::Protocol` if the frame fails to encode
    /// - `ClientError::Transport` if the stream write fails
    pub async fn send_frame(&mut self, frame: &Frame) -> Result<(), ClientError> {
        let mut buf = Vec::with_capacity(FrameHeader::SIZE + frame.payload.len());
        frame.encode(&mut buf).map_err(|e| ClientError::Protocol(e.to_string()))?;

        self.send
            .write_all(&buf)
            .await
            .map_err(|e| ClientError::Transport(format!("write failed: {e}")))?;

        Ok(())
    }

    /// Read one length-prefixed frame.
    ///
    /// # Errors
    ///
    /// - `ClientError::Transport` if the stream ends or the read fails
    /// - `ClientError::Protocol` if the header or frame fails validation
    pub async fn recv_frame(&mut self) -> Result<Frame, ClientError> {
        let mut header_bytes = [0u8; FrameHeader::SIZE];
        self.recv
            .read_exact(&mut header_bytes)
            .await
            .map_err(|e| ClientError::Transport(format!("header read failed: {e}")))?;

        // Validates magic, version, flags, and the payload cap before any
        // allocation happens.
        let header = *FrameHeader::from_bytes(&header_bytes)
            .map_err(|e| ClientError::Protocol(e.to_string()))?;

        let payload_size = header.payload_size() as usize;
        let mut buf = vec![0u8; FrameHeader::SIZE + payload_size];
        buf[..FrameHeader::SIZE].copy_from_slice(&header_bytes);

        if payload_size > 0 {
            self.recv
                .read_exact(&mut buf[FrameHeader::SIZE..])
                .await
                .map_err(|e| ClientError::Transport(format!("payload read failed: {e}")))?;
        }

        Frame::decode(&buf).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    /// Close the connection immediately.
    ///
    /// The final response has already been read by the time a driver calls
    /// this, so there is nothing left to drain.
    pub fn close(&self, reason: &str) {
        self.connection.close(quinn::VarInt::from_u32(0), reason.as_bytes());
    }
}

/// Connect to a server and open the session stream.
///
/// # Errors
///
/// - `ClientError::Transport` if the address is malformed, the endpoint
///   cannot bind, or the QUIC handshake fails
pub async fn connect(host: &str) -> Result<ServerConnection, ClientError> {
    let addr: SocketAddr = host
        .parse()
        .map_err(|_| ClientError::Transport(format!("invalid server address: {host}")))?;

    let local = SocketAddr::from((Ipv4Addr::UNSPECIFIED, 0));
    let mut endpoint = Endpoint::client(local)
        .map_err(|e| ClientError::Transport(format!("failed to bind endpoint: {e}")))?;
    endpoint.set_default_client_config(insecure_client_config()?);

    // The server name is irrelevant: the certificate is never verified.
    let connection = endpoint
        .connect(addr, "localhost")
        .map_err(|e| ClientError::Transport(format!("connect failed: {e}")))?
        .await
        .map_err(|e| ClientError::Transport(format!("connection failed: {e}")))?;

    tracing::debug!(server = %addr, "Connected");

    let (send, recv) = connection
        .open_bi()
        .await
        .map_err(|e| ClientError::Transport(format!("failed to open stream: {e}")))?;

    Ok(ServerConnection { connection, send, recv })
}

/// Client TLS config that skips certificate verification.
fn insecure_client_config() -> Result<quinn::ClientConfig, ClientError> {
    let mut crypto = rustls::ClientConfig::builder()
        .dangerous()
        .with_custom_certificate_verifier(Arc::new(InsecureCertVerifier))
        .with_no_client_auth();
    crypto.alpn_protocols = vec![ALPN_PROTOCOL.to_vec()];

    let quic_crypto = QuicClientConfig::try_from(crypto)
        .map_err(|e| ClientError::Transport(format!("tls config rejected: {e}")))?;

    let mut config = quinn::ClientConfig::new(Arc::new(quic_crypto));
    let mut transport = quinn::TransportConfig::default();
    transport.max_idle_timeout(IDLE_TIMEOUT.try_into().ok());
    config.transport_config(Arc::new(transport));

    Ok(config)
}

/// Certificate verifier that accepts everything.
///
/// Sound only because of the in-band identity handshake: a server that
/// passes TLS with a forged certificate still cannot sign the client's
/// challenge, and the client sends nothing of substance until it can.
#[derive(Debug)]
struct InsecureCertVerifier;

impl ServerCertVerifier for InsecureCertVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &CertificateDer<'_>,
        _intermediates: &[CertificateDer<'_>],
        _server_name: &ServerName<'_>,
        _ocsp_response: &[u8],
        _now: UnixTime,
    ) -> Result<ServerCertVerified, rustls::Error> {
        Ok(ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &CertificateDer<'_>,
        _dss: &DigitallySignedStruct,
    ) -> Result<HandshakeSignatureValid, rustls::Error> {
        Ok(HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<SignatureScheme> {
        vec![
            SignatureScheme::RSA_PKCS1_SHA1,
            SignatureScheme::ECDSA_SHA1_Legacy,
            SignatureScheme::RSA_PKCS1_SHA256,
            SignatureScheme::ECDSA_NISTP256_SHA256,
            SignatureScheme::RSA_PKCS1_SHA384,
            SignatureScheme::ECDSA_NISTP384_SHA384,
            SignatureScheme::RSA_PKCS1_SHA512,
            SignatureScheme::ECDSA_NISTP521_SHA512,
            SignatureScheme::RSA_PSS_SHA256,
            SignatureScheme::RSA_PSS_SHA384,
            SignatureScheme::RSA_PSS_SHA512,
            SignatureScheme::ED25519,
        ]
    }
}
