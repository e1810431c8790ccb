//! PostalGhost production server.
//!
//! Production server implementation using Quinn for QUIC transport, Tokio
//! for async runtime, and system time with cryptographic RNG.
//!
//! # Architecture
//!
//! This crate provides production "glue" that wraps [`postalghost_core`]'s
//! action-based session logic with real I/O. Each connection runs one
//! [`postalghost_core::ServerSession`]; its actions are executed here
//! against the QUIC stream and the [`Keeper`], which in turn runs key
//! operations against a [`KeyStore`].
//!
//! # Components
//!
//! - [`Keeper`]: Executes set/ping/get against the key store (pure logic)
//! - [`Server`]: Production runtime driving sessions over QUIC
//! - [`QuinnTransport`]: QUIC transport via Quinn library
//! - [`MemoryStore`] / [`RedbStore`]: Ephemeral and durable key stores

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod error;
pub mod identity;
mod keeper;
pub mod store;
mod transport;

use std::{collections::VecDeque, path::PathBuf, sync::Arc, time::Duration};

pub use error::ServerError;
pub use keeper::{Keeper, MAX_TIMELOCK_SECS};
use postalghost_core::{Environment, ServerAction, ServerIdentity, ServerSession, SystemEnv};
use postalghost_proto::{Frame, FrameHeader};
pub use store::{KeyStore, MemoryStore, RedbStore};
use tokio::sync::Semaphore;
pub use transport::{QuinnConnection, QuinnTransport};

/// Application close code for a normally completed session.
const CLOSE_OK: u32 = 0;
/// Application close code for malformed frames or protocol violations.
const CLOSE_PROTOCOL_ERROR: u32 = 1;
/// Application close code for internal failures (store errors).
const CLOSE_INTERNAL_ERROR: u32 = 2;

/// How long to wait for the client to read the final response before the
/// connection is torn down.
const CLOSE_GRACE: Duration = Duration::from_secs(5);

/// Server configuration for the production runtime.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind to (e.g., "0.0.0.0:4850")
    pub bind_address: String,
    /// Path to TLS certificate (PEM format)
    pub cert_path: Option<String>,
    /// Path to TLS private key (PEM format)
    pub key_path: Option<String>,
    /// Path to the Ed25519 identity seed file (created on first start)
    pub identity_path: PathBuf,
    /// Maximum concurrent connections
    pub max_connections: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:4850".to_string(),
            cert_path: None,
            key_path: None,
            identity_path: PathBuf::from("postalghost.identity"),
            max_connections: 1024,
        }
    }
}

/// Production PostalGhost server.
///
/// Generic over the key store so the same runtime serves the in-memory and
/// the durable store.
pub struct Server<S> {
    keeper: Keeper<S, SystemEnv>,
    identity: ServerIdentity,
    transport: QuinnTransport,
    env: SystemEnv,
    limit: Arc<Semaphore>,
}

impl<S: KeyStore> Server<S> {
    /// Create and bind a new server over the given store.
    ///
    /// Loads (or generates) the server identity, then binds the QUIC
    /// endpoint.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Config` for identity or TLS problems,
    /// `ServerError::Transport` if the endpoint cannot be bound.
    pub fn bind(config: &ServerConfig, store: S) -> Result<Self, ServerError> {
        let env = SystemEnv::new();

        let identity = identity::load_or_generate(&config.identity_path, &env)?;
        tracing::info!(
            public_key = %hex::encode(identity.verifying_key()),
            "Server identity loaded"
        );

        let transport = QuinnTransport::bind(
            &config.bind_address,
            config.cert_path.clone(),
            config.key_path.clone(),
        )?;

        Ok(Self {
            keeper: Keeper::new(store, env.clone()),
            identity,
            transport,
            env,
            limit: Arc::new(Semaphore::new(config.max_connections)),
        })
    }

    /// Public half of the server identity.
    ///
    /// This is the key clients pin; operators publish it alongside the
    /// server address.
    #[must_use]
    pub fn public_key(&self) -> [u8; 32] {
        self.identity.verifying_key()
    }

    /// Local address the server is bound to.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Transport` if the socket address cannot be
    /// read.
    pub fn local_addr(&self) -> Result<std::net::SocketAddr, ServerError> {
        self.transport.local_addr()
    }

    /// Run the server, accepting connections and serving sessions.
    ///
    /// This method runs until the server is shut down or an error occurs.
    ///
    /// # Errors
    ///
    /// Returns `ServerError::Transport` if the connection limiter breaks;
    /// per-connection failures are logged and do not stop the server.
    pub async fn run(self) -> Result<(), ServerError> {
        tracing::info!("Server listening on {}", self.transport.local_addr()?);

        loop {
            // Stop accepting while at capacity instead of queueing work.
            let permit = Arc::clone(&self.limit)
                .acquire_owned()
                .await
                .map_err(|e| ServerError::Transport(format!("connection limiter closed: {e}")))?;

            match self.transport.accept().await {
                Ok(conn) => {
                    let keeper = self.keeper.clone();
                    let identity = self.identity.clone();
                    let env = self.env.clone();

                    tokio::spawn(async move {
                        let remote = conn.remote_addr();
                        tracing::debug!(%remote, "Connection accepted");

                        if let Err(e) = handle_connection(conn, &keeper, &identity, &env).await {
                            tracing::debug!(%remote, "Connection error: {e}");
                        }

                        drop(permit);
                    });
                },
                Err(e) => {
                    tracing::error!("Accept error: {e}");
                    drop(permit);
                },
            }
        }
    }
}

/// Serve one connection: a single bidirectional stream carrying the
/// handshake round trip and the operation round trip.
///
/// Structural failures (malformed frames, out-of-order opcodes, store
/// errors) close the connection without a response payload; semantic
/// rejections have already been turned into error payloads by the keeper.
async fn handle_connection<S: KeyStore>(
    conn: QuinnConnection,
    keeper: &Keeper<S, SystemEnv>,
    identity: &ServerIdentity,
    env: &SystemEnv,
) -> Result<(), ServerError> {
    let (mut send, mut recv) = conn.accept_bi().await?;
    let mut session = ServerSession::new();

    loop {
        let frame = match read_frame(&mut recv).await {
            Ok(frame) => frame,
            Err(err) => {
                conn.close(CLOSE_PROTOCOL_ERROR.into(), b"protocol error");
                return Err(err);
            },
        };

        let mut pending: VecDeque<ServerAction> = match session.handle_frame(&frame, identity) {
            Ok(actions) => actions.into(),
            Err(err) => {
                conn.close(CLOSE_PROTOCOL_ERROR.into(), b"session error");
                return Err(err.into());
            },
        };

        while let Some(action) = pending.pop_front() {
            match action {
                ServerAction::SendFrame(frame) => {
                    write_frame(&mut send, &frame).await?;
                },

                ServerAction::Execute(request) => {
                    let response = match keeper.execute(request) {
                        Ok(payload) => payload,
                        Err(err) => {
                            tracing::error!("Operation failed: {err}");
                            conn.close(CLOSE_INTERNAL_ERROR.into(), b"internal error");
                            return Err(err.into());
                        },
                    };

                    for action in session.complete(response)? {
                        pending.push_back(action);
                    }
                },

                ServerAction::Close { reason } => {
                    let _ = send.finish();

                    // Let the client drain the response before tearing the
                    // connection down.
                    tokio::select! {
                        () = conn.closed() => {},
                        () = env.sleep(CLOSE_GRACE) => {
                            conn.close(CLOSE_OK.into(), reason.as_bytes());
                        },
                    }

                    return Ok(());
                },
            }
        }
    }
}

/// Read one length-prefixed frame from the stream.
async fn read_frame(recv: &mut quinn::RecvStream) -> Result<Frame, ServerError> {
    let mut header_bytes = [0u8; FrameHeader::SIZE];
    recv.read_exact(&mut header_bytes)
        .await
        .map_err(|e| ServerError::Transport(format!("header read failed: {e}")))?;

    // Validates magic, version, flags, and the payload cap before any
    // allocation happens.
    let header =
        *FrameHeader::from_bytes(&header_bytes).map_err(|e| ServerError::Protocol(e.to_string()))?;

    let payload_size = header.payload_size() as usize;
    let mut buf = vec![0u8; FrameHeader::SIZE + payload_size];
    buf[..FrameHeader::SIZE].copy_from_slice(&header_bytes);

    if payload_size > 0 {
        recv.read_exact(&mut buf[FrameHeader::SIZE..])
            .await
            .map_err(|e| ServerError::Transport(format!("payload read failed: {e}")))?;
    }

    Frame::decode(&buf).map_err(|e| ServerError::Protocol(e.to_string()))
}

/// Encode and write one frame to the stream.
async fn write_frame(send: &mut quinn::SendStream, frame: &Frame) -> Result<(), ServerError> {
    let mut buf = Vec::with_capacity(FrameHeader::SIZE + frame.payload.len());
    frame.encode(&mut buf).map_err(|e| ServerError::Protocol(e.to_string()))?;

    send.write_all(&buf)
        .await
        .map_err(|e| ServerError::Transport(format!("write failed: {e}")))?;

    Ok(())
}
