//! Two-round-trip operation driver.
//!
//! Connects, authenticates the server in-band, performs exactly one
//! operation, and closes. The session state machine decides what to send
//! and whether the signature verifies; this module only moves frames.

use postalghost_core::{
    ClientAction, ClientSession, Environment, OperationOutcome, OperationRequest, SystemEnv,
};

use crate::{error::ClientError, transport};

/// One key server as the client addresses it: where to connect and which
/// Ed25519 key it must prove before anything else happens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyServer {
    /// Server address in `host:port` form.
    pub host: String,
    /// Ed25519 verifying key the server must sign the challenge with.
    pub pk: [u8; 32],
}

/// Perform one operation against one server.
///
/// Opens a fresh connection, runs the challenge round trip, and sends the
/// operation only after the server's signature verifies. The connection is
/// closed before returning either way.
///
/// # Errors
///
/// - `ClientError::Auth` if the server's signature does not verify; the
///   operation (and any handle inside it) was never sent
/// - `ClientError::Rejected` if the server answered with an error payload
/// - `ClientError::Transport` / `ClientError::Protocol` for broken
///   connections and malformed or out-of-order frames
pub async fn perform(
    host: &str,
    server_pk: [u8; 32],
    request: OperationRequest,
) -> Result<OperationOutcome, ClientError> {
    let env = SystemEnv::new();
    let mut conn = transport::connect(host).await?;
    let mut session = ClientSession::new(server_pk, request);

    let opening = session.start(env.random_array()).map_err(ClientError::from)?;
    if let Err(err) = drive(&mut conn, &mut session, opening).await {
        conn.close("session failed");
        return Err(err);
    }

    match session.take_outcome() {
        Some(OperationOutcome::Rejected { code, message }) => {
            Err(ClientError::Rejected { code, message })
        },
        Some(outcome) => Ok(outcome),
        None => Err(ClientError::Protocol("session ended without a response".to_owned())),
    }
}

/// Execute actions and feed response frames back in until the session asks
/// to close.
async fn drive(
    conn: &mut transport::ServerConnection,
    session: &mut ClientSession,
    mut actions: Vec<ClientAction>,
) -> Result<(), ClientError> {
    loop {
        for action in actions {
            match action {
                ClientAction::SendFrame(frame) => conn.send_frame(&frame).await?,
                ClientAction::Close { reason } => {
                    conn.close(&reason);
                    return Ok(());
                },
            }
        }

        let frame = conn.recv_frame().await?;
        actions = session.handle_frame(&frame).map_err(ClientError::from)?;
    }
}
