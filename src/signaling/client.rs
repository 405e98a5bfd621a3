//! Client side of the signaling protocol (C2).

use std::thread;
use std::time::Duration;

use super::protocol::{SignalingRequest, SignalingResponse};
use crate::error::GraybatError;
use crate::transport::Connection;

/// Number of connection attempts made against the signaling service before
/// giving up with `SignalingUnreachable`.
const CONNECT_ATTEMPTS: u32 = 20;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(200);
const LOOKUP_POLL_DELAY: Duration = Duration::from_millis(100);

/// Talks to a `SignalingService` over a fresh TCP connection per call, the
/// same "dial, do one exchange, drop" pattern the source codebase's
/// handshake protocol uses.
pub struct SignalingClient {
    uri: String,
}

impl SignalingClient {
    pub fn new(uri: impl Into<String>) -> Self {
        SignalingClient { uri: uri.into() }
    }

    pub fn request_context(&self, name: &str) -> Result<u32, GraybatError> {
        match self.call(SignalingRequest::RequestContext {
            name: name.to_string(),
        })? {
            SignalingResponse::ContextId(id) => Ok(id),
            other => Err(protocol_violation(other)),
        }
    }

    pub fn request_vaddr(
        &self,
        context_id: u32,
        data_uri: &str,
        ctrl_uri: &str,
    ) -> Result<u32, GraybatError> {
        match self.call(SignalingRequest::RequestVaddr {
            context_id,
            data_uri: data_uri.to_string(),
            ctrl_uri: ctrl_uri.to_string(),
        })? {
            SignalingResponse::Vaddr(v) => Ok(v),
            other => Err(protocol_violation(other)),
        }
    }

    /// Single, non-retrying lookup. `None` means "not yet registered".
    pub fn lookup_vaddr(
        &self,
        context_id: u32,
        vaddr: u32,
    ) -> Result<Option<(String, String)>, GraybatError> {
        match self.call(SignalingRequest::LookupVaddr { context_id, vaddr })? {
            SignalingResponse::Uris(data, ctrl) => {
                if data.is_empty() && ctrl.is_empty() {
                    Ok(None)
                } else {
                    Ok(Some((data, ctrl)))
                }
            }
            other => Err(protocol_violation(other)),
        }
    }

    /// Polls `lookup_vaddr` until the peer at `vaddr` has registered.
    pub fn poll_lookup_vaddr(&self, context_id: u32, vaddr: u32) -> Result<(String, String), GraybatError> {
        loop {
            if let Some(uris) = self.lookup_vaddr(context_id, vaddr)? {
                return Ok(uris);
            }
            thread::sleep(LOOKUP_POLL_DELAY);
        }
    }

    pub fn leave_context(&self, name: &str) -> Result<(), GraybatError> {
        match self.call(SignalingRequest::LeaveContext {
            name: name.to_string(),
        })? {
            SignalingResponse::Ack => Ok(()),
            other => Err(protocol_violation(other)),
        }
    }

    fn call(&self, request: SignalingRequest) -> Result<SignalingResponse, GraybatError> {
        let mut conn = self.connect_with_retry()?;

        let encoded = bincode::serialize(&request)
            .expect("ERROR: Couldn't serialize signaling request");
        conn.send_prefix_size(&encoded)?;

        let mut raw = Vec::new();
        conn.receive_prefix_size(&mut raw)?;

        bincode::deserialize(&raw).map_err(|_| GraybatError::MalformedMessage(raw.len()))
    }

    fn connect_with_retry(&self) -> Result<Connection, GraybatError> {
        let mut last_err = None;
        for _ in 0..CONNECT_ATTEMPTS {
            match Connection::connect(&self.uri) {
                Ok(conn) => return Ok(conn),
                Err(e) => {
                    last_err = Some(e);
                    thread::sleep(CONNECT_RETRY_DELAY);
                }
            }
        }
        Err(GraybatError::SignalingUnreachable {
            uri: self.uri.clone(),
            source: std::io::Error::new(std::io::ErrorKind::TimedOut, last_err.unwrap()),
        })
    }
}

fn protocol_violation(_response: SignalingResponse) -> GraybatError {
    GraybatError::MalformedMessage(0)
}
