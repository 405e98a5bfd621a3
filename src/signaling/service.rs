//! Central rendezvous that assigns context ids and vaddrs (C2).
//!
//! Structured the way the source codebase structures its own middleware: an
//! acceptor thread hands each connection off, and a single thread owns all
//! mutable state, so the context/vaddr tables never need a `Mutex` -- only
//! one thread ever touches them.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam::crossbeam_channel::unbounded;
use crossbeam::Sender;

use super::protocol::{SignalingRequest, SignalingResponse};
use crate::error::GraybatError;
use crate::transport::{Connection, Endpoint};

/// Poll period for the acceptor's non-blocking shutdown check, matching the
/// message box's own ≤100ms periodic wake idiom.
const ACCEPT_POLL_INTERVAL: Duration = Duration::from_millis(50);

struct ContextEntry {
    id: u32,
    /// (data_uri, ctrl_uri), indexed by vaddr.
    phone_book: Vec<(String, String)>,
    ref_count: usize,
}

struct Registry {
    contexts_by_name: HashMap<String, ContextEntry>,
    contexts_by_id: HashMap<u32, String>,
    next_context_id: u32,
}

impl Registry {
    fn new() -> Self {
        Registry {
            contexts_by_name: HashMap::new(),
            contexts_by_id: HashMap::new(),
            next_context_id: 0,
        }
    }

    fn request_context(&mut self, name: String) -> u32 {
        if let Some(entry) = self.contexts_by_name.get_mut(&name) {
            entry.ref_count += 1;
            return entry.id;
        }

        let id = self.next_context_id;
        self.next_context_id += 1;
        self.contexts_by_name.insert(
            name.clone(),
            ContextEntry {
                id,
                phone_book: Vec::new(),
                ref_count: 1,
            },
        );
        self.contexts_by_id.insert(id, name);
        id
    }

    fn request_vaddr(&mut self, context_id: u32, data_uri: String, ctrl_uri: String) -> u32 {
        let name = match self.contexts_by_id.get(&context_id) {
            Some(name) => name.clone(),
            None => return 0,
        };
        match self.contexts_by_name.get_mut(&name) {
            Some(entry) => {
                entry.phone_book.push((data_uri, ctrl_uri));
                (entry.phone_book.len() - 1) as u32
            }
            None => 0,
        }
    }

    fn lookup_vaddr(&self, context_id: u32, vaddr: u32) -> (String, String) {
        self.contexts_by_id
            .get(&context_id)
            .and_then(|name| self.contexts_by_name.get(name))
            .and_then(|entry| entry.phone_book.get(vaddr as usize))
            .cloned()
            .unwrap_or_else(|| (String::new(), String::new()))
    }

    fn leave_context(&mut self, name: &str) {
        let drop_it = match self.contexts_by_name.get_mut(name) {
            Some(entry) => {
                entry.ref_count = entry.ref_count.saturating_sub(1);
                entry.ref_count == 0
            }
            None => false,
        };
        if drop_it {
            if let Some(entry) = self.contexts_by_name.remove(name) {
                self.contexts_by_id.remove(&entry.id);
            }
        }
    }
}

/// A running signaling service. Dropping the handle does not stop the
/// service; call `shutdown` explicitly.
pub struct SignalingService {
    port: u16,
    stop: Arc<AtomicBool>,
    acceptor: Option<JoinHandle<()>>,
    owner: Option<JoinHandle<()>>,
}

impl SignalingService {
    /// Binds to `base_port` (or the next free port) and starts serving
    /// requests in the background.
    pub fn spawn(base_port: u16) -> Result<Self, GraybatError> {
        let endpoint = Arc::new(Endpoint::bind(base_port, 256)?);
        let port = endpoint.port();
        let stop = Arc::new(AtomicBool::new(false));

        let (request_tx, request_rx) = unbounded::<(SignalingRequest, Sender<SignalingResponse>)>();

        let owner = thread::Builder::new()
            .name("signaling-owner".to_string())
            .spawn(move || {
                let mut registry = Registry::new();
                while let Ok((request, reply)) = request_rx.recv() {
                    let response = match request {
                        SignalingRequest::RequestContext { name } => {
                            SignalingResponse::ContextId(registry.request_context(name))
                        }
                        SignalingRequest::RequestVaddr {
                            context_id,
                            data_uri,
                            ctrl_uri,
                        } => SignalingResponse::Vaddr(registry.request_vaddr(
                            context_id,
                            data_uri,
                            ctrl_uri,
                        )),
                        SignalingRequest::LookupVaddr { context_id, vaddr } => {
                            let (data, ctrl) = registry.lookup_vaddr(context_id, vaddr);
                            SignalingResponse::Uris(data, ctrl)
                        }
                        SignalingRequest::LeaveContext { name } => {
                            registry.leave_context(&name);
                            SignalingResponse::Ack
                        }
                    };
                    // The client may already be gone; that is not our problem.
                    let _ = reply.send(response);
                }
            })
            .expect("ERROR: Failed to spawn signaling owner thread");

        let acceptor_stop = Arc::clone(&stop);
        let acceptor = thread::Builder::new()
            .name("signaling-acceptor".to_string())
            .spawn(move || {
                endpoint
                    .set_nonblocking(true)
                    .expect("ERROR: Failed to set signaling listener non-blocking");

                while !acceptor_stop.load(Ordering::Relaxed) {
                    match endpoint.accept() {
                        Ok(conn) => {
                            let tx = request_tx.clone();
                            thread::spawn(move || handle_connection(conn, tx));
                        }
                        Err(_) => {
                            thread::sleep(ACCEPT_POLL_INTERVAL);
                        }
                    }
                }
            })
            .expect("ERROR: Failed to spawn signaling acceptor thread");

        Ok(SignalingService {
            port,
            stop,
            acceptor: Some(acceptor),
            owner: Some(owner),
        })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn shutdown(mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.acceptor.take() {
            let _ = handle.join();
        }
        // Dropping request_tx (owned by the acceptor, now finished) closes
        // the channel, which ends the owner thread's recv loop.
        if let Some(handle) = self.owner.take() {
            let _ = handle.join();
        }
    }
}

fn handle_connection(mut conn: Connection, request_tx: Sender<(SignalingRequest, Sender<SignalingResponse>)>) {
    let mut raw = Vec::new();
    if conn.receive_prefix_size(&mut raw).is_err() {
        return;
    }

    let request: SignalingRequest = match bincode::deserialize(&raw) {
        Ok(r) => r,
        Err(_) => return,
    };

    let (reply_tx, reply_rx) = unbounded();
    if request_tx.send((request, reply_tx)).is_err() {
        return;
    }

    if let Ok(response) = reply_rx.recv() {
        if let Ok(encoded) = bincode::serialize(&response) {
            let _ = conn.send_prefix_size(&encoded);
        }
    }
}
