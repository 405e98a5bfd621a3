//! The data- and control-channel reader tasks.
//!
//! Plain `TcpStream` cannot multiplex the way the source codebase's single
//! ZMQ-style socket did, so the "two receiver tasks" described for the
//! policy become one reader thread per accepted connection, all feeding the
//! same pair of message boxes. Each still ends on `Destruct`, matching the
//! original teardown contract.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::thread;
use std::time::Duration;

use crate::frame::{Frame, MsgType};
use crate::msgbox::MessageBox;
use crate::transport::Connection;

use super::context::{ContextId, Vaddr};
use super::sockets::{Channel, SocketTable};

/// State a reader thread needs that is not private to the connection it
/// owns: the send-socket table (to answer PEER frames with CONFIRM) and the
/// per-context membership whitelists (since a split context is only a
/// subset of the global one -- its vaddrs are never renumbered, so there is
/// nothing to translate, only to validate).
pub(crate) struct ReceiverShared {
    pub(crate) sockets: Arc<SocketTable>,
    pub(crate) context_members: RwLock<HashMap<ContextId, Vec<Vaddr>>>,
    /// This peer's vaddr. Fixed at bootstrap: a split never changes a
    /// peer's own identity, so there is no per-context lookup to make.
    pub(crate) own_vaddr: Vaddr,
    pub(crate) inbox: Arc<MessageBox>,
    pub(crate) ctrlbox: Arc<MessageBox>,
}

impl ReceiverShared {
    fn is_member_of(&self, context_id: ContextId, src_vaddr: Vaddr) -> Option<Vaddr> {
        self.context_members
            .read()
            .unwrap()
            .get(&context_id)
            .filter(|members| members.contains(&src_vaddr))
            .map(|_| src_vaddr)
    }

    /// Sends a CONFIRM on the control channel for a PEER frame that has
    /// just been durably stored in the inbox, retrying briefly if our own
    /// bootstrap has not finished installing the sockets/membership tables
    /// yet. Must only be called *after* the enqueue that backpressure might
    /// have blocked on, so a CONFIRM is never sent for a message the
    /// receiver hasn't actually room for.
    fn send_confirm(&self, context_id: ContextId, src_vaddr: Vaddr, tag: u32, msg_id: u32) {
        for _ in 0..50 {
            if let Some(global) = self.is_member_of(context_id, src_vaddr) {
                let _ = self.sockets.write_frame(
                    global,
                    Channel::Ctrl,
                    MsgType::Confirm,
                    msg_id,
                    context_id,
                    self.own_vaddr,
                    tag,
                    Vec::new(),
                );
                return;
            }
            thread::sleep(Duration::from_millis(20));
        }
        log::error!(
            "could not confirm message {} in context {}: membership never resolved",
            msg_id,
            context_id
        );
    }
}

pub(crate) fn spawn_data_reader(conn: Connection, shared: Arc<ReceiverShared>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("graybat-data-reader".to_string())
        .spawn(move || data_reader_loop(conn, shared))
        .expect("ERROR: Failed to spawn data reader thread")
}

pub(crate) fn spawn_ctrl_reader(conn: Connection, shared: Arc<ReceiverShared>) -> thread::JoinHandle<()> {
    thread::Builder::new()
        .name("graybat-ctrl-reader".to_string())
        .spawn(move || ctrl_reader_loop(conn, shared))
        .expect("ERROR: Failed to spawn control reader thread")
}

fn data_reader_loop(mut conn: Connection, shared: Arc<ReceiverShared>) {
    loop {
        let mut raw = Vec::new();
        if conn.receive_prefix_size(&mut raw).is_err() {
            return;
        }
        let frame = match Frame::decode(&raw) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("dropping malformed data frame: {}", e);
                continue;
            }
        };

        match frame.header.msg_type {
            MsgType::Destruct => return,
            MsgType::Peer => {
                let (context_id, src_vaddr, tag, msg_id) =
                    (frame.header.context_id, frame.header.src_vaddr, frame.header.tag, frame.header.msg_id);
                // Backpressure lives here: enqueue blocks while the inbox is
                // at its high-water mark, so the CONFIRM below is delayed
                // right along with it.
                shared.inbox.enqueue(MsgType::Peer, context_id, src_vaddr, tag, frame);
                shared.send_confirm(context_id, src_vaddr, tag, msg_id);
            }
            MsgType::Split => {
                shared.inbox.enqueue(
                    MsgType::Split,
                    frame.header.context_id,
                    frame.header.src_vaddr,
                    frame.header.tag,
                    frame,
                );
            }
            MsgType::Confirm => {
                log::error!("protocol violation: CONFIRM received on data channel");
            }
        }
    }
}

fn ctrl_reader_loop(mut conn: Connection, shared: Arc<ReceiverShared>) {
    loop {
        let mut raw = Vec::new();
        if conn.receive_prefix_size(&mut raw).is_err() {
            return;
        }
        let frame = match Frame::decode(&raw) {
            Ok(f) => f,
            Err(e) => {
                log::warn!("dropping malformed control frame: {}", e);
                continue;
            }
        };

        match frame.header.msg_type {
            MsgType::Destruct => return,
            MsgType::Confirm => {
                shared.ctrlbox.enqueue(
                    MsgType::Confirm,
                    frame.header.context_id,
                    frame.header.src_vaddr,
                    frame.header.tag,
                    frame,
                );
            }
            other => {
                log::error!("protocol violation: {:?} received on control channel", other);
            }
        }
    }
}
