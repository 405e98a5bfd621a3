//! The send-side socket table, and the single mutex that serializes every
//! write across it so two frames never interleave on the same stream.

use std::sync::Mutex;

use crate::error::GraybatError;
use crate::frame::{Frame, MsgType};
use crate::transport::Connection;

/// The two outbound connections to one physical peer, indexed by that peer's
/// global vaddr in `SocketTable`.
pub(crate) struct PeerSockets {
    pub(crate) data: Connection,
    pub(crate) ctrl: Connection,
}

#[derive(Clone, Copy, PartialEq, Eq)]
pub(crate) enum Channel {
    Data,
    Ctrl,
}

/// Holds every send socket behind one lock. Locking it is what the source
/// codebase calls the "send mutex": whichever thread holds the guard is the
/// only one allowed to write a frame, to any peer, until it is done.
pub(crate) struct SocketTable {
    sockets: Mutex<Vec<PeerSockets>>,
}

impl SocketTable {
    pub(crate) fn empty() -> Self {
        SocketTable {
            sockets: Mutex::new(Vec::new()),
        }
    }

    pub(crate) fn install(&self, sockets: Vec<PeerSockets>) {
        *self.sockets.lock().unwrap() = sockets;
    }

    pub(crate) fn len(&self) -> usize {
        self.sockets.lock().unwrap().len()
    }

    /// Encodes and writes one frame to `global_vaddr`'s socket on `channel`.
    pub(crate) fn write_frame(
        &self,
        global_vaddr: u32,
        channel: Channel,
        msg_type: MsgType,
        msg_id: u32,
        context_id: u32,
        src_vaddr: u32,
        tag: u32,
        payload: Vec<u8>,
    ) -> Result<(), GraybatError> {
        let bytes = Frame::encode(msg_type, msg_id, context_id, src_vaddr, tag, payload);
        let mut guard = self.sockets.lock().unwrap();
        let peer = guard
            .get_mut(global_vaddr as usize)
            .ok_or(GraybatError::ContextInvalid)?;
        let conn = match channel {
            Channel::Data => &mut peer.data,
            Channel::Ctrl => &mut peer.ctrl,
        };
        conn.send_prefix_size(&bytes)
    }
}
