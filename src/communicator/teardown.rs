//! Shutdown: tell every reader thread to stop, join them, then release the
//! initial context with signaling.
//!
//! The source codebase's teardown sends one `Close`-equivalent message per
//! peer connection and lets each reader exit on its own; `split_context`
//! generalizes that here to every data and control socket we hold, not just
//! a loopback pair, since a plain `TcpStream` mesh has one reader thread per
//! physical connection rather than the original's two multiplexed ones.

use crate::error::GraybatError;
use crate::frame::MsgType;

use super::sockets::Channel;
use super::Communicator;

impl Communicator {
    /// Consumes the communicator: broadcasts `Destruct` on every socket,
    /// joins every reader thread, then leaves the initial context.
    pub fn shutdown(self) -> Result<(), GraybatError> {
        let size = self.global_context.size() as u32;
        for vaddr in 0..size {
            let msg_id = self.next_msg_id();
            if let Err(e) = self.sockets.write_frame(
                vaddr,
                Channel::Data,
                MsgType::Destruct,
                msg_id,
                self.global_context.id(),
                self.global_context.vaddr(),
                0,
                Vec::new(),
            ) {
                log::warn!("failed to send data Destruct to vaddr {}: {}", vaddr, e);
            }
            let msg_id = self.next_msg_id();
            if let Err(e) = self.sockets.write_frame(
                vaddr,
                Channel::Ctrl,
                MsgType::Destruct,
                msg_id,
                self.global_context.id(),
                self.global_context.vaddr(),
                0,
                Vec::new(),
            ) {
                log::warn!("failed to send control Destruct to vaddr {}: {}", vaddr, e);
            }
        }

        for handle in self.data_threads.lock().unwrap().drain(..) {
            let _ = handle.join();
        }
        for handle in self.ctrl_threads.lock().unwrap().drain(..) {
            let _ = handle.join();
        }

        self.signaling.leave_context(&self.config.context_name)
    }
}
