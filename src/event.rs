//! Handles representing in-flight async operations and receive probes (C7).

use std::sync::Arc;

use crate::frame::MsgType;
use crate::msgbox::MessageBox;

/// Returned by `probe`; carries enough information for the caller to size
/// the receive buffer before calling `recv`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub source: u32,
    pub tag: u32,
    /// Payload size in bytes (header already subtracted).
    pub size: usize,
}

enum Awaiting<'a> {
    /// A send event: becomes ready once a CONFIRM with the matching msg_id
    /// is dequeued from the control box for `(context_id, peer_vaddr, tag)`.
    Confirm { ctrlbox: Arc<MessageBox> },
    /// A receive event: becomes ready once a PEER frame is dequeued from the
    /// inbox for `(context_id, peer_vaddr, tag)`; its payload is copied into
    /// `buffer`.
    Payload {
        inbox: Arc<MessageBox>,
        buffer: &'a mut [u8],
    },
}

/// One outstanding send or receive.
pub struct Event<'a> {
    msg_id: u32,
    context_id: u32,
    peer_vaddr: u32,
    tag: u32,
    done: bool,
    awaiting: Option<Awaiting<'a>>,
}

impl<'a> Event<'a> {
    pub(crate) fn done_send(context_id: u32, peer_vaddr: u32, tag: u32) -> Self {
        Event {
            msg_id: 0,
            context_id,
            peer_vaddr,
            tag,
            done: true,
            awaiting: None,
        }
    }

    pub(crate) fn pending_send(
        msg_id: u32,
        context_id: u32,
        peer_vaddr: u32,
        tag: u32,
        ctrlbox: Arc<MessageBox>,
    ) -> Self {
        Event {
            msg_id,
            context_id,
            peer_vaddr,
            tag,
            done: false,
            awaiting: Some(Awaiting::Confirm { ctrlbox }),
        }
    }

    pub(crate) fn done_recv(context_id: u32, peer_vaddr: u32, tag: u32) -> Self {
        Event {
            msg_id: 0,
            context_id,
            peer_vaddr,
            tag,
            done: true,
            awaiting: None,
        }
    }

    pub(crate) fn pending_recv(
        context_id: u32,
        peer_vaddr: u32,
        tag: u32,
        inbox: Arc<MessageBox>,
        buffer: &'a mut [u8],
    ) -> Self {
        Event {
            msg_id: 0,
            context_id,
            peer_vaddr,
            tag,
            done: false,
            awaiting: Some(Awaiting::Payload { inbox, buffer }),
        }
    }

    /// Spin-polls `ready()` until it returns `true`.
    pub fn wait(mut self) {
        while !self.ready() {}
    }

    /// Non-blocking completion check. Does at most one message-box
    /// operation's worth of work per call.
    pub fn ready(&mut self) -> bool {
        if self.done {
            return true;
        }

        match self.awaiting.take() {
            Some(Awaiting::Confirm { ctrlbox }) => {
                match ctrlbox.try_dequeue(MsgType::Confirm, self.context_id, self.peer_vaddr, self.tag) {
                    Some(frame) if frame.header.msg_id == self.msg_id => {
                        self.done = true;
                    }
                    Some(mismatched) => {
                        // Not ours: put it back for whoever is actually
                        // awaiting it and try again on a future poll.
                        ctrlbox.enqueue(
                            MsgType::Confirm,
                            self.context_id,
                            self.peer_vaddr,
                            self.tag,
                            mismatched,
                        );
                        self.awaiting = Some(Awaiting::Confirm { ctrlbox });
                    }
                    None => {
                        self.awaiting = Some(Awaiting::Confirm { ctrlbox });
                    }
                }
            }
            Some(Awaiting::Payload { inbox, buffer }) => {
                match inbox.try_dequeue(MsgType::Peer, self.context_id, self.peer_vaddr, self.tag) {
                    Some(frame) => {
                        let n = buffer.len().min(frame.payload.len());
                        buffer[..n].copy_from_slice(&frame.payload[..n]);
                        self.done = true;
                    }
                    None => {
                        self.awaiting = Some(Awaiting::Payload { inbox, buffer });
                    }
                }
            }
            None => {
                self.done = true;
            }
        }

        self.done
    }

    /// The peer vaddr this event concerns: the destination for a send
    /// event, or the (possibly just-learned) source for a receive event.
    pub fn source(&self) -> u32 {
        self.peer_vaddr
    }

    pub fn get_tag(&self) -> u32 {
        self.tag
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{Frame, Header};
    use std::time::Duration;

    fn confirm(msg_id: u32, context_id: u32, src_vaddr: u32, tag: u32) -> Frame {
        Frame::new(
            Header {
                msg_type: MsgType::Confirm,
                msg_id,
                context_id,
                src_vaddr,
                tag,
            },
            Vec::new(),
        )
    }

    #[test]
    fn send_event_ready_on_matching_confirm() {
        let ctrlbox = Arc::new(MessageBox::new(1024, Duration::from_millis(5)));
        let mut event = Event::pending_send(42, 0, 1, 7, Arc::clone(&ctrlbox));
        assert!(!event.ready());

        ctrlbox.enqueue(MsgType::Confirm, 0, 1, 7, confirm(42, 0, 1, 7));
        assert!(event.ready());
    }

    #[test]
    fn send_event_requeues_mismatched_confirm() {
        let ctrlbox = Arc::new(MessageBox::new(1024, Duration::from_millis(5)));
        let mut event = Event::pending_send(42, 0, 1, 7, Arc::clone(&ctrlbox));

        ctrlbox.enqueue(MsgType::Confirm, 0, 1, 7, confirm(99, 0, 1, 7));
        assert!(!event.ready());
        // the mismatched confirm is still there for its rightful owner
        let requeued = ctrlbox.try_dequeue(MsgType::Confirm, 0, 1, 7).unwrap();
        assert_eq!(requeued.header.msg_id, 99);
    }

    #[test]
    fn recv_event_copies_payload_once_ready() {
        let inbox = Arc::new(MessageBox::new(1024, Duration::from_millis(5)));
        let mut buf = [0u8; 3];
        let mut event = Event::pending_recv(0, 2, 5, Arc::clone(&inbox), &mut buf);
        assert!(!event.ready());

        inbox.enqueue(
            MsgType::Peer,
            0,
            2,
            5,
            Frame::new(
                Header {
                    msg_type: MsgType::Peer,
                    msg_id: 1,
                    context_id: 0,
                    src_vaddr: 2,
                    tag: 5,
                },
                vec![9, 8, 7],
            ),
        );
        assert!(event.ready());
        assert_eq!(buf, [9, 8, 7]);
    }
}
