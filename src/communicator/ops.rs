//! Point-to-point send/receive/probe (C5), built on the message boxes (C4)
//! and events (C7).

use crate::error::GraybatError;
use crate::event::{Event, Status};
use crate::frame::{HEADER_SIZE, MsgType};

use super::context::Context;
use super::sockets::Channel;
use super::Communicator;

impl Communicator {
    pub(crate) fn next_msg_id(&self) -> u32 {
        self.msg_id_counter
            .fetch_add(1, std::sync::atomic::Ordering::Relaxed)
    }

    /// Validates that `vaddr` is a member of `ctx`. A peer's vaddr is the
    /// same value in every context it belongs to -- splitting never
    /// renumbers anyone -- so there is nothing to translate, only to check.
    fn global_vaddr_of(&self, ctx: &Context, vaddr: u32) -> Result<u32, GraybatError> {
        self.shared
            .context_members
            .read()
            .unwrap()
            .get(&ctx.id())
            .filter(|members| members.contains(&vaddr))
            .map(|_| vaddr)
            .ok_or(GraybatError::ContextInvalid)
    }

    /// Starts sending `payload` to `dest` and returns immediately with a
    /// handle that becomes ready once the peer's CONFIRM arrives.
    pub fn async_send<'a>(
        &self,
        ctx: &Context,
        dest: u32,
        tag: u32,
        payload: Vec<u8>,
    ) -> Result<Event<'a>, GraybatError> {
        if !ctx.is_valid() {
            return Err(GraybatError::ContextInvalid);
        }
        let global = self.global_vaddr_of(ctx, dest)?;
        let msg_id = self.next_msg_id();

        self.sockets.write_frame(
            global,
            Channel::Data,
            MsgType::Peer,
            msg_id,
            ctx.id(),
            ctx.vaddr(),
            tag,
            payload,
        )?;

        Ok(Event::pending_send(msg_id, ctx.id(), dest, tag, self.ctrlbox.clone()))
    }

    /// Sends `payload` to `dest` and blocks until the delivery is confirmed.
    pub fn send(&self, ctx: &Context, dest: u32, tag: u32, payload: Vec<u8>) -> Result<(), GraybatError> {
        self.async_send(ctx, dest, tag, payload)?.wait();
        Ok(())
    }

    /// Starts receiving from `source` into `buffer` and returns immediately
    /// with a handle that becomes ready once the payload has arrived.
    pub fn async_recv<'a>(
        &self,
        ctx: &Context,
        source: u32,
        tag: u32,
        buffer: &'a mut [u8],
    ) -> Result<Event<'a>, GraybatError> {
        if !ctx.is_valid() {
            return Err(GraybatError::ContextInvalid);
        }
        Ok(Event::pending_recv(ctx.id(), source, tag, self.inbox.clone(), buffer))
    }

    /// Blocks until a payload tagged `tag` from `source` has been copied
    /// into `buffer`.
    pub fn recv(&self, ctx: &Context, source: u32, tag: u32, buffer: &mut [u8]) -> Result<(), GraybatError> {
        self.async_recv(ctx, source, tag, buffer)?.wait();
        Ok(())
    }

    /// Blocks until a payload from any member and any tag has arrived,
    /// copies it into `buffer`, and returns an already-done `Event` the
    /// caller inspects with `source()`/`get_tag()` to learn who sent it.
    pub fn recv_any<'a>(&self, ctx: &Context, buffer: &'a mut [u8]) -> Result<Event<'a>, GraybatError> {
        if !ctx.is_valid() {
            return Err(GraybatError::ContextInvalid);
        }
        let (frame, key) = self.inbox.wait_dequeue_prefix(MsgType::Peer, ctx.id());
        let n = buffer.len().min(frame.payload.len());
        buffer[..n].copy_from_slice(&frame.payload[..n]);
        Ok(Event::done_recv(key.1, key.2, key.3))
    }

    /// Non-blocking: reports the size of a pending message without
    /// consuming it, or `None` if nothing has arrived yet.
    pub fn async_probe(&self, ctx: &Context, source: u32, tag: u32) -> Result<Option<Status>, GraybatError> {
        if !ctx.is_valid() {
            return Err(GraybatError::ContextInvalid);
        }
        Ok(self
            .inbox
            .probe(MsgType::Peer, ctx.id(), source, tag)
            .map(|wire_len| Status {
                source,
                tag,
                size: wire_len - HEADER_SIZE,
            }))
    }

    /// Blocks until a message tagged `tag` from `source` is pending, then
    /// reports its size without consuming it.
    pub fn probe(&self, ctx: &Context, source: u32, tag: u32) -> Result<Status, GraybatError> {
        if !ctx.is_valid() {
            return Err(GraybatError::ContextInvalid);
        }
        let wire_len = self.inbox.wait_probe(MsgType::Peer, ctx.id(), source, tag);
        Ok(Status {
            source,
            tag,
            size: wire_len - HEADER_SIZE,
        })
    }
}
