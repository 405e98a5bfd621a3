//! The `CommunicationPolicy` trait: the interface collective operations are
//! written against, so they work over any socket-based policy rather than
//! being tied to `Communicator` directly.

use crate::communicator::{Communicator, Context};
use crate::config::Configuration;
use crate::error::GraybatError;
use crate::event::{Event, Status};

/// A policy capable of point-to-point send/recv/probe and context
/// splitting. `Communicator` is the only implementation in this crate, but
/// collective operations (`crate::collective`) are written against this
/// trait so they never depend on its bootstrap details.
pub trait CommunicationPolicy {
    type Config;

    fn config(&self) -> &Self::Config;

    fn global_context(&self) -> &Context;

    fn async_send<'a>(
        &self,
        ctx: &Context,
        dest: u32,
        tag: u32,
        payload: Vec<u8>,
    ) -> Result<Event<'a>, GraybatError>;

    fn send(&self, ctx: &Context, dest: u32, tag: u32, payload: Vec<u8>) -> Result<(), GraybatError>;

    fn async_recv<'a>(
        &self,
        ctx: &Context,
        source: u32,
        tag: u32,
        buffer: &'a mut [u8],
    ) -> Result<Event<'a>, GraybatError>;

    fn recv(&self, ctx: &Context, source: u32, tag: u32, buffer: &mut [u8]) -> Result<(), GraybatError>;

    fn recv_any<'a>(&self, ctx: &Context, buffer: &'a mut [u8]) -> Result<Event<'a>, GraybatError>;

    fn probe(&self, ctx: &Context, source: u32, tag: u32) -> Result<Status, GraybatError>;

    fn async_probe(&self, ctx: &Context, source: u32, tag: u32) -> Result<Option<Status>, GraybatError>;

    fn split_context(&self, ctx: &Context, member: bool) -> Result<Context, GraybatError>;
}

impl CommunicationPolicy for Communicator {
    type Config = Configuration;

    fn config(&self) -> &Self::Config {
        Communicator::config(self)
    }

    fn global_context(&self) -> &Context {
        Communicator::global_context(self)
    }

    fn async_send<'a>(
        &self,
        ctx: &Context,
        dest: u32,
        tag: u32,
        payload: Vec<u8>,
    ) -> Result<Event<'a>, GraybatError> {
        Communicator::async_send(self, ctx, dest, tag, payload)
    }

    fn send(&self, ctx: &Context, dest: u32, tag: u32, payload: Vec<u8>) -> Result<(), GraybatError> {
        Communicator::send(self, ctx, dest, tag, payload)
    }

    fn async_recv<'a>(
        &self,
        ctx: &Context,
        source: u32,
        tag: u32,
        buffer: &'a mut [u8],
    ) -> Result<Event<'a>, GraybatError> {
        Communicator::async_recv(self, ctx, source, tag, buffer)
    }

    fn recv(&self, ctx: &Context, source: u32, tag: u32, buffer: &mut [u8]) -> Result<(), GraybatError> {
        Communicator::recv(self, ctx, source, tag, buffer)
    }

    fn recv_any<'a>(&self, ctx: &Context, buffer: &'a mut [u8]) -> Result<Event<'a>, GraybatError> {
        Communicator::recv_any(self, ctx, buffer)
    }

    fn probe(&self, ctx: &Context, source: u32, tag: u32) -> Result<Status, GraybatError> {
        Communicator::probe(self, ctx, source, tag)
    }

    fn async_probe(&self, ctx: &Context, source: u32, tag: u32) -> Result<Option<Status>, GraybatError> {
        Communicator::async_probe(self, ctx, source, tag)
    }

    fn split_context(&self, ctx: &Context, member: bool) -> Result<Context, GraybatError> {
        Communicator::split_context(self, ctx, member)
    }
}
