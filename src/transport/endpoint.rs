//! Listening side of the transport abstraction (C3).

use std::net::TcpListener;

use super::connection::Connection;
use super::reactor::IoFuture;
use crate::error::GraybatError;

/// A bound TCP listener. `Endpoint::bind` picks the first free port at or
/// after the requested one, within a bounded search window, mirroring the
/// source codebase's "keep trying the next port" bootstrap behaviour.
#[derive(Debug)]
pub struct Endpoint {
    listener: TcpListener,
    port: u16,
}

impl Endpoint {
    pub fn bind(base_port: u16, search_window: u16) -> Result<Self, GraybatError> {
        for offset in 0..search_window {
            let port = base_port.saturating_add(offset);
            if let Ok(listener) = TcpListener::bind(("0.0.0.0", port)) {
                let bound_port = listener.local_addr()?.port();
                return Ok(Endpoint {
                    listener,
                    port: bound_port,
                });
            }
        }
        Err(GraybatError::BindFailed { base_port })
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    /// Dials `addr` on a reactor thread. Does not involve this endpoint's
    /// own listener -- dialing out is client-side work -- but lives here to
    /// match the transport's paired `bind`/`accept`/`connect` naming.
    pub fn async_connect(addr: String) -> IoFuture<Connection> {
        Connection::async_connect(addr)
    }

    /// Puts the listener into non-blocking mode, so `accept` returns
    /// immediately (with a `WouldBlock` `io::Error`) when nothing is
    /// pending, instead of parking the calling thread. Used by loops that
    /// need to poll a shutdown flag between accept attempts.
    pub fn set_nonblocking(&self, nonblocking: bool) -> Result<(), GraybatError> {
        self.listener.set_nonblocking(nonblocking)?;
        Ok(())
    }

    /// Blocks until a peer connects (unless the endpoint is in non-blocking
    /// mode, in which case it returns immediately).
    pub fn accept(&self) -> Result<Connection, GraybatError> {
        let (stream, _) = self.listener.accept()?;
        stream.set_nodelay(true)?;
        Ok(Connection::from_stream(stream))
    }

    /// Spawns a thread that blocks in `accept` and invokes `on_accepted`
    /// with the result. This is the callback-driven async form; the crate's
    /// shared reactor (`crate::transport::reactor`) backs the future-style
    /// variants used elsewhere.
    pub fn async_accept<F>(self: std::sync::Arc<Self>, on_accepted: F) -> std::thread::JoinHandle<()>
    where
        F: FnOnce(Result<Connection, GraybatError>) + Send + 'static,
    {
        std::thread::spawn(move || {
            let result = self.accept();
            on_accepted(result);
        })
    }
}
