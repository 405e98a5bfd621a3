//! A bound, bidirectional byte stream between two peers (C3).

use std::io::{Read, Write};
use std::net::{TcpStream, ToSocketAddrs};

use crate::error::GraybatError;

use super::reactor::IoFuture;

/// Width, in bytes, of the ASCII-decimal length prefix used by
/// `send_prefix_size`/`receive_prefix_size`.
const LENGTH_PREFIX_WIDTH: usize = 8;

/// One TCP connection, framed at the byte level. `Connection` itself knows
/// nothing about `graybat` frames -- callers layer `crate::frame::Frame` on
/// top of `send`/`receive`, or use `send_prefix_size`/`receive_prefix_size`
/// for self-describing (variable-length) payloads such as signaling RPCs.
pub struct Connection {
    stream: TcpStream,
}

impl Connection {
    pub(crate) fn from_stream(stream: TcpStream) -> Self {
        Connection { stream }
    }

    pub fn connect<A: ToSocketAddrs>(addr: A) -> Result<Self, GraybatError> {
        let stream = TcpStream::connect(addr)?;
        stream.set_nodelay(true)?;
        Ok(Connection { stream })
    }

    pub fn try_clone(&self) -> Result<Self, GraybatError> {
        Ok(Connection {
            stream: self.stream.try_clone()?,
        })
    }

    /// Dials `addr` on a reactor thread; the returned future resolves to the
    /// connected `Connection` or a `TransportError`.
    pub fn async_connect(addr: String) -> IoFuture<Connection> {
        IoFuture::spawn(move || Connection::connect(addr))
    }

    /// Writes the whole buffer or fails.
    pub fn send(&mut self, bytes: &[u8]) -> Result<(), GraybatError> {
        self.stream.write_all(bytes)?;
        Ok(())
    }

    /// Callback-free async form of `send`: clones the underlying stream
    /// handle and writes `bytes` on a reactor thread, so the caller is never
    /// blocked waiting for the peer to drain its socket buffer.
    pub fn async_send(&self, bytes: Vec<u8>) -> IoFuture<()> {
        match self.try_clone() {
            Ok(mut conn) => IoFuture::spawn(move || conn.send(&bytes)),
            Err(e) => IoFuture::spawn(move || Err(e)),
        }
    }

    /// Reads exactly `buf.len()` bytes or fails.
    pub fn receive(&mut self, buf: &mut [u8]) -> Result<(), GraybatError> {
        self.stream.read_exact(buf)?;
        Ok(())
    }

    /// Callback-free async form of `receive`: clones the underlying stream
    /// handle and reads `len` bytes on a reactor thread.
    pub fn async_receive(&self, len: usize) -> IoFuture<Vec<u8>> {
        match self.try_clone() {
            Ok(mut conn) => IoFuture::spawn(move || {
                let mut buf = vec![0u8; len];
                conn.receive(&mut buf)?;
                Ok(buf)
            }),
            Err(e) => IoFuture::spawn(move || Err(e)),
        }
    }

    /// Writes an 8-byte ASCII-decimal length prefix followed by `bytes`.
    pub fn send_prefix_size(&mut self, bytes: &[u8]) -> Result<(), GraybatError> {
        let prefix = format!("{:0width$}", bytes.len(), width = LENGTH_PREFIX_WIDTH);
        self.stream.write_all(prefix.as_bytes())?;
        self.stream.write_all(bytes)?;
        Ok(())
    }

    /// Reads an 8-byte ASCII-decimal length prefix, resizes `buf` to match,
    /// then reads that many payload bytes.
    pub fn receive_prefix_size(&mut self, buf: &mut Vec<u8>) -> Result<(), GraybatError> {
        let mut prefix = [0u8; LENGTH_PREFIX_WIDTH];
        self.stream.read_exact(&mut prefix)?;

        let text = std::str::from_utf8(&prefix)
            .map_err(|_| GraybatError::MalformedMessage(LENGTH_PREFIX_WIDTH))?;
        let len: usize = text
            .trim()
            .parse()
            .map_err(|_| GraybatError::MalformedMessage(LENGTH_PREFIX_WIDTH))?;

        buf.resize(len, 0);
        self.stream.read_exact(buf)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn prefix_size_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = std::thread::spawn(move || {
            let mut conn = Connection::connect(addr).unwrap();
            conn.send_prefix_size(b"hello world").unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let mut server = Connection::from_stream(stream);
        let mut received = Vec::new();
        server.receive_prefix_size(&mut received).unwrap();

        client.join().unwrap();
        assert_eq!(received, b"hello world");
    }

    #[test]
    fn exact_send_receive_round_trips() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = std::thread::spawn(move || {
            let mut conn = Connection::connect(addr).unwrap();
            conn.send(&[1, 2, 3, 4]).unwrap();
        });

        let (stream, _) = listener.accept().unwrap();
        let mut server = Connection::from_stream(stream);
        let mut buf = [0u8; 4];
        server.receive(&mut buf).unwrap();

        client.join().unwrap();
        assert_eq!(buf, [1, 2, 3, 4]);
    }

    #[test]
    fn async_connect_resolves_to_a_live_connection() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let future = Connection::async_connect(addr.to_string());
        let (stream, _) = listener.accept().unwrap();
        let mut server = Connection::from_stream(stream);

        let mut client = future.wait().unwrap();
        client.send(&[5, 6, 7]).unwrap();
        let mut buf = [0u8; 3];
        server.receive(&mut buf).unwrap();
        assert_eq!(buf, [5, 6, 7]);
    }

    #[test]
    fn async_send_and_async_receive_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();

        let client = std::thread::spawn(move || Connection::connect(addr).unwrap());
        let (stream, _) = listener.accept().unwrap();
        let server = Connection::from_stream(stream);
        let client = client.join().unwrap();

        let send_future = client.async_send(vec![1, 2, 3]);
        let recv_future = server.async_receive(3);

        send_future.wait().unwrap();
        assert_eq!(recv_future.wait().unwrap(), vec![1, 2, 3]);
    }
}
