//! The socket-based communication policy (C5): owns the bootstrap sequence,
//! point-to-point send/recv/probe, context splitting, and teardown.

mod bootstrap;
mod context;
mod ops;
mod receiver;
mod sockets;
mod split;
mod teardown;

pub use context::{Context, ContextId, Vaddr};

use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::config::Configuration;
use crate::error::GraybatError;
use crate::msgbox::MessageBox;
use crate::signaling::SignalingClient;

use receiver::ReceiverShared;
use sockets::SocketTable;

/// A live participant in a communication context. Built once via
/// `Communicator::connect`; exactly one initial ("global") `Context` comes
/// out of bootstrap, and more are derived from it with `split_context`.
pub struct Communicator {
    config: Configuration,
    signaling: SignalingClient,
    global_context: Context,
    msg_id_counter: AtomicU32,
    sockets: Arc<SocketTable>,
    shared: Arc<ReceiverShared>,
    inbox: Arc<MessageBox>,
    ctrlbox: Arc<MessageBox>,
    data_threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
    ctrl_threads: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl Communicator {
    /// Runs the full bootstrap sequence against the signaling service named
    /// in `config`: allocates a context id and vaddr, opens listeners,
    /// forms a full mesh of data/control connections with every member
    /// (self included), and returns once that mesh's reader threads are
    /// live.
    pub fn connect(config: Configuration) -> Result<Self, GraybatError> {
        bootstrap::bootstrap(config)
    }

    /// The initial context assigned during bootstrap.
    pub fn global_context(&self) -> &Context {
        &self.global_context
    }

    pub fn config(&self) -> &Configuration {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signaling::SignalingService;
    use std::thread;

    fn config_for(service_port: u16, name: &str) -> Configuration {
        Configuration {
            data_port_base: 0,
            control_port_base: 0,
            port_search_window: 1,
            context_size: 2,
            context_name: name.to_string(),
            signaling_uri: format!("127.0.0.1:{}", service_port),
            ..Configuration::default()
        }
    }

    #[test]
    fn two_peers_bootstrap_and_exchange_a_message() {
        let service = SignalingService::spawn(0).unwrap();
        let port = service.port();
        let name = "bootstrap-smoke";

        let a_config = config_for(port, name);
        let b_config = config_for(port, name);

        let a = thread::spawn(move || Communicator::connect(a_config).unwrap());
        let b = thread::spawn(move || Communicator::connect(b_config).unwrap());

        let a = a.join().unwrap();
        let b = b.join().unwrap();

        assert_eq!(a.global_context().size(), 2);
        assert_eq!(b.global_context().size(), 2);
        assert_ne!(a.global_context().vaddr(), b.global_context().vaddr());

        let (sender, receiver) = if a.global_context().vaddr() == 0 { (a, b) } else { (b, a) };
        let ctx = sender.global_context().clone();
        sender.send(&ctx, 1, 42, b"hi".to_vec()).unwrap();

        let mut buf = [0u8; 2];
        let recv_ctx = receiver.global_context().clone();
        receiver.recv(&recv_ctx, 0, 42, &mut buf).unwrap();
        assert_eq!(&buf, b"hi");

        sender.shutdown().unwrap();
        receiver.shutdown().unwrap();
        service.shutdown();
    }
}
