//! Startup sequence: allocate identity through signaling, open listeners,
//! then form a full mesh of data/control connections (every peer to every
//! peer, the local peer included).

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::thread;
use std::time::Duration;

use rand::Rng;
use smallvec::SmallVec;

use crate::config::Configuration;
use crate::error::GraybatError;
use crate::msgbox::MessageBox;
use crate::signaling::SignalingClient;
use crate::transport::reactor::IoFuture;
use crate::transport::{Connection, Endpoint};

use super::context::Context;
use super::receiver::{spawn_ctrl_reader, spawn_data_reader, ReceiverShared};
use super::sockets::{PeerSockets, SocketTable};
use super::Communicator;

const CONNECT_ATTEMPTS: u32 = 50;
const CONNECT_RETRY_DELAY: Duration = Duration::from_millis(100);

pub(crate) fn bootstrap(config: Configuration) -> Result<Communicator, GraybatError> {
    let signaling = SignalingClient::new(config.signaling_uri.clone());
    let context_id = signaling.request_context(&config.context_name)?;

    let data_endpoint = Arc::new(Endpoint::bind(config.data_port_base, config.port_search_window)?);
    let ctrl_endpoint = Arc::new(Endpoint::bind(config.control_port_base, config.port_search_window)?);

    let own_data_uri = format!("tcp://127.0.0.1:{}", data_endpoint.port());
    let own_ctrl_uri = format!("tcp://127.0.0.1:{}", ctrl_endpoint.port());

    let self_vaddr = signaling.request_vaddr(context_id, &own_data_uri, &own_ctrl_uri)?;

    let inbox = Arc::new(MessageBox::new(config.max_inbox_bytes, config.event_poll_interval()));
    let ctrlbox = Arc::new(MessageBox::new(config.max_ctrlbox_bytes, config.event_poll_interval()));
    let sockets = Arc::new(SocketTable::empty());

    let mut context_members = HashMap::new();
    context_members.insert(context_id, (0..config.context_size as u32).collect::<Vec<_>>());

    let shared = Arc::new(ReceiverShared {
        sockets: Arc::clone(&sockets),
        context_members: RwLock::new(context_members),
        own_vaddr: self_vaddr,
        inbox: Arc::clone(&inbox),
        ctrlbox: Arc::clone(&ctrlbox),
    });

    let data_threads = Arc::new(Mutex::new(Vec::new()));
    let ctrl_threads = Arc::new(Mutex::new(Vec::new()));

    let data_acceptor = spawn_acceptor(
        Arc::clone(&data_endpoint),
        config.context_size,
        Arc::clone(&shared),
        Arc::clone(&data_threads),
        spawn_data_reader,
    );
    let ctrl_acceptor = spawn_acceptor(
        Arc::clone(&ctrl_endpoint),
        config.context_size,
        Arc::clone(&shared),
        Arc::clone(&ctrl_threads),
        spawn_ctrl_reader,
    );

    // Learn every peer's URIs, including our own (signaling already has it).
    // Most contexts are small, so this rarely spills onto the heap.
    let mut uris: SmallVec<[(String, String); 8]> = SmallVec::with_capacity(config.context_size);
    for vaddr in 0..config.context_size as u32 {
        uris.push(signaling.poll_lookup_vaddr(context_id, vaddr)?);
    }

    // Dial every peer's data and control endpoint, ourselves included, so
    // collectives can route through self the same way they route to anyone
    // else. Order matches vaddr, becoming the socket table's index. Every
    // peer is dialed through the shared reactor so all of them connect
    // concurrently rather than one at a time.
    let dials: Vec<_> = uris
        .iter()
        .map(|(data_uri, ctrl_uri)| {
            let data_addr = data_uri.trim_start_matches("tcp://").to_string();
            let ctrl_addr = ctrl_uri.trim_start_matches("tcp://").to_string();
            (
                IoFuture::spawn(move || connect_with_retry(&data_addr)),
                IoFuture::spawn(move || connect_with_retry(&ctrl_addr)),
            )
        })
        .collect();

    let mut peer_sockets = Vec::with_capacity(config.context_size);
    for (data_future, ctrl_future) in dials {
        let data = data_future.wait()?;
        let ctrl = ctrl_future.wait()?;
        peer_sockets.push(PeerSockets { data, ctrl });
    }
    sockets.install(peer_sockets);

    // Block until every peer (including ourselves) has dialed in, so the
    // communicator never hands out a `Context` before its receiver
    // infrastructure is fully live.
    data_acceptor.join().expect("ERROR: data acceptor thread panicked");
    ctrl_acceptor.join().expect("ERROR: control acceptor thread panicked");

    let global_context = Context::new(context_id, self_vaddr, config.context_size);

    Ok(Communicator {
        config,
        signaling,
        global_context,
        msg_id_counter: Default::default(),
        sockets,
        shared,
        inbox,
        ctrlbox,
        data_threads,
        ctrl_threads,
    })
}

/// Dials `addr` through the shared reactor (`Connection::async_connect`),
/// retrying until the peer's acceptor comes up. Each attempt is itself an
/// async transport operation; this just keeps issuing new ones.
fn connect_with_retry(addr: &str) -> Result<Connection, GraybatError> {
    let mut last_err = None;
    for _ in 0..CONNECT_ATTEMPTS {
        match Connection::async_connect(addr.to_string()).wait() {
            Ok(conn) => return Ok(conn),
            Err(e) => {
                last_err = Some(e);
                // A peer's acceptor may not be listening yet this instant;
                // jitter the retry so many peers dialing each other at once
                // don't all retry in lockstep.
                let jitter = Duration::from_millis(rand::thread_rng().gen_range(0..50));
                thread::sleep(CONNECT_RETRY_DELAY + jitter);
            }
        }
    }
    Err(last_err.unwrap())
}

fn spawn_acceptor<F>(
    endpoint: Arc<Endpoint>,
    expected: usize,
    shared: Arc<ReceiverShared>,
    threads: Arc<Mutex<Vec<thread::JoinHandle<()>>>>,
    spawn_reader: F,
) -> thread::JoinHandle<()>
where
    F: Fn(Connection, Arc<ReceiverShared>) -> thread::JoinHandle<()> + Send + 'static,
{
    thread::Builder::new()
        .name("graybat-acceptor".to_string())
        .spawn(move || {
            for _ in 0..expected {
                match endpoint.accept() {
                    Ok(conn) => {
                        let handle = spawn_reader(conn, Arc::clone(&shared));
                        threads.lock().unwrap().push(handle);
                    }
                    Err(e) => {
                        log::error!("accept failed during bootstrap: {}", e);
                        return;
                    }
                }
            }
        })
        .expect("ERROR: Failed to spawn acceptor thread")
}
