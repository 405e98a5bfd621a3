//! Collective operations exercised end-to-end over real loopback
//! `Communicator`s: broadcast, barrier, gather, scatter, all_scatter, and
//! reduce/all_reduce (the canonical reduce-sum scenario).

use std::thread;

use graybat::collective;
use graybat::signaling::SignalingService;
use graybat::{Communicator, Configuration};

fn config_for(service_port: u16, name: &str, context_size: usize) -> Configuration {
    Configuration {
        data_port_base: 0,
        control_port_base: 0,
        port_search_window: 1,
        context_size,
        context_name: name.to_string(),
        signaling_uri: format!("127.0.0.1:{}", service_port),
        ..Configuration::default()
    }
}

fn connect_mesh(service_port: u16, name: &str, context_size: usize) -> Vec<Communicator> {
    let handles: Vec<_> = (0..context_size)
        .map(|_| {
            let config = config_for(service_port, name, context_size);
            thread::spawn(move || Communicator::connect(config).unwrap())
        })
        .collect();

    let mut peers: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    peers.sort_by_key(|p| p.global_context().vaddr());
    peers
}

#[test]
fn reduce_sum_and_all_reduce() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let peers = connect_mesh(port, "reduce-sum", 4);

    let sums: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = peers
            .iter()
            .map(|peer| {
                let ctx = peer.global_context().clone();
                let value = (ctx.vaddr() + 1) as u64; // 1, 2, 3, 4
                scope.spawn(move || {
                    let reduced = collective::reduce(peer, &ctx, 0, 1, value, |a, b| a + b).unwrap();
                    let all = collective::all_reduce(peer, &ctx, 2, value, |a, b| a + b).unwrap();
                    (ctx.vaddr(), reduced, all)
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (vaddr, reduced, all) in &sums {
        assert_eq!(*all, 10, "all_reduce mismatch at vaddr {}", vaddr);
        if *vaddr == 0 {
            assert_eq!(*reduced, Some(10));
        } else {
            assert_eq!(*reduced, None);
        }
    }

    for peer in peers {
        peer.shutdown().unwrap();
    }
    service.shutdown();
}

#[test]
fn broadcast_and_barrier() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let peers = connect_mesh(port, "broadcast", 3);

    let payloads: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = peers
            .iter()
            .map(|peer| {
                let ctx = peer.global_context().clone();
                scope.spawn(move || {
                    let mut payload = if ctx.vaddr() == 0 { b"hello".to_vec() } else { Vec::new() };
                    collective::broadcast(peer, &ctx, 0, 0, &mut payload).unwrap();
                    collective::barrier(peer, &ctx, 1).unwrap();
                    payload
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for payload in payloads {
        assert_eq!(payload, b"hello".to_vec());
    }

    for peer in peers {
        peer.shutdown().unwrap();
    }
    service.shutdown();
}

#[test]
fn gather_collects_in_vaddr_order() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let peers = connect_mesh(port, "gather", 3);

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = peers
            .iter()
            .map(|peer| {
                let ctx = peer.global_context().clone();
                scope.spawn(move || {
                    let send = vec![ctx.vaddr() as u8 * 10];
                    collective::gather(peer, &ctx, 0, 0, &send).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results[0], Some(vec![0, 10, 20]));
    assert!(results[1].is_none());
    assert!(results[2].is_none());

    for peer in peers {
        peer.shutdown().unwrap();
    }
    service.shutdown();
}

#[test]
fn scatter_splits_the_root_buffer() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let peers = connect_mesh(port, "scatter", 3);
    let chunk_len = 1;

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = peers
            .iter()
            .map(|peer| {
                let ctx = peer.global_context().clone();
                scope.spawn(move || {
                    let send_buf = if ctx.vaddr() == 0 { Some(vec![100u8, 101, 102]) } else { None };
                    collective::scatter(peer, &ctx, 0, 0, chunk_len, send_buf.as_deref()).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results, vec![vec![100], vec![101], vec![102]]);

    for peer in peers {
        peer.shutdown().unwrap();
    }
    service.shutdown();
}

#[test]
fn all_scatter_is_a_personalized_all_to_all() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let peers = connect_mesh(port, "all-scatter", 3);
    let chunk_len = 1;

    let results: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = peers
            .iter()
            .map(|peer| {
                let ctx = peer.global_context().clone();
                scope.spawn(move || {
                    // Chunk i of this peer's send buffer is destined for vaddr i:
                    // (own * 10 + dest).
                    let own = ctx.vaddr();
                    let send_buf: Vec<u8> = ctx.members().into_iter().map(|dest| (own * 10 + dest) as u8).collect();
                    collective::all_scatter(peer, &ctx, 0, chunk_len, &send_buf).unwrap()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (dest, recv_buf) in results.iter().enumerate() {
        for src in 0..3u32 {
            assert_eq!(recv_buf[src as usize], (src * 10 + dest as u32) as u8);
        }
    }

    for peer in peers {
        peer.shutdown().unwrap();
    }
    service.shutdown();
}
