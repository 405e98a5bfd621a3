//! End-to-end scenarios against real loopback `Communicator`s and a local
//! `SignalingService`: ping, full mesh, order preservation, split, and
//! backpressure. Collective operations have their own file
//! (`tests/collectives.rs`).

use std::thread;

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

/// Boots `context_size` communicators against one signaling service and
/// returns them ordered by vaddr.
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
fn ping() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let mut peers = connect_mesh(port, "ping", 2);
    let receiver = peers.remove(0);
    let sender = peers.remove(0);

    let ctx = sender.global_context().clone();
    sender.send(&ctx, 0, 1, b"ping".to_vec()).unwrap();

    let mut buf = [0u8; 4];
    let recv_ctx = receiver.global_context().clone();
    receiver.recv(&recv_ctx, 1, 1, &mut buf).unwrap();
    assert_eq!(&buf, b"ping");

    sender.shutdown().unwrap();
    receiver.shutdown().unwrap();
    service.shutdown();
}

#[test]
fn recv_any_learns_source_and_tag() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let mut peers = connect_mesh(port, "recv-any", 2);
    let receiver = peers.remove(0);
    let sender = peers.remove(0);

    let ctx = sender.global_context().clone();
    sender.send(&ctx, 0, 42, b"whoami".to_vec()).unwrap();

    let mut buf = [0u8; 6];
    let recv_ctx = receiver.global_context().clone();
    let event = receiver.recv_any(&recv_ctx, &mut buf).unwrap();
    assert_eq!(event.source(), 1);
    assert_eq!(event.get_tag(), 42);
    assert_eq!(&buf, b"whoami");

    sender.shutdown().unwrap();
    receiver.shutdown().unwrap();
    service.shutdown();
}

#[test]
fn full_mesh_every_pair_exchanges() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let peers = connect_mesh(port, "full-mesh", 4);
    let size = peers.len() as u32;

    thread::scope(|scope| {
        for peer in &peers {
            scope.spawn(move || {
                let ctx = peer.global_context().clone();
                let own = ctx.vaddr();
                for dest in ctx.members() {
                    if dest == own {
                        continue;
                    }
                    let tag = own * size + dest;
                    peer.send(&ctx, dest, tag, vec![own as u8]).unwrap();
                }
                for src in ctx.members() {
                    if src == own {
                        continue;
                    }
                    let tag = src * size + own;
                    let mut buf = [0u8; 1];
                    peer.recv(&ctx, src, tag, &mut buf).unwrap();
                    assert_eq!(buf[0], src as u8);
                }
            });
        }
    });

    for peer in peers {
        peer.shutdown().unwrap();
    }
    service.shutdown();
}

#[test]
fn order_is_preserved_within_one_source_and_tag() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let mut peers = connect_mesh(port, "order", 2);
    let receiver = peers.remove(0);
    let sender = peers.remove(0);

    let ctx = sender.global_context().clone();
    for i in 0..20u8 {
        sender.send(&ctx, 0, 3, vec![i]).unwrap();
    }

    let recv_ctx = receiver.global_context().clone();
    for i in 0..20u8 {
        let mut buf = [0u8; 1];
        receiver.recv(&recv_ctx, 1, 3, &mut buf).unwrap();
        assert_eq!(buf[0], i, "message {} arrived out of order", i);
    }

    sender.shutdown().unwrap();
    receiver.shutdown().unwrap();
    service.shutdown();
}

#[test]
fn split_retains_vaddr_identity_for_members_only() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();
    let peers = connect_mesh(port, "split", 4);

    let subs: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = peers
            .iter()
            .map(|peer| {
                let ctx = peer.global_context().clone();
                let is_member = ctx.vaddr() % 2 == 0;
                scope.spawn(move || (is_member, peer.split_context(&ctx, is_member).unwrap()))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for (was_member, sub) in &subs {
        assert_eq!(sub.is_valid(), *was_member);
    }
    let member_subs: Vec<_> = subs.iter().filter(|(m, _)| *m).map(|(_, c)| c).collect();
    assert_eq!(member_subs.len(), 2);
    assert!(member_subs.iter().all(|c| c.size() == 2));
    // vaddrs 0 and 2 voted in; identity carries over unchanged, not renumbered.
    let mut vaddrs: Vec<_> = member_subs.iter().map(|c| c.vaddr()).collect();
    vaddrs.sort();
    assert_eq!(vaddrs, vec![0, 2]);
    assert!(member_subs.iter().all(|c| c.members() == vec![0, 2]));
    // every member sub-context shares the same id
    assert_eq!(member_subs[0].id(), member_subs[1].id());

    for peer in peers {
        peer.shutdown().unwrap();
    }
    service.shutdown();
}

#[test]
fn backpressure_delays_confirm_until_the_inbox_is_drained() {
    let service = SignalingService::spawn(0).unwrap();
    let port = service.port();

    let elem_len = 64;
    let mut a_config = config_for(port, "backpressure", 2);
    a_config.max_inbox_bytes = graybat::frame::HEADER_SIZE + elem_len;
    let mut b_config = a_config.clone();
    b_config.context_name = "backpressure".to_string();

    let a = thread::spawn(move || Communicator::connect(a_config).unwrap());
    let b = thread::spawn(move || Communicator::connect(b_config).unwrap());
    let a = a.join().unwrap();
    let b = b.join().unwrap();

    let (sender, receiver) = if a.global_context().vaddr() == 0 { (a, b) } else { (b, a) };
    let ctx = sender.global_context().clone();

    // Fill the receiver's inbox to its high-water mark with the first send.
    sender.send(&ctx, 1, 9, vec![0u8; elem_len]).unwrap();

    // The second send's frame is read off the wire but cannot be enqueued
    // (the box is full), so its CONFIRM never arrives until we drain.
    // `async_send` itself does not block on the confirm, only `wait()` does.
    let mut second_event = sender.async_send(&ctx, 1, 9, vec![1u8; elem_len]).unwrap();
    thread::sleep(std::time::Duration::from_millis(200));
    assert!(!second_event.ready(), "confirm arrived before the inbox was drained");

    let recv_ctx = receiver.global_context().clone();
    let mut first = vec![0u8; elem_len];
    receiver.recv(&recv_ctx, 0, 9, &mut first).unwrap();
    assert_eq!(first, vec![0u8; elem_len]);

    second_event.wait();

    let mut second_buf = vec![0u8; elem_len];
    receiver.recv(&recv_ctx, 0, 9, &mut second_buf).unwrap();
    assert_eq!(second_buf, vec![1u8; elem_len]);

    sender.shutdown().unwrap();
    receiver.shutdown().unwrap();
    service.shutdown();
}
