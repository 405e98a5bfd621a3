//! Collective operations (C6), written generically against
//! `CommunicationPolicy` so they only depend on point-to-point send/recv/
//! probe.
//!
//! None of these build a spanning tree; every collective is a flat
//! root-centred fan-out/fan-in (or, for `all_scatter`, a full mesh). That
//! is the right trade for small contexts and matches the rest of the crate
//! favouring a plain, obviously-correct implementation over a
//! logarithmic-depth one. A caller picks the `tag` for each call, the same
//! way it would for a plain `send`/`recv`; a collective's internal phases
//! never collide with each other on tag because they differ in which
//! vaddr is the sender, but a concurrent plain send reusing the same tag in
//! the same context would.

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::communicator::Context;
use crate::error::GraybatError;
use crate::policy::CommunicationPolicy;

/// A member's position within `ctx`'s member list, used to index flat
/// per-member buffers. For the global context this is the vaddr itself; for
/// a split context (whose vaddrs are a non-contiguous whitelist, not
/// renumbered) it is the vaddr's rank in that whitelist.
fn position_of(ctx: &Context, vaddr: u32) -> usize {
    ctx.members()
        .iter()
        .position(|&v| v == vaddr)
        .expect("vaddr is not a member of this context")
}

/// Copies `payload` from `root` to every other member of `ctx`.
pub fn broadcast<P: CommunicationPolicy>(
    policy: &P,
    ctx: &Context,
    root: u32,
    tag: u32,
    payload: &mut Vec<u8>,
) -> Result<(), GraybatError> {
    if ctx.vaddr() == root {
        for dest in ctx.members() {
            if dest == root {
                continue;
            }
            policy.send(ctx, dest, tag, payload.clone())?;
        }
    } else {
        let status = policy.probe(ctx, root, tag)?;
        payload.resize(status.size, 0);
        policy.recv(ctx, root, tag, payload)?;
    }
    Ok(())
}

/// Blocks every member until all members have entered. Always rendezvouses
/// through vaddr 0.
pub fn barrier<P: CommunicationPolicy>(policy: &P, ctx: &Context, tag: u32) -> Result<(), GraybatError> {
    const ROOT: u32 = 0;
    if ctx.vaddr() == ROOT {
        for src in ctx.members() {
            if src == ROOT {
                continue;
            }
            policy.recv(ctx, src, tag, &mut [])?;
        }
        for dest in ctx.members() {
            if dest == ROOT {
                continue;
            }
            policy.send(ctx, dest, tag, Vec::new())?;
        }
    } else {
        policy.send(ctx, ROOT, tag, Vec::new())?;
        policy.recv(ctx, ROOT, tag, &mut [])?;
    }
    Ok(())
}

/// Collects one fixed-size chunk (`send.len()` bytes, the same on every
/// member) from every member into `root`'s buffer, ordered by vaddr.
/// Returns `None` on non-root members.
pub fn gather<P: CommunicationPolicy>(
    policy: &P,
    ctx: &Context,
    root: u32,
    tag: u32,
    send: &[u8],
) -> Result<Option<Vec<u8>>, GraybatError> {
    if ctx.vaddr() == root {
        let elem_len = send.len();
        let mut buf = vec![0u8; elem_len * ctx.size()];
        let root_pos = position_of(ctx, root);
        buf[root_pos * elem_len..(root_pos + 1) * elem_len].copy_from_slice(send);
        for src in ctx.members() {
            if src == root {
                continue;
            }
            let pos = position_of(ctx, src);
            let slot = &mut buf[pos * elem_len..(pos + 1) * elem_len];
            policy.recv(ctx, src, tag, slot)?;
        }
        Ok(Some(buf))
    } else {
        policy.send(ctx, root, tag, send.to_vec())?;
        Ok(None)
    }
}

/// Like `gather`, but members may each send a different-sized chunk; the
/// size is learned with `probe` before each receive.
pub fn gather_var<P: CommunicationPolicy>(
    policy: &P,
    ctx: &Context,
    root: u32,
    tag: u32,
    send: &[u8],
) -> Result<Option<Vec<Vec<u8>>>, GraybatError> {
    if ctx.vaddr() == root {
        let mut out = vec![Vec::new(); ctx.size()];
        out[position_of(ctx, root)] = send.to_vec();
        for src in ctx.members() {
            if src == root {
                continue;
            }
            let status = policy.probe(ctx, src, tag)?;
            let mut buf = vec![0u8; status.size];
            policy.recv(ctx, src, tag, &mut buf)?;
            out[position_of(ctx, src)] = buf;
        }
        Ok(Some(out))
    } else {
        policy.send(ctx, root, tag, send.to_vec())?;
        Ok(None)
    }
}

/// `gather` followed by a broadcast of the assembled buffer, so every
/// member ends up with the same copy.
pub fn all_gather<P: CommunicationPolicy>(
    policy: &P,
    ctx: &Context,
    tag: u32,
    send: &[u8],
) -> Result<Vec<u8>, GraybatError> {
    const ROOT: u32 = 0;
    let gathered = gather(policy, ctx, ROOT, tag, send)?;
    let mut buf = gathered.unwrap_or_else(|| vec![0u8; send.len() * ctx.size()]);
    broadcast(policy, ctx, ROOT, tag, &mut buf)?;
    Ok(buf)
}

/// `gather_var` followed by a broadcast of the assembled (bincode-encoded)
/// chunk list.
pub fn all_gather_var<P: CommunicationPolicy>(
    policy: &P,
    ctx: &Context,
    tag: u32,
    send: &[u8],
) -> Result<Vec<Vec<u8>>, GraybatError> {
    const ROOT: u32 = 0;
    let gathered = gather_var(policy, ctx, ROOT, tag, send)?;
    let mut encoded = match gathered {
        Some(chunks) => bincode::serialize(&chunks).expect("ERROR: Couldn't serialize gathered chunks"),
        None => Vec::new(),
    };
    broadcast(policy, ctx, ROOT, tag, &mut encoded)?;
    bincode::deserialize(&encoded).map_err(|_| GraybatError::MalformedMessage(encoded.len()))
}

/// Splits `send_buf` (valid only at `root`, `ctx.size()` chunks of
/// `chunk_len` bytes each) and sends each member its chunk.
pub fn scatter<P: CommunicationPolicy>(
    policy: &P,
    ctx: &Context,
    root: u32,
    tag: u32,
    chunk_len: usize,
    send_buf: Option<&[u8]>,
) -> Result<Vec<u8>, GraybatError> {
    if ctx.vaddr() == root {
        let send_buf = send_buf.expect("root must provide the buffer to scatter");
        for dest in ctx.members() {
            if dest == root {
                continue;
            }
            let pos = position_of(ctx, dest);
            let chunk = &send_buf[pos * chunk_len..(pos + 1) * chunk_len];
            policy.send(ctx, dest, tag, chunk.to_vec())?;
        }
        let root_pos = position_of(ctx, root);
        Ok(send_buf[root_pos * chunk_len..(root_pos + 1) * chunk_len].to_vec())
    } else {
        let mut buf = vec![0u8; chunk_len];
        policy.recv(ctx, root, tag, &mut buf)?;
        Ok(buf)
    }
}

/// Personalized all-to-all: `send_buf` holds `ctx.size()` chunks of
/// `chunk_len` bytes, one per destination (including self); the result
/// holds one chunk from every source, in source order.
pub fn all_scatter<P: CommunicationPolicy>(
    policy: &P,
    ctx: &Context,
    tag: u32,
    chunk_len: usize,
    send_buf: &[u8],
) -> Result<Vec<u8>, GraybatError> {
    let own = ctx.vaddr();
    for dest in ctx.members() {
        if dest == own {
            continue;
        }
        let pos = position_of(ctx, dest);
        let chunk = &send_buf[pos * chunk_len..(pos + 1) * chunk_len];
        policy.send(ctx, dest, tag, chunk.to_vec())?;
    }

    let mut recv_buf = vec![0u8; chunk_len * ctx.size()];
    let own_pos = position_of(ctx, own);
    recv_buf[own_pos * chunk_len..(own_pos + 1) * chunk_len]
        .copy_from_slice(&send_buf[own_pos * chunk_len..(own_pos + 1) * chunk_len]);

    for src in ctx.members() {
        if src == own {
            continue;
        }
        let pos = position_of(ctx, src);
        let slot = &mut recv_buf[pos * chunk_len..(pos + 1) * chunk_len];
        policy.recv(ctx, src, tag, slot)?;
    }
    Ok(recv_buf)
}

/// Folds `value` from every member into `root` with `op`. `op` must be
/// associative and commutative: nothing guarantees non-root contributions
/// are combined in send order, only in ascending-vaddr receive order.
pub fn reduce<P, T, F>(
    policy: &P,
    ctx: &Context,
    root: u32,
    tag: u32,
    value: T,
    op: F,
) -> Result<Option<T>, GraybatError>
where
    P: CommunicationPolicy,
    T: Serialize + DeserializeOwned,
    F: Fn(T, T) -> T,
{
    if ctx.vaddr() == root {
        let mut acc = value;
        for src in ctx.members() {
            if src == root {
                continue;
            }
            let status = policy.probe(ctx, src, tag)?;
            let mut buf = vec![0u8; status.size];
            policy.recv(ctx, src, tag, &mut buf)?;
            let other: T =
                bincode::deserialize(&buf).map_err(|_| GraybatError::MalformedMessage(buf.len()))?;
            acc = op(acc, other);
        }
        Ok(Some(acc))
    } else {
        let encoded = bincode::serialize(&value).expect("ERROR: Couldn't serialize reduce operand");
        policy.send(ctx, root, tag, encoded)?;
        Ok(None)
    }
}

/// `reduce` followed by a broadcast of the folded value.
pub fn all_reduce<P, T, F>(policy: &P, ctx: &Context, tag: u32, value: T, op: F) -> Result<T, GraybatError>
where
    P: CommunicationPolicy,
    T: Serialize + DeserializeOwned,
    F: Fn(T, T) -> T,
{
    const ROOT: u32 = 0;
    let reduced = reduce(policy, ctx, ROOT, tag, value, op)?;
    let mut encoded = match reduced {
        Some(v) => bincode::serialize(&v).expect("ERROR: Couldn't serialize reduced value"),
        None => Vec::new(),
    };
    broadcast(policy, ctx, ROOT, tag, &mut encoded)?;
    bincode::deserialize(&encoded).map_err(|_| GraybatError::MalformedMessage(encoded.len()))
}
