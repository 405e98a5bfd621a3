//! Splitting a context into a sub-context (C5).
//!
//! The peer holding vaddr 0 of the parent context acts as the rendezvous:
//! it collects every member's yes/no vote, requests a new context id, and
//! broadcasts the resulting whitelist (the old vaddrs of members who voted
//! in, ascending) back to every member. Everyone, voter or not, then passes
//! through a null barrier before returning, so nobody starts using the new
//! context while a sibling is still mid-vote on the old one.
//!
//! A peer's vaddr is never renumbered by a split: each member's new
//! `Context` carries its vaddr unchanged from the context being split, and
//! its membership is the whitelist rather than `[0, size)`. Identity is
//! retained, not reassigned.
//!
//! Reuses the `Split` frame type on the data channel; three fixed tags keep
//! the handshake's three rounds (vote, assignment, barrier) from colliding
//! with each other. At most one split in flight per parent context is
//! supported -- concurrent splits of the same context are not.

use bit_vec::BitVec;

use crate::error::GraybatError;
use crate::frame::MsgType;

use super::context::{Context, ContextId, Vaddr};
use super::Communicator;

const VOTE_TAG: u32 = 0;
const ASSIGNMENT_TAG: u32 = 1;
const BARRIER_ENTER_TAG: u32 = 2;
const BARRIER_RELEASE_TAG: u32 = 3;

#[derive(Serialize, Deserialize)]
struct Assignment {
    context_id: ContextId,
    /// Old (parent-context, and global) vaddrs of the members who voted in,
    /// ascending. Stored and handed back verbatim as the new context's
    /// whitelist -- nobody is renumbered.
    members: Vec<Vaddr>,
}

impl Communicator {
    pub fn split_context(&self, ctx: &Context, member: bool) -> Result<Context, GraybatError> {
        if !ctx.is_valid() {
            return Err(GraybatError::ContextInvalid);
        }

        const ROOT: Vaddr = 0;
        let own_global = ctx.vaddr();

        self.send_split(ROOT, ctx.id(), own_global, VOTE_TAG, vec![member as u8])?;

        let result = if own_global == ROOT {
            let assignment = self.collect_votes_and_assign(ctx)?;
            self.broadcast_assignment(ctx, &assignment)?;
            self.apply_assignment(&assignment, own_global)
        } else if member {
            let frame = self
                .inbox
                .wait_dequeue(MsgType::Split, ctx.id(), ROOT, ASSIGNMENT_TAG);
            let assignment: Assignment = bincode::deserialize(&frame.payload)
                .map_err(|_| GraybatError::MalformedMessage(frame.payload.len()))?;
            self.apply_assignment(&assignment, own_global)
        } else {
            None
        };

        self.null_barrier(ctx, ROOT)?;

        Ok(result.unwrap_or_else(Context::invalid))
    }

    fn send_split(
        &self,
        global_vaddr: Vaddr,
        context_id: ContextId,
        src_vaddr: Vaddr,
        tag: u32,
        payload: Vec<u8>,
    ) -> Result<(), GraybatError> {
        let msg_id = self.next_msg_id();
        self.sockets.write_frame(
            global_vaddr,
            super::sockets::Channel::Data,
            MsgType::Split,
            msg_id,
            context_id,
            src_vaddr,
            tag,
            payload,
        )
    }

    fn collect_votes_and_assign(&self, ctx: &Context) -> Result<Assignment, GraybatError> {
        let members = ctx.members();
        let mut votes = BitVec::from_elem(members.len(), false);
        for (pos, &src_vaddr) in members.iter().enumerate() {
            let frame = self.inbox.wait_dequeue(MsgType::Split, ctx.id(), src_vaddr, VOTE_TAG);
            votes.set(pos, frame.payload.first() == Some(&1));
        }

        let mut new_members = Vec::with_capacity(votes.iter().filter(|&b| b).count());
        for (pos, voted_in) in votes.iter().enumerate() {
            if voted_in {
                new_members.push(members[pos]);
            }
        }

        let name = format!("{}.split", ctx.id());
        let new_context_id = self.signaling.request_context(&name)?;
        Ok(Assignment {
            context_id: new_context_id,
            members: new_members,
        })
    }

    fn broadcast_assignment(&self, ctx: &Context, assignment: &Assignment) -> Result<(), GraybatError> {
        let encoded = bincode::serialize(assignment).expect("ERROR: Couldn't serialize split assignment");
        for dest in ctx.members() {
            if dest == ctx.vaddr() {
                continue;
            }
            self.send_split(dest, ctx.id(), ctx.vaddr(), ASSIGNMENT_TAG, encoded.clone())?;
        }
        Ok(())
    }

    /// Installs the new context's membership table and, if we are a member,
    /// returns the `Context` handle for it. Our own vaddr is carried over
    /// unchanged -- a split never renumbers anyone.
    fn apply_assignment(&self, assignment: &Assignment, own_global: Vaddr) -> Option<Context> {
        self.shared
            .context_members
            .write()
            .unwrap()
            .insert(assignment.context_id, assignment.members.clone());

        assignment.members.contains(&own_global).then(|| {
            Context::with_whitelist(assignment.context_id, own_global, assignment.members.clone())
        })
    }

    /// Every member and non-member of the split passes through here before
    /// `split_context` returns, so nobody touches the new context while a
    /// peer is still deciding whether it belongs.
    fn null_barrier(&self, ctx: &Context, root_global: Vaddr) -> Result<(), GraybatError> {
        self.send_split(root_global, ctx.id(), ctx.vaddr(), BARRIER_ENTER_TAG, Vec::new())?;

        if ctx.vaddr() == root_global {
            for src in ctx.members() {
                self.inbox
                    .wait_dequeue(MsgType::Split, ctx.id(), src, BARRIER_ENTER_TAG);
            }
            for dest in ctx.members() {
                if dest == root_global {
                    continue;
                }
                self.send_split(dest, ctx.id(), root_global, BARRIER_RELEASE_TAG, Vec::new())?;
            }
        } else {
            self.inbox
                .wait_dequeue(MsgType::Split, ctx.id(), root_global, BARRIER_RELEASE_TAG);
        }
        Ok(())
    }
}
