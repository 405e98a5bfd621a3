//! Thread-safe multi-key blocking queue (C4).
//!
//! Keyed by `(msg_type, context_id, src_vaddr, tag)`, shared between the
//! receiver tasks (producers) and user threads (consumers). Bounded in total
//! byte size by a configured high-water mark; producers block while full.

use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::Duration;

use crate::frame::{Frame, MsgType};

/// Full key identifying one FIFO queue inside a `MessageBox`.
pub type Key = (MsgType, u32, u32, u32);

struct Inner {
    queues: HashMap<Key, VecDeque<Frame>>,
    total_bytes: usize,
}

/// A bounded, multi-key FIFO queue of frames.
pub struct MessageBox {
    inner: Mutex<Inner>,
    not_empty: Condvar,
    not_full: Condvar,
    high_water_mark: usize,
    poll_interval: Duration,
}

fn matches_prefix(key: &Key, msg_type: MsgType, context_id: u32) -> bool {
    key.0 == msg_type && key.1 == context_id
}

impl MessageBox {
    pub fn new(high_water_mark: usize, poll_interval: Duration) -> Self {
        MessageBox {
            inner: Mutex::new(Inner {
                queues: HashMap::new(),
                total_bytes: 0,
            }),
            not_empty: Condvar::new(),
            not_full: Condvar::new(),
            high_water_mark,
            poll_interval,
        }
    }

    /// Blocks while `total_bytes + frame.wire_len() > high_water_mark`, then
    /// pushes the frame onto its queue.
    pub fn enqueue(&self, msg_type: MsgType, context_id: u32, src_vaddr: u32, tag: u32, frame: Frame) {
        let len = frame.wire_len();
        let mut guard = self.inner.lock().unwrap();

        while guard.total_bytes + len > self.high_water_mark && guard.total_bytes > 0 {
            guard = self
                .not_full
                .wait_timeout(guard, self.poll_interval)
                .unwrap()
                .0;
        }

        guard.total_bytes += len;
        guard
            .queues
            .entry((msg_type, context_id, src_vaddr, tag))
            .or_insert_with(VecDeque::new)
            .push_back(frame);

        self.not_empty.notify_all();
    }

    /// Blocks until `(msg_type, context_id, src_vaddr, tag)` has a message,
    /// then pops and returns it.
    pub fn wait_dequeue(&self, msg_type: MsgType, context_id: u32, src_vaddr: u32, tag: u32) -> Frame {
        let key = (msg_type, context_id, src_vaddr, tag);
        let mut guard = self.inner.lock().unwrap();

        loop {
            if let Some(frame) = guard
                .queues
                .get_mut(&key)
                .and_then(|q| q.pop_front())
            {
                guard.total_bytes -= frame.wire_len();
                self.not_full.notify_all();
                return frame;
            }
            guard = self
                .not_empty
                .wait_timeout(guard, self.poll_interval)
                .unwrap()
                .0;
        }
    }

    /// "Receive from any" variant. Blocks until some queue whose key begins
    /// with `(msg_type, context_id)` is non-empty; returns the dequeued
    /// frame together with the full key that matched, so the caller learns
    /// the sender's vaddr and tag.
    pub fn wait_dequeue_prefix(&self, msg_type: MsgType, context_id: u32) -> (Frame, Key) {
        let mut guard = self.inner.lock().unwrap();

        loop {
            let hit = guard
                .queues
                .iter_mut()
                .find(|(key, queue)| matches_prefix(key, msg_type, context_id) && !queue.is_empty());

            if let Some((&key, queue)) = hit {
                let frame = queue.pop_front().unwrap();
                guard.total_bytes -= frame.wire_len();
                self.not_full.notify_all();
                return (frame, key);
            }

            guard = self
                .not_empty
                .wait_timeout(guard, self.poll_interval)
                .unwrap()
                .0;
        }
    }

    /// Non-blocking variant of `wait_dequeue`.
    pub fn try_dequeue(&self, msg_type: MsgType, context_id: u32, src_vaddr: u32, tag: u32) -> Option<Frame> {
        let key = (msg_type, context_id, src_vaddr, tag);
        let mut guard = self.inner.lock().unwrap();
        let frame = guard.queues.get_mut(&key).and_then(|q| q.pop_front())?;
        guard.total_bytes -= frame.wire_len();
        self.not_full.notify_all();
        Some(frame)
    }

    /// Non-blocking variant of `wait_dequeue_prefix`.
    pub fn try_dequeue_prefix(&self, msg_type: MsgType, context_id: u32) -> Option<(Frame, Key)> {
        let mut guard = self.inner.lock().unwrap();
        let hit = guard
            .queues
            .iter_mut()
            .find(|(key, queue)| matches_prefix(key, msg_type, context_id) && !queue.is_empty());

        let (key, frame) = match hit {
            Some((&key, queue)) => (key, queue.pop_front().unwrap()),
            None => return None,
        };
        guard.total_bytes -= frame.wire_len();
        self.not_full.notify_all();
        Some((frame, key))
    }

    /// Returns the wire size of the head-of-queue frame without removing it,
    /// or `None` if the queue is empty/absent.
    pub fn probe(&self, msg_type: MsgType, context_id: u32, src_vaddr: u32, tag: u32) -> Option<usize> {
        let key = (msg_type, context_id, src_vaddr, tag);
        let guard = self.inner.lock().unwrap();
        guard.queues.get(&key).and_then(|q| q.front()).map(Frame::wire_len)
    }

    /// Blocking variant of `probe`: waits until the queue has a message.
    pub fn wait_probe(&self, msg_type: MsgType, context_id: u32, src_vaddr: u32, tag: u32) -> usize {
        let key = (msg_type, context_id, src_vaddr, tag);
        let mut guard = self.inner.lock().unwrap();

        loop {
            if let Some(size) = guard.queues.get(&key).and_then(|q| q.front()).map(Frame::wire_len) {
                return size;
            }
            guard = self
                .not_empty
                .wait_timeout(guard, self.poll_interval)
                .unwrap()
                .0;
        }
    }

    #[cfg(test)]
    fn queued_bytes(&self) -> usize {
        self.inner.lock().unwrap().total_bytes
    }
}
