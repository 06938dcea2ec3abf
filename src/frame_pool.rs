//! Recycled frame-encoding buffers.
//!
//! Each connection keeps a small supply of encode buffers so that
//! steady-state command encoding does not allocate. A checked-out
//! [`Frame`] hands its storage back when dropped; when every slot is
//! already occupied the storage is simply freed.

use std::sync::Arc;

use crossbeam_queue::ArrayQueue;

const FRAME_SLOTS: usize = 16;

/// A connection's supply of encode buffers.
#[derive(Debug)]
pub(crate) struct FramePool {
    slots: ArrayQueue<Vec<u8>>,
}

impl FramePool {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            slots: ArrayQueue::new(FRAME_SLOTS),
        })
    }

    /// Take a buffer out of the pool, allocating one when all slots are
    /// empty.
    pub fn checkout(self: &Arc<Self>) -> Frame {
        Frame {
            buf: self.slots.pop().unwrap_or_default(),
            pool: Arc::clone(self),
        }
    }

    fn recycle(&self, mut buf: Vec<u8>) {
        buf.clear();
        let _ = self.slots.push(buf);
    }
}

/// An encode buffer on loan from a [`FramePool`].
pub(crate) struct Frame {
    buf: Vec<u8>,
    pool: Arc<FramePool>,
}

impl Frame {
    pub fn bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn buf_mut(&mut self) -> &mut Vec<u8> {
        &mut self.buf
    }
}

impl Drop for Frame {
    fn drop(&mut self) {
        self.pool.recycle(std::mem::take(&mut self.buf));
    }
}
