/// Rolling capture buffer between the real-time audio callback and the
/// session polling loop.
///
/// Holds the most recent window of raw PCM bytes. The producer appends from
/// the audio callback, the consumer drains everything at once, and both
/// sides meet at a single mutex held only while bytes are copied. When the
/// buffer is full the oldest bytes are evicted so the contents always
/// describe the most recent audio window.

use cache_padded::CachePadded;
use parking_lot::Mutex;
use ringbuf::traits::{Consumer, Observer, Producer};
use ringbuf::HeapRb;

pub struct RingBuffer {
    inner: CachePadded<Mutex<HeapRb<u8>>>,
    capacity: usize,
}

impl RingBuffer {
    /// Create a buffer holding at most `capacity` bytes.
    ///
    /// Panics if `capacity` is zero.
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: CachePadded::new(Mutex::new(HeapRb::new(capacity))),
            capacity,
        }
    }

    /// Append bytes to the end of the buffer, evicting the oldest bytes
    /// when capacity would be exceeded.
    ///
    /// Called from the audio callback: no logging, no allocation, holds the
    /// lock only for the copy.
    pub fn extend(&self, bytes: &[u8]) {
        let mut rb = self.inner.lock();

        if bytes.len() >= self.capacity {
            // The new data alone fills the window; keep only its tail.
            let occupied = rb.occupied_len();
            rb.skip(occupied);
            rb.push_slice(&bytes[bytes.len() - self.capacity..]);
            return;
        }

        let vacant = rb.vacant_len();
        if bytes.len() > vacant {
            rb.skip(bytes.len() - vacant);
        }
        rb.push_slice(bytes);
    }

    /// Drain all buffered bytes.
    ///
    /// Destructive read: a second call with no intervening `extend` returns
    /// an empty vec.
    pub fn drain(&self) -> Vec<u8> {
        let mut rb = self.inner.lock();
        let occupied = rb.occupied_len();
        if occupied == 0 {
            return Vec::new();
        }

        let mut out = vec![0u8; occupied];
        let read = rb.pop_slice(&mut out);
        out.truncate(read);
        out
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.inner.lock().occupied_len()
    }

    /// Check if the buffer is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of bytes the buffer retains.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Discard all buffered bytes.
    pub fn clear(&self) {
        let mut rb = self.inner.lock();
        let occupied = rb.occupied_len();
        rb.skip(occupied);
    }
}
