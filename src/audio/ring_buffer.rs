//! Lock-free SPSC ring buffer for the recording tap.
//!
//! The render thread pushes every mixed output frame into the producer; the
//! recording sink drains the consumer on its own schedule. The tap lives as
//! long as the output graph and survives session changes.

use ringbuf::{
    traits::{Consumer, Observer, Producer, Split},
    HeapRb,
};

/// Default capacity: ~10 seconds of 48 kHz stereo audio.
pub const DEFAULT_CAPACITY: usize = 960_000;

/// Producer half, owned by the mixer on the render thread.
pub struct TapProducer {
    inner: ringbuf::HeapProd<f32>,
}

/// Consumer half, owned by the recording sink.
pub struct TapConsumer {
    inner: ringbuf::HeapCons<f32>,
}

/// Create a matched producer/consumer pair backed by a lock-free ring buffer.
pub fn tap_ring_buffer(capacity: Option<usize>) -> (TapProducer, TapConsumer) {
    let cap = capacity.unwrap_or(DEFAULT_CAPACITY);
    let rb = HeapRb::<f32>::new(cap);
    let (prod, cons) = rb.split();
    (TapProducer { inner: prod }, TapConsumer { inner: cons })
}

impl TapProducer {
    /// Push samples; returns how many fit. When the consumer falls behind the
    /// newest audio is lost, never the oldest.
    pub fn push_slice(&mut self, samples: &[f32]) -> usize {
        self.inner.push_slice(samples)
    }
}

impl TapConsumer {
    pub fn pop_slice(&mut self, buf: &mut [f32]) -> usize {
        self.inner.pop_slice(buf)
    }

    /// Number of samples currently available for reading.
    pub fn available(&self) -> usize {
        self.inner.occupied_len()
    }

    /// Drain all available samples into a Vec.
    pub fn drain_all(&mut self) -> Vec<f32> {
        let n = self.available();
        if n == 0 {
            return Vec::new();
        }
        let mut buf = vec![0.0f32; n];
        let read = self.pop_slice(&mut buf);
        buf.truncate(read);
        buf
    }

    /// Discard everything buffered so far.
    pub fn clear(&mut self) -> usize {
        self.inner.clear()
    }
}
