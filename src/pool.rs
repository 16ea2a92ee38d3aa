//! Transient buffer pool (spec §4.2).
//!
//! A per-frame recycling pool of GPU/CPU-shared linear buffers used for
//! dynamic vertex/index/uniform data. Partitioned into `current`,
//! `available`, and a one-deep FIFO of prior frames' `retired` sets.
//!
//! This is the one multithreaded seam in the system (spec §5): the command
//! buffer's completion handler fires on an arbitrary driver thread and only
//! touches this pool, so all mutation runs under a single `parking_lot::Mutex`
//! (grounded on `BlaiZephyr-ddnet-rs`'s `graphics-backend`, which reaches for
//! `parking_lot` for exactly this kind of completion-handler critical
//! section — `autograph-render-gl` itself never needs one, since GL has no
//! async completion callback).
//!
//! Known defect, carried forward per spec §4.2 and §9: a dynamic buffer that
//! the host does not refresh every frame can have its backing storage
//! silently reallocated to a different frame's draw. This is the documented
//! limitation, not a bug to paper over here.

use parking_lot::Mutex;

/// Rounds `n` up to the pool's allocation granularity (spec §4.2: "rounded up
/// to 16 bytes").
fn round_up_16(n: usize) -> usize {
    (n + 15) & !15
}

pub struct TransientBuffer {
    pub buffer: metal::Buffer,
    pub size: usize,
}

// `metal::Buffer` wraps an Objective-C object reference; transient buffers
// only ever move between pool partitions under the pool's own mutex, so it is
// safe to hand them across the completion-handler thread boundary.
unsafe impl Send for TransientBuffer {}

struct PoolState {
    available: Vec<TransientBuffer>,
    current: Vec<TransientBuffer>,
    retired: std::collections::VecDeque<Vec<TransientBuffer>>,
}

pub struct TransientBufferPool {
    device: metal::Device,
    state: Mutex<PoolState>,
}

impl TransientBufferPool {
    pub fn new(device: metal::Device) -> Self {
        TransientBufferPool {
            device,
            state: Mutex::new(PoolState {
                available: Vec::new(),
                current: Vec::new(),
                retired: std::collections::VecDeque::new(),
            }),
        }
    }

    /// §4.2 `getBufferForSize`: scan `available` for the first buffer of
    /// sufficient size; on miss, allocate a fresh one. Either way the buffer
    /// moves into `current` before being handed back.
    pub fn get_buffer_for_size(&self, requested: usize) -> metal::Buffer {
        let size = round_up_16(requested);
        let mut state = self.state.lock();

        let pos = state.available.iter().position(|b| b.size >= size);
        let buf = if let Some(pos) = pos {
            state.available.remove(pos)
        } else {
            TransientBuffer {
                buffer: self.device.new_buffer(
                    size as u64,
                    metal::MTLResourceOptions::StorageModeShared
                        | metal::MTLResourceOptions::CPUCacheModeWriteCombined,
                ),
                size,
            }
        };

        let handle = buf.buffer.clone();
        state.current.push(buf);
        handle
    }

    /// §4.2 "present path": push `current` to the tail of `retired`, then pop
    /// the head of `retired` into `available` (one-frame latency). Called
    /// from the Metal completion handler, hence the mutex.
    pub fn on_command_buffer_completed(&self) {
        let mut state = self.state.lock();
        let finished = std::mem::take(&mut state.current);
        state.retired.push_back(finished);
        if let Some(mut ready) = state.retired.pop_front() {
            state.available.append(&mut ready);
        }
    }

    /// §4.2 "flush path": the same rotation, performed synchronously after
    /// `waitUntilCompleted` rather than from a completion handler.
    pub fn rotate_synchronously(&self) {
        self.on_command_buffer_completed();
    }

    #[cfg(test)]
    fn counts(&self) -> (usize, usize, usize) {
        let state = self.state.lock();
        (
            state.available.len(),
            state.current.len(),
            state.retired.iter().map(|v| v.len()).sum(),
        )
    }
}

#[cfg(test)]
mod tests {
    // These tests exercise the partition bookkeeping without a live Metal
    // device: `metal::Device::system_default()` is unavailable in CI, so the
    // rotation logic is validated against a lightweight stand-in partition
    // model mirroring `PoolState` instead of `TransientBufferPool` directly.

    struct Partitions {
        available: Vec<u32>,
        current: Vec<u32>,
        retired: std::collections::VecDeque<Vec<u32>>,
    }

    impl Partitions {
        fn new() -> Self {
            Partitions {
                available: Vec::new(),
                current: Vec::new(),
                retired: std::collections::VecDeque::new(),
            }
        }

        fn alloc(&mut self, id: u32) {
            self.current.push(id);
        }

        fn complete(&mut self) {
            let finished = std::mem::take(&mut self.current);
            self.retired.push_back(finished);
            if let Some(mut ready) = self.retired.pop_front() {
                self.available.append(&mut ready);
            }
        }
    }

    #[test]
    fn frame_buffers_stay_out_of_available_until_completion() {
        let mut p = Partitions::new();
        p.alloc(1);
        p.alloc(2);
        assert_eq!(p.current, vec![1, 2]);
        assert!(p.available.is_empty());
        p.complete();
        assert!(p.current.is_empty());
        // one-frame latency: freshly completed buffers sit in `retired`
        // until the *next* completion pops them into `available`.
        assert!(p.available.is_empty());
        p.alloc(3);
        p.complete();
        assert_eq!(p.available, vec![1, 2]);
    }

    #[test]
    fn round_up_16_matches_spec_granularity() {
        assert_eq!(super::round_up_16(0), 0);
        assert_eq!(super::round_up_16(1), 16);
        assert_eq!(super::round_up_16(16), 16);
        assert_eq!(super::round_up_16(17), 32);
    }
}
