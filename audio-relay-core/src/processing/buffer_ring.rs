use std::collections::VecDeque;

use crate::models::error::CaptureError;
use crate::models::state::BufferState;

/// Default number of capture buffers in the ring.
pub const DEFAULT_BUFFER_COUNT: usize = 3;

#[derive(Debug)]
struct Slot {
    state: BufferState,
    /// `None` while the bytes are lent to the consumer.
    data: Option<Vec<u8>>,
    len: usize,
}

/// Fixed ring of capture buffers.
///
/// Replaces the audio queue's buffer list. The capture thread fills buffers
/// in submission order; the delivery thread takes `Ready` buffers out,
/// hands them to the consumer, and recycles them back into the queue.
///
/// Wrap in `Arc<parking_lot::Mutex<BufferRing>>` and keep every critical
/// section short: the capture thread must never wait on a consumer.
#[derive(Debug)]
pub struct BufferRing {
    slots: Vec<Slot>,
    capacity: usize,
    /// Buffers submitted to the hardware queue, in fill order.
    submitted: VecDeque<usize>,
    filling: Option<usize>,
}

impl BufferRing {
    /// Allocate `count` buffers of `capacity` bytes and submit all of them.
    pub fn new(count: usize, capacity: usize) -> Result<Self, CaptureError> {
        if count == 0 || capacity == 0 {
            return Err(CaptureError::BufferAllocationFailed(format!(
                "cannot allocate {} buffers of {} bytes",
                count, capacity
            )));
        }

        let mut slots = Vec::new();
        slots
            .try_reserve_exact(count)
            .map_err(|e| CaptureError::BufferAllocationFailed(e.to_string()))?;
        for _ in 0..count {
            let mut data = Vec::new();
            data.try_reserve_exact(capacity)
                .map_err(|e| CaptureError::BufferAllocationFailed(e.to_string()))?;
            data.resize(capacity, 0);
            slots.push(Slot {
                state: BufferState::Free,
                data: Some(data),
                len: 0,
            });
        }

        Ok(Self {
            slots,
            capacity,
            submitted: (0..count).collect(),
            filling: None,
        })
    }

    /// Copy `bytes` into the buffer being filled, starting the next submitted
    /// buffer whenever one fills up. `on_ready` receives each completed slot.
    ///
    /// Returns the number of bytes dropped because no buffer was submitted.
    pub fn fill(&mut self, mut bytes: &[u8], mut on_ready: impl FnMut(usize)) -> usize {
        while !bytes.is_empty() {
            let index = match self.filling {
                Some(index) => index,
                None => match self.submitted.pop_front() {
                    Some(index) => {
                        self.slots[index].state = BufferState::Filling;
                        self.filling = Some(index);
                        index
                    }
                    None => return bytes.len(),
                },
            };

            let slot = &mut self.slots[index];
            let Some(data) = slot.data.as_mut() else {
                // A filling slot always holds its bytes; recover by dropping it.
                self.filling = None;
                return bytes.len();
            };
            let room = self.capacity - slot.len;
            let take = room.min(bytes.len());
            data[slot.len..slot.len + take].copy_from_slice(&bytes[..take]);
            slot.len += take;
            bytes = &bytes[take..];

            if slot.len == self.capacity {
                slot.state = BufferState::Ready;
                self.filling = None;
                on_ready(index);
            }
        }
        0
    }

    /// Complete the partially filled buffer early, if it holds any bytes.
    pub fn flush_partial(&mut self) -> Option<usize> {
        let index = self.filling.take()?;
        let slot = &mut self.slots[index];
        if slot.len == 0 {
            slot.state = BufferState::Free;
            self.submitted.push_front(index);
            return None;
        }
        slot.state = BufferState::Ready;
        Some(index)
    }

    /// Move a `Ready` buffer to `Draining`, lending out its bytes.
    ///
    /// Returns the storage and the filled length. A buffer can be taken only
    /// once per fill.
    pub fn take_ready(&mut self, index: usize) -> Option<(Vec<u8>, usize)> {
        let slot = self.slots.get_mut(index)?;
        if slot.state != BufferState::Ready {
            return None;
        }
        let data = slot.data.take()?;
        slot.state = BufferState::Draining;
        Some((data, slot.len))
    }

    /// Return a drained buffer and re-submit it to the hardware queue.
    pub fn recycle(&mut self, index: usize, data: Vec<u8>) {
        let Some(slot) = self.slots.get_mut(index) else {
            return;
        };
        if slot.state != BufferState::Draining {
            return;
        }
        slot.data = Some(data);
        slot.len = 0;
        slot.state = BufferState::Free;
        self.submitted.push_back(index);
    }

    /// Release every buffer back to `Free` and resubmit the whole ring.
    ///
    /// Slots still lent out stay `Draining` until recycled.
    pub fn reset(&mut self) {
        self.filling = None;
        self.submitted.clear();
        for (index, slot) in self.slots.iter_mut().enumerate() {
            if slot.data.is_some() {
                slot.state = BufferState::Free;
                slot.len = 0;
                self.submitted.push_back(index);
            }
        }
    }

    pub fn state(&self, index: usize) -> Option<BufferState> {
        self.slots.get(index).map(|s| s.state)
    }

    pub fn states(&self) -> Vec<BufferState> {
        self.slots.iter().map(|s| s.state).collect()
    }

    pub fn count_in(&self, state: BufferState) -> usize {
        self.slots.iter().filter(|s| s.state == state).count()
    }

    /// Buffers currently queued for the hardware to fill.
    pub fn submitted_count(&self) -> usize {
        self.submitted.len()
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Capacity of each buffer in bytes.
    pub fn buffer_capacity(&self) -> usize {
        self.capacity
    }
}
