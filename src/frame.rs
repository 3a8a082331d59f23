use smallvec::SmallVec;

use crate::TimelineValue;

/// Remembers, per frame-in-flight slot, the timeline value signaled by the last frame
/// recorded into that slot. Slots are addressed by the heap manager's frame index.
#[derive(Debug, Clone)]
pub struct FramePacer {
    signals: SmallVec<[Option<TimelineValue>; 3]>,
}

impl FramePacer {
    pub fn new(frames_in_flight: u32) -> Self {
        Self {
            signals: SmallVec::from_elem(None, frames_in_flight.max(1) as usize),
        }
    }
    pub fn frames_in_flight(&self) -> u32 {
        self.signals.len() as u32
    }
    pub fn next_index(&self, frame_index: u32) -> u32 {
        (frame_index + 1) % self.frames_in_flight()
    }

    /// Records the value `frame_index`'s submissions signal on completion.
    pub fn record(&mut self, frame_index: u32, signal: TimelineValue) {
        let slot = &mut self.signals[frame_index as usize];
        *slot = Some(slot.map_or(signal, |previous| previous.max(signal)));
    }
    pub fn signal(&self, frame_index: u32) -> Option<TimelineValue> {
        self.signals.get(frame_index as usize).copied().flatten()
    }

    /// Returns the value `frame_index` is still waiting on, if its previous occupant
    /// has not completed by `completed`.
    pub fn pending(&self, frame_index: u32, completed: TimelineValue) -> Option<TimelineValue> {
        self.signal(frame_index)
            .filter(|signal| !signal.is_reached(completed))
    }

    /// Forgets the signal of a slot that is being reused.
    pub fn clear(&mut self, frame_index: u32) {
        self.signals[frame_index as usize] = None;
    }
}
