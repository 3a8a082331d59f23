use std::fmt::Debug;

/// A value on a GPU timeline. The device advances its completed value monotonically
/// as submitted work finishes; anything tagged with a value `<=` the completed value
/// is no longer referenced by the GPU.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct TimelineValue(pub u64);

impl TimelineValue {
    pub const ZERO: Self = Self(0);

    pub fn new(value: u64) -> Self {
        Self(value)
    }
    pub fn get(self) -> u64 {
        self.0
    }
    /// Returns true if work signaling `self` has finished given the device's `completed` value.
    pub fn is_reached(self, completed: TimelineValue) -> bool {
        self <= completed
    }
    pub fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl Debug for TimelineValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("TimelineValue").field(&self.0).finish()
    }
}

impl From<u64> for TimelineValue {
    fn from(value: u64) -> Self {
        Self(value)
    }
}
