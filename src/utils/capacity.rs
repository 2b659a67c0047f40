use std::num::NonZero;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capacity {
    Unbounded,
    Bounded(NonZero<usize>),
}

impl Capacity {
    /// Bounded capacity holding at most `capacity` elements.
    ///
    /// # Panics
    /// Panics if `capacity` is zero
    pub fn bounded(capacity: usize) -> Self {
        Capacity::Bounded(NonZero::new(capacity).expect("Bounded capacity must be non-zero"))
    }
}

/// A capacity of 0 means unbounded
impl From<usize> for Capacity {
    fn from(value: usize) -> Self {
        match NonZero::new(value) {
            Some(capacity) => Capacity::Bounded(capacity),
            None => Capacity::Unbounded,
        }
    }
}
