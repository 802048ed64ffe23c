//! Dataset checks. Each returns the issues it found; none fails fast.

pub mod structure;
pub mod values;

/// Example values quoted in an issue message.
pub const MAX_SAMPLES: usize = 5;
