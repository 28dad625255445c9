// Shared helpers for the analysis and calibration modules

mod average_buffer;
mod time_threshold;

pub use average_buffer::AverageBuffer;
pub use time_threshold::TimeThreshold;
