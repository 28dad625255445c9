//! Beat detection types
//!
//! The engine feeds RMS amplitude samples into a [`BeatInterpreter`], which
//! condenses them into discrete [`BeatSignal`]s. Downstream consumers (the
//! visualizer and the engine event broadcast) only ever see these signals,
//! never raw amplitudes.

mod interpreter;

pub use interpreter::BeatInterpreter;

/// Amplitudes below this floor are treated as silence before interpretation.
pub const AMPLITUDE_FLOOR: f64 = 0.005;

/// Outcome of interpreting one amplitude sample. At most one signal is
/// produced per sample; the three kinds are mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BeatSignal {
    /// A beat fired. Carries the triggering amplitude and the rolling average.
    Beat { amplitude: f64, average: f64 },
    /// Audio is playing but no beat has fired for the no-beat timeout.
    NoBeat { average: f64 },
    /// The stream has been at zero amplitude for the silence timeout.
    Silence,
}

/// Why the amplitude source stopped delivering samples.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopStatus {
    /// The session was stopped deliberately.
    Requested,
    /// The capture device disappeared or failed mid-session.
    DeviceLost,
}
