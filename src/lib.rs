// Lumibeat - audio-reactive lighting engine
// Beat detection over RMS amplitudes driving a prioritized light effect pipeline

// Module declarations
pub mod audio;
pub mod bridge;
pub mod color;
pub mod config;
pub mod engine;
pub mod error;
pub mod light;
pub mod orchestrator;
pub mod util;
pub mod visualizer;

// Re-exports for convenience
pub use audio::{BeatSignal, StopStatus};
pub use bridge::{BridgeClient, LightId, LightState};
pub use config::{ConfigHandle, SessionConfig};
pub use engine::{Engine, EngineEvent};
pub use error::{BridgeError, ConfigError, EffectError, EngineError, OrchestratorError};
