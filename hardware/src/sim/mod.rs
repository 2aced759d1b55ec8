//! Simulated collaborators for running the engine without hardware.

mod surface;
mod tracker;

pub use surface::{LoggingSurface, RecordingSurface, SurfaceEvent, SurfaceLog};
pub use tracker::{SimConfig, SimProbe, SimStats, SimulatedTracker};
