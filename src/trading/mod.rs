pub mod controller;
pub mod tracker;
pub mod trailing;

pub use controller::{EngineState, SignalLifecycleController, SignalOutcome, TickOutcome};
pub use tracker::{CancelOutcome, OrderGroupTracker, PlacementError, TrackerEvent};
pub use trailing::{SlChange, StopAdjustment, StopTarget, TrailingStopEngine};
