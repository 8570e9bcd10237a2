//! Structured state-transition events.
//!
//! Every breaker transition is emitted through `tracing` on the
//! `fusebox::events` target and handed to any registered listeners.
//! Events can be captured by any tracing subscriber (JSON file,
//! OpenTelemetry, etc.).

mod transition;

pub use transition::{
    emit_failure_recorded, emit_rejected, emit_transition, TransitionEvent, TransitionListener,
};
