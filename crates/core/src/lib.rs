//! Core library for grainscore.
//!
//! The crate models the time-varying side of a granular score: piecewise
//! curves that can be evaluated and integrated, the parameters built on top
//! of them, and the pointer controller that turns a stream's speed and loop
//! settings into a read position for every grain. Each module owns one
//! concern and everything runs single-threaded on simulated time.

pub mod config;
pub mod diagnostics;
pub mod distribution;
pub mod envelope;
pub mod error;
pub mod parameter;
pub mod pointer;
pub mod timeline;

pub use config::{PointerSpec, StreamConfig};
pub use diagnostics::{DiagnosticEvent, DiagnosticSummary, Diagnostics, RecordingDiagnostics, TracingDiagnostics};
pub use distribution::{CycleLayout, TimeDistribution};
pub use envelope::{Breakpoint, CompactSpec, Envelope, EnvelopeKind, EnvelopeSpec, TimeMode};
pub use error::{GrainScoreError, Result};
pub use parameter::{ParamValue, Parameter, ParameterBounds};
pub use pointer::{PointerController, PointerParams};
pub use timeline::{trace_grains, GrainEvent, OnsetSchedule};
