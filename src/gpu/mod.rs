//! GPU orchestration for the lookback stress harness.
//!
//! Everything device-facing lives here: session negotiation, the fixed
//! buffer set, kernel pipeline construction, the blocking bridge over the
//! async device runtime, trial execution, and hazard telemetry decoding.

pub mod buffers;
pub mod device;
pub mod hazard;
pub mod runner;
pub mod shaders;
pub mod sync;

pub use buffers::ResourceSet;
pub use device::GpuSession;
pub use runner::{BatchReport, TrialRunner};
pub use shaders::PipelineSet;
