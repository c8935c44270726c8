//! Error types for the stress harness.
//!
//! Hazards detected by the validator are *results*, not errors: they are
//! reported through the pass/fail count, never through this type.

use thiserror::Error;

/// GPU-side failures that end the run.
#[derive(Error, Debug)]
pub enum GpuError {
    /// No GPU adapter found.
    #[error("No GPU adapter found")]
    NoAdapter,

    /// The selected adapter does not support subgroup operations.
    #[error("Adapter '{0}' does not support subgroup operations (required by the stress kernel)")]
    MissingSubgroups(String),

    /// Failed to request GPU device.
    #[error("Failed to request GPU device: {0}")]
    DeviceRequest(String),

    /// Shader compilation failed.
    #[error("Shader compilation failed for '{label}': {message}")]
    ShaderCompilation { label: String, message: String },

    /// Buffer mapping failed.
    #[error("Buffer mapping failed: {0}")]
    BufferMapping(String),

    /// The runtime dropped a completion callback without firing it.
    #[error("Device runtime dropped the {0} completion callback")]
    BridgeDisconnected(&'static str),
}
