use thiserror::Error;

/// Every way a run can fail, per the propagation policy: configuration and
/// I/O failures abort before any device work starts; device-layer failures
/// are always fatal and carry the name of the failing operation.
#[derive(Debug, Error)]
pub enum FlowMapError {
    #[error("invalid configuration: {0}")]
    Configuration(String),

    #[error("failed to read frame data: {0}")]
    Io(#[from] std::io::Error),

    #[error("no suitable compute device available: {0}")]
    DeviceUnavailable(String),

    #[error("kernel build failed for '{kernel}': {log}")]
    KernelBuild { kernel: String, log: String },

    #[error("device operation '{operation}' on buffer '{buffer}' failed: {message}")]
    DeviceOp {
        operation: String,
        buffer: String,
        message: String,
    },

    #[error("invariant violated: {0}")]
    Invariant(String),
}

pub type Result<T> = std::result::Result<T, FlowMapError>;
