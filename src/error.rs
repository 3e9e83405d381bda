//! Error types and handling for the pool bridge

/// Result type alias for pool bridge operations
pub type Result<T> = std::result::Result<T, PoolBridgeError>;

/// Errors raised while building or driving the pool bridge
#[derive(Debug, thiserror::Error)]
pub enum PoolBridgeError {
    /// Engine handle construction failed during bring-up
    #[error("Pool init failed for partition {partition}: {message}")]
    FatalInit { partition: u8, message: String },

    /// The partition could not satisfy an allocation; nothing was consumed
    #[error("No buffers: partition {partition} could not supply {requested} buffers")]
    AllocationShortfall { partition: u8, requested: usize },

    /// Operation not provided by this handle variant
    #[error("Unsupported operation: {operation} on {handle}")]
    UnsupportedOperation {
        operation: &'static str,
        handle: String,
    },

    /// Invalid parameters or configuration
    #[error("Invalid parameter: {parameter} - {message}")]
    InvalidParameter { parameter: String, message: String },

    /// Object reference does not address a slot of the partition arena
    #[error("Invalid object {address:#x} for partition {partition}")]
    InvalidObject { partition: u8, address: usize },

    /// No partition or handle pair registered under this index
    #[error("Unknown pool: {index}")]
    UnknownPool { index: usize },

    /// No operation set registered under this name
    #[error("Unknown pool ops: {name}")]
    UnknownOps { name: String },

    /// I/O related errors (mmap, sysfs, device nodes)
    #[error("I/O error: {message}")]
    Io {
        message: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// DMA mapping failures
    #[error("DMA error: {message}")]
    Dma { message: String },

    /// Platform-specific errors
    #[error("Platform error: {message}")]
    Platform { message: String },
}

impl PoolBridgeError {
    /// Create an I/O error from a standard I/O error
    pub fn from_io(source: std::io::Error, context: &str) -> Self {
        Self::Io {
            message: format!("{}: {}", context, source),
            source: Some(source),
        }
    }

    /// Create a fatal init error
    pub fn fatal_init(partition: u8, message: impl Into<String>) -> Self {
        Self::FatalInit {
            partition,
            message: message.into(),
        }
    }

    /// Create an allocation shortfall error
    pub fn no_buffers(partition: u8, requested: usize) -> Self {
        Self::AllocationShortfall {
            partition,
            requested,
        }
    }

    /// Create an unsupported operation error
    pub fn unsupported(operation: &'static str, handle: impl Into<String>) -> Self {
        Self::UnsupportedOperation {
            operation,
            handle: handle.into(),
        }
    }

    /// Create an invalid parameter error
    pub fn invalid_parameter(parameter: impl Into<String>, message: impl Into<String>) -> Self {
        Self::InvalidParameter {
            parameter: parameter.into(),
            message: message.into(),
        }
    }

    /// Create an invalid object error
    pub fn invalid_object(partition: u8, address: usize) -> Self {
        Self::InvalidObject { partition, address }
    }

    /// Create a DMA error
    pub fn dma(message: impl Into<String>) -> Self {
        Self::Dma {
            message: message.into(),
        }
    }

    /// Create a platform error
    pub fn platform(message: impl Into<String>) -> Self {
        Self::Platform {
            message: message.into(),
        }
    }

    /// True for the recoverable "no buffers" condition
    pub fn is_shortfall(&self) -> bool {
        matches!(self, Self::AllocationShortfall { .. })
    }
}

impl From<std::io::Error> for PoolBridgeError {
    fn from(err: std::io::Error) -> Self {
        Self::from_io(err, "I/O operation failed")
    }
}

impl From<nix::Error> for PoolBridgeError {
    fn from(err: nix::Error) -> Self {
        Self::platform(format!("System call failed: {}", err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = PoolBridgeError::no_buffers(0, 5);
        assert!(matches!(err, PoolBridgeError::AllocationShortfall { .. }));
        assert!(err.is_shortfall());

        let err = PoolBridgeError::fatal_init(2, "capacity is zero");
        assert!(matches!(err, PoolBridgeError::FatalInit { partition: 2, .. }));
        assert!(!err.is_shortfall());
    }

    #[test]
    fn test_error_display() {
        let err = PoolBridgeError::unsupported("dequeue", "bridge pool 0 (no cache)");
        let display = format!("{}", err);
        assert!(display.contains("Unsupported operation"));
        assert!(display.contains("(no cache)"));

        let err = PoolBridgeError::invalid_object(1, 0x1000);
        assert!(format!("{}", err).contains("0x1000"));
    }
}
