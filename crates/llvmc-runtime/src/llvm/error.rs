use crate::ffi::handle::{Handle, HandleKind};
use crate::ffi::loader::LoadError;
use crate::ffi::marshal::MarshalError;
use crate::ffi::owned::LifecycleError;
use thiserror::Error;

/// Errors surfaced by the safe LLVM wrappers
#[derive(Error, Debug)]
pub enum NativeError {
    /// The native call reported failure; `message` is its text, verbatim
    #[error("{operation} failed: {}", .message.as_deref().unwrap_or("no message"))]
    Failed {
        operation: &'static str,
        message: Option<String>,
    },

    #[error("{what} not found")]
    NotFound { what: String },

    #[error(transparent)]
    Marshal(#[from] MarshalError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Config(#[from] llvmc_config::ConfigError),
}

impl NativeError {
    /// The native message attached to a failure, if any
    pub fn message(&self) -> Option<&str> {
        match self {
            NativeError::Failed { message, .. } => message.as_deref(),
            _ => None,
        }
    }
}

/// Result type for native operations
pub type NativeResult<T> = Result<T, NativeError>;

pub(crate) fn failed(operation: &'static str, message: Option<String>) -> NativeError {
    log::warn!(
        "{} failed: {}",
        operation,
        message.as_deref().unwrap_or("no message")
    );
    NativeError::Failed { operation, message }
}

pub(crate) fn non_null<K: HandleKind>(handle: Handle<K>) -> Result<Handle<K>, NativeError> {
    handle
        .non_null()
        .ok_or(NativeError::Lifecycle(LifecycleError::NullHandle { kind: K::NAME }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ffi::handle::TypeRef;

    #[test]
    fn test_failed_display_keeps_message_verbatim() {
        let err = NativeError::Failed {
            operation: "LLVMVerifyModule",
            message: Some("Broken module found, compilation aborted!".to_string()),
        };
        assert_eq!(
            err.to_string(),
            "LLVMVerifyModule failed: Broken module found, compilation aborted!"
        );
        assert_eq!(err.message(), Some("Broken module found, compilation aborted!"));
    }

    #[test]
    fn test_failed_without_message() {
        let err = failed("LLVMPrintModuleToString", None);
        assert_eq!(err.to_string(), "LLVMPrintModuleToString failed: no message");
        assert_eq!(err.message(), None);
    }

    #[test]
    fn test_non_null_rejects_null() {
        assert!(matches!(
            non_null(TypeRef::null()),
            Err(NativeError::Lifecycle(LifecycleError::NullHandle { kind: "type" }))
        ));
        assert!(non_null(TypeRef::from_addr(0x40)).is_ok());
    }
}
