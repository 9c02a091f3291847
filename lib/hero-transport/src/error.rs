use std::io;

pub type TransportResult<T> = Result<T, TransportError>;

#[derive(Debug)]
pub enum TransportError {
    /// The operation would have blocked; not a failure, the caller should retry later.
    Wait,
    Fatal(io::ErrorKind),
}

impl From<io::Error> for TransportError {
    #[inline]
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::WouldBlock => TransportError::Wait,
            kind => TransportError::Fatal(kind),
        }
    }
}

/// Collapses a `Wait` into "not a failure", mirroring the boolean success semantics the public
/// API exposes to callers.
pub trait ErrorUtils {
    fn has_failed(&self) -> bool;
}

impl<T> ErrorUtils for TransportResult<T> {
    fn has_failed(&self) -> bool {
        match self {
            Ok(_) => false,
            Err(TransportError::Wait) => false,
            Err(TransportError::Fatal(_)) => true,
        }
    }
}
