//! Error taxonomy and status codes.
//!
//! Every fallible engine call returns [`TrackerError`]. The flat entry points in
//! [`crate::api`] collapse errors to a [`StatusCode`]:
//!
//! | code | meaning |
//! |------|---------|
//! | 0 | success |
//! | 1 | generic failure (device unavailable, streaming disabled, cancelled, internal or transport failure, no calibration) |
//! | 2 | session not open |
//! | 3 | session already open |
//! | 4 | invalid parameters |
//! | 5 | timed out |
//! | 6 | busy |

use hardware::DeviceError;
use thiserror::Error;

/// Errors returned by the tracking engine.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    /// Operation requires an open session.
    #[error("Session is not open")]
    NotOpen,

    #[error("Session is already open")]
    AlreadyOpen,

    /// Opening failed because the tracker could not be reached.
    #[error("Device unavailable: {0}")]
    DeviceUnavailable(String),

    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    /// A calibration run is already in progress.
    #[error("Session busy: calibration in progress")]
    SessionBusy,

    /// The wait elapsed. Nothing was consumed; the call can be retried.
    #[error("Timed out")]
    TimedOut,

    /// Samples were requested but streaming was never enabled.
    #[error("Streaming has not been enabled")]
    StreamingDisabled,

    #[error("Operation cancelled")]
    Cancelled,

    /// Waiting for a calibration result before any run was started.
    #[error("No calibration has been started")]
    NoCalibration,

    /// Transport failure surfaced synchronously.
    #[error("Device error: {0}")]
    Device(#[from] DeviceError),

    #[error("Internal failure: {0}")]
    InternalFailure(String),
}

/// Result type for engine operations.
pub type TrackerResult<T> = Result<T, TrackerError>;

/// Integer status returned by the flat entry points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i32)]
pub enum StatusCode {
    Success = 0,
    Failure = 1,
    NotOpen = 2,
    AlreadyOpen = 3,
    InvalidParameters = 4,
    TimedOut = 5,
    Busy = 6,
}

impl StatusCode {
    pub fn code(self) -> i32 {
        self as i32
    }

    pub fn is_success(self) -> bool {
        self == StatusCode::Success
    }

    /// Collapse an engine result to its status code.
    pub fn of<T>(result: &TrackerResult<T>) -> Self {
        match result {
            Ok(_) => StatusCode::Success,
            Err(e) => e.status_code(),
        }
    }
}

impl TrackerError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            TrackerError::NotOpen => StatusCode::NotOpen,
            TrackerError::AlreadyOpen => StatusCode::AlreadyOpen,
            TrackerError::InvalidParameters(_) => StatusCode::InvalidParameters,
            TrackerError::TimedOut => StatusCode::TimedOut,
            TrackerError::SessionBusy => StatusCode::Busy,
            TrackerError::DeviceUnavailable(_)
            | TrackerError::StreamingDisabled
            | TrackerError::Cancelled
            | TrackerError::NoCalibration
            | TrackerError::Device(_)
            | TrackerError::InternalFailure(_) => StatusCode::Failure,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes_are_stable() {
        assert_eq!(StatusCode::Success.code(), 0);
        assert_eq!(StatusCode::Failure.code(), 1);
        assert_eq!(StatusCode::NotOpen.code(), 2);
        assert_eq!(StatusCode::AlreadyOpen.code(), 3);
        assert_eq!(StatusCode::InvalidParameters.code(), 4);
        assert_eq!(StatusCode::TimedOut.code(), 5);
        assert_eq!(StatusCode::Busy.code(), 6);
    }

    #[test]
    fn test_error_mapping() {
        assert_eq!(TrackerError::NotOpen.status_code(), StatusCode::NotOpen);
        assert_eq!(TrackerError::SessionBusy.status_code(), StatusCode::Busy);
        assert_eq!(TrackerError::TimedOut.status_code(), StatusCode::TimedOut);
        assert_eq!(
            TrackerError::InvalidParameters("eye".into()).status_code(),
            StatusCode::InvalidParameters
        );
        assert_eq!(
            TrackerError::from(DeviceError::NotConnected).status_code(),
            StatusCode::Failure
        );
        assert_eq!(
            TrackerError::StreamingDisabled.status_code(),
            StatusCode::Failure
        );
    }

    #[test]
    fn test_status_of_result() {
        let ok: TrackerResult<u8> = Ok(1);
        assert!(StatusCode::of(&ok).is_success());
        let err: TrackerResult<u8> = Err(TrackerError::AlreadyOpen);
        assert_eq!(StatusCode::of(&err), StatusCode::AlreadyOpen);
    }
}
