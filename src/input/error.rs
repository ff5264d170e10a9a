//! Pipeline Error Types
//!
//! Error handling for the interception and re-synthesis pipeline, plus the
//! classification and recovery tables the tap thread consults. No error in
//! this module is allowed to terminate the capture thread: every variant maps
//! to a recovery action that either degrades to pass-through, retries once,
//! or drops a best-effort event.

use crate::accel::regression::FitError;
use crate::device::DeviceId;
use crate::output::ProducerId;
use thiserror::Error;

/// Result type for pipeline operations
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Pipeline error types
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Polynomial regression could not produce a curve
    #[error("Curve fit failed: {0}")]
    Fit(#[from] FitError),

    /// The originating device is unknown to the registry
    #[error("Device not found: {0}")]
    DeviceNotFound(DeviceId),

    /// The output coordinator refused the emission
    #[error("Emission refused for device {device}: sequence held by {holder:?}")]
    EmissionRefused {
        /// Target device
        device: DeviceId,
        /// Producer currently holding the device (None = lock contention)
        holder: Option<ProducerId>,
    },

    /// Configuration rejected at load time
    #[error("Invalid configuration: {0}")]
    ConfigurationInvalid(String),

    /// Acceleration sample table is malformed
    #[error("Invalid acceleration table: {0}")]
    InvalidTable(String),

    /// Event sink failed to inject
    #[error("Event sink error: {0}")]
    Sink(String),

    /// Event source failed to deliver
    #[error("Event source error: {0}")]
    Source(String),

    /// Control channel closed
    #[error("Tap channel closed")]
    ChannelClosed,

    /// Invalid state transition requested
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error classification for recovery strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorType {
    /// Curve fitting errors
    Fit,
    /// Device identity errors
    Device,
    /// Output contention
    Contention,
    /// Configuration errors
    Configuration,
    /// Injection/capture IO errors
    Io,
    /// State machine errors
    State,
}

/// Classify error for recovery strategy selection
pub fn classify_error(error: &PipelineError) -> ErrorType {
    match error {
        PipelineError::Fit(_) => ErrorType::Fit,

        PipelineError::DeviceNotFound(_) => ErrorType::Device,

        PipelineError::EmissionRefused { .. } => ErrorType::Contention,

        PipelineError::ConfigurationInvalid(_) | PipelineError::InvalidTable(_) => {
            ErrorType::Configuration
        }

        PipelineError::Sink(_)
        | PipelineError::Source(_)
        | PipelineError::ChannelClosed
        | PipelineError::Io(_) => ErrorType::Io,

        PipelineError::InvalidState(_) => ErrorType::State,
    }
}

/// Recovery action to take after error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryAction {
    /// Forward the raw event unmodified
    PassThrough,
    /// Park the emission and retry once on the next scheduling opportunity
    RetryOnce,
    /// Drop the event with a diagnostic
    Drop,
    /// Replace the fitted curve with piecewise-linear interpolation
    FallbackLinear,
    /// Reject the new configuration, keep the active one
    KeepPreviousConfig,
    /// Drive the affected session back to idle
    ResetSession,
    /// Stop the component (only outside the capture thread)
    Fail,
}

/// Determine recovery action for error
///
/// `attempt` is the number of times the operation has already been retried.
pub fn recovery_action(error: &PipelineError, attempt: u32) -> RecoveryAction {
    match classify_error(error) {
        ErrorType::Fit => RecoveryAction::FallbackLinear,

        ErrorType::Device => RecoveryAction::PassThrough,

        ErrorType::Contention => {
            if attempt == 0 {
                RecoveryAction::RetryOnce
            } else {
                RecoveryAction::Drop
            }
        }

        ErrorType::Configuration => RecoveryAction::KeepPreviousConfig,

        ErrorType::Io => match error {
            PipelineError::ChannelClosed => RecoveryAction::Fail,
            _ => RecoveryAction::Drop,
        },

        ErrorType::State => RecoveryAction::ResetSession,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_classification() {
        let error = PipelineError::Fit(FitError::Singular);
        assert_eq!(classify_error(&error), ErrorType::Fit);

        let error = PipelineError::DeviceNotFound(DeviceId(7));
        assert_eq!(classify_error(&error), ErrorType::Device);

        let error = PipelineError::EmissionRefused {
            device: DeviceId(1),
            holder: Some(ProducerId::Drag),
        };
        assert_eq!(classify_error(&error), ErrorType::Contention);

        let error = PipelineError::ConfigurationInvalid("tie".to_string());
        assert_eq!(classify_error(&error), ErrorType::Configuration);

        let error = PipelineError::Sink("uinput".to_string());
        assert_eq!(classify_error(&error), ErrorType::Io);
    }

    #[test]
    fn test_device_not_found_passes_through() {
        let error = PipelineError::DeviceNotFound(DeviceId(3));
        assert_eq!(recovery_action(&error, 0), RecoveryAction::PassThrough);
        assert_eq!(recovery_action(&error, 5), RecoveryAction::PassThrough);
    }

    #[test]
    fn test_emission_refused_retries_once_then_drops() {
        let error = PipelineError::EmissionRefused {
            device: DeviceId(1),
            holder: None,
        };
        assert_eq!(recovery_action(&error, 0), RecoveryAction::RetryOnce);
        assert_eq!(recovery_action(&error, 1), RecoveryAction::Drop);
    }

    #[test]
    fn test_fit_error_falls_back() {
        let error = PipelineError::Fit(FitError::TooFewSamples {
            samples: 2,
            degree: 3,
        });
        assert_eq!(recovery_action(&error, 0), RecoveryAction::FallbackLinear);
    }

    #[test]
    fn test_config_error_keeps_previous() {
        let error = PipelineError::ConfigurationInvalid("bad".to_string());
        assert_eq!(
            recovery_action(&error, 0),
            RecoveryAction::KeepPreviousConfig
        );
    }

    #[test]
    fn test_io_errors_never_stop_the_tap() {
        let error = PipelineError::Source("read failed".to_string());
        assert_eq!(recovery_action(&error, 0), RecoveryAction::Drop);
        assert_eq!(
            recovery_action(&PipelineError::ChannelClosed, 0),
            RecoveryAction::Fail
        );
    }

    #[test]
    fn test_error_display() {
        let error = PipelineError::DeviceNotFound(DeviceId(42));
        assert_eq!(error.to_string(), "Device not found: device#42");
    }
}
