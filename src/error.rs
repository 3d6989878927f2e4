use thiserror::Error;

/// フィルタ・キネマティクス計算のエラー
///
/// どれも入力が原因なので、検出した時点で失敗させる（NaNを流さない）。
#[derive(Debug, Clone, PartialEq, Error)]
pub enum KinematicsError {
    #[error("shape mismatch: expected {expected}, got {actual}")]
    ShapeMismatch { expected: String, actual: String },

    #[error("cutoff {cutoff} Hz must be in (0, {nyquist}) Hz (Nyquist)")]
    InvalidCutoff { cutoff: f64, nyquist: f64 },

    #[error("filter order must be an even integer >= 2, got {0}")]
    InvalidOrder(usize),

    #[error("moving average window must be >= 1, got {0}")]
    InvalidWindow(usize),

    #[error("{operation} needs at least {required} frames, got {actual}")]
    InsufficientFrames {
        operation: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("zero-length vector for connection {connection} at frame {frame}")]
    DegenerateVector { connection: String, frame: usize },

    #[error("frame rate must be finite and > 0, got {0}")]
    InvalidFrameRate(f64),

    #[error("non-finite coordinate for joint {joint} at frame {frame}")]
    NonFiniteCoordinate { joint: String, frame: usize },

    #[error("confidence {value} of joint {joint} is outside [0, 1]")]
    InvalidConfidence { joint: String, value: f64 },

    #[error("unknown joint: {0}")]
    UnknownJoint(String),
}

impl KinematicsError {
    pub(crate) fn shape(expected: impl Into<String>, actual: impl Into<String>) -> Self {
        Self::ShapeMismatch {
            expected: expected.into(),
            actual: actual.into(),
        }
    }

    pub(crate) fn too_short(operation: &'static str, required: usize, actual: usize) -> Self {
        Self::InsufficientFrames {
            operation,
            required,
            actual,
        }
    }
}

pub type Result<T> = std::result::Result<T, KinematicsError>;

/// fps の検証 (有限かつ正)
pub(crate) fn check_frame_rate(fps: f64) -> Result<()> {
    if fps.is_finite() && fps > 0.0 {
        Ok(())
    } else {
        Err(KinematicsError::InvalidFrameRate(fps))
    }
}
