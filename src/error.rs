//! Crate-wide error taxonomy.
//!
//! Hand-rolled enum with `Display` and `std::error::Error` impls. Nothing is
//! caught or retried inside the crate; every failure propagates to the caller
//! via [`Result`] and `?`.

use std::fmt;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// All failure modes of the Jacobian hooks and their collaborators.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Error {
    /// An accessor was queried before any forward pass populated the
    /// attachment's capture state. Also surfaces when gradient tracking was
    /// turned off between attachment and evaluation, since the injected leaf
    /// then never receives a gradient.
    Uninitialized {
        /// Which accessor was queried too early.
        what: &'static str,
    },
    /// A tensor operation was given inconsistently-shaped operands.
    ShapeMismatch {
        /// The operation that rejected its operands.
        op: &'static str,
        /// What the operation required.
        expected: String,
        /// What it was given.
        got: String,
    },
    /// The requested downstream output range is empty (`stop <= start`).
    EmptyOutputRange {
        /// Start of the requested range.
        start: usize,
        /// End of the requested range.
        stop: usize,
    },
    /// The requested downstream output range ends past the feature width.
    RangeOutOfBounds {
        /// End of the requested range.
        stop: usize,
        /// Actual feature width of the downstream point.
        width: usize,
    },
    /// Reverse-mode recording is globally disabled, so an attachment could
    /// never observe a gradient.
    GradientTrackingDisabled,
    /// The network has no interception point with the given name.
    UnknownHookPoint {
        /// The name that failed to resolve.
        point: String,
    },
    /// A hook handle did not match any installed hook.
    UnknownHook,
    /// The downstream interceptor fired without an upstream capture in the
    /// same forward pass, so the two points are misordered or unrelated.
    UpstreamNotCaptured,
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Uninitialized { what } => {
                write!(
                    f,
                    "{} is not initialized; run a forward pass through the network first",
                    what
                )
            }
            Error::ShapeMismatch { op, expected, got } => {
                write!(f, "shape mismatch in {}: expected {}, got {}", op, expected, got)
            }
            Error::EmptyOutputRange { start, stop } => {
                write!(
                    f,
                    "empty downstream output range: start {} is not below stop {}",
                    start, stop
                )
            }
            Error::RangeOutOfBounds { stop, width } => {
                write!(
                    f,
                    "downstream output range stops at {} but the feature width is {}",
                    stop, width
                )
            }
            Error::GradientTrackingDisabled => {
                write!(
                    f,
                    "gradient tracking is disabled; enable it (e.g. via GradGuard) before attaching"
                )
            }
            Error::UnknownHookPoint { point } => {
                write!(f, "no hook point named '{}' in this network", point)
            }
            Error::UnknownHook => write!(f, "no such hook installed on this network"),
            Error::UpstreamNotCaptured => {
                write!(
                    f,
                    "downstream hook fired without an upstream capture; the upstream point \
                     must precede the downstream point in the forward pass"
                )
            }
        }
    }
}

impl std::error::Error for Error {}
