//! Feature-gated logging macros
//!
//! Every event this crate emits goes through these macros so that builds
//! without the `tracing` feature carry no logging code at all.

/// Debug-level event, used for malformed input that was recovered locally
#[cfg(feature = "tracing")]
macro_rules! trace_debug {
    ($($arg:tt)*) => {
        tracing::debug!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_debug {
    ($($arg:tt)*) => {};
}

/// Warn-level event, used for I/O failures the caller should hear about
#[cfg(feature = "tracing")]
macro_rules! trace_warn {
    ($($arg:tt)*) => {
        tracing::warn!($($arg)*)
    };
}

#[cfg(not(feature = "tracing"))]
macro_rules! trace_warn {
    ($($arg:tt)*) => {};
}
