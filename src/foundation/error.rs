/// Convenience alias used throughout the crate.
pub type OverlayResult<T> = Result<T, OverlayError>;

/// Error taxonomy for the overlay engine.
///
/// The categories map onto distinct recovery policies:
///
/// - [`OverlayError::Negotiation`]: surfaced once at `set_caps` time, the pipeline falls back to
///   passthrough; not fatal.
/// - [`OverlayError::Resource`]: allocation of a pool, texture or render target failed, fatal for
///   the current configuration attempt, never retried automatically.
/// - [`OverlayError::Frame`]: a draw or blend failed without a device-loss signal; the frame is
///   dropped and the backend left intact.
/// - [`OverlayError::DeviceLost`]: triggers a full backend rebuild; a failed rebuild escalates to
///   [`OverlayError::Resource`].
/// - [`OverlayError::InteropOrder`]: acquire/release ordering was violated on a bridged resource.
///   This is a programming error; the public contract is designed to make it unreachable.
#[derive(thiserror::Error, Debug)]
pub enum OverlayError {
    /// Unsupported format/domain combination at caps time.
    #[error("negotiation error: {0}")]
    Negotiation(String),

    /// Pool/texture/render-target allocation failure.
    #[error("resource error: {0}")]
    Resource(String),

    /// Recoverable per-frame rendering failure.
    #[error("frame error: {0}")]
    Frame(String),

    /// The graphics device backing the active backend went away.
    #[error("device lost: {0}")]
    DeviceLost(String),

    /// Wrap/acquire/release ordering violation on an interop resource.
    #[error("interop ordering violation: {0}")]
    InteropOrder(String),

    /// Wrapped error from a collaborator.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl OverlayError {
    /// Build a [`OverlayError::Negotiation`].
    pub fn negotiation(msg: impl Into<String>) -> Self {
        Self::Negotiation(msg.into())
    }

    /// Build a [`OverlayError::Resource`].
    pub fn resource(msg: impl Into<String>) -> Self {
        Self::Resource(msg.into())
    }

    /// Build a [`OverlayError::Frame`].
    pub fn frame(msg: impl Into<String>) -> Self {
        Self::Frame(msg.into())
    }

    /// Build a [`OverlayError::DeviceLost`].
    pub fn device_lost(msg: impl Into<String>) -> Self {
        Self::DeviceLost(msg.into())
    }

    /// Build a [`OverlayError::InteropOrder`].
    pub fn interop_order(msg: impl Into<String>) -> Self {
        Self::InteropOrder(msg.into())
    }

    /// True for failures that must tear down the current configuration.
    pub fn is_fatal_for_config(&self) -> bool {
        matches!(self, Self::Resource(_) | Self::DeviceLost(_))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
