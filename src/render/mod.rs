/// The backend capability trait and variant construction.
pub mod backend;
/// CPU-bitmap backend.
pub mod bitmap;
/// Cross-API wrap/acquire/release typestate.
pub mod bridge;
pub(crate) mod composite;
pub(crate) mod convert;
/// Single-API GPU backend.
#[cfg(feature = "gpu")]
pub mod gpu;
/// Dual-API interop backend.
#[cfg(feature = "gpu")]
pub mod interop;
/// The blend-mode selector.
pub mod mode;
/// CPU buffer pooling.
pub mod pool;
/// Fence tokens and bounded async depth.
pub mod sync;
