//! Textover renders text overlays onto video frames across memory domains.
//!
//! The engine negotiates a blend mode from the output caps, instantiates the matching render
//! backend (CPU bitmap, single GPU API, or dual-API interop), and drives the per-frame
//! draw → blend sequence with a cached rasterization per distinct layout. The public API is
//! orchestrator-oriented:
//!
//! - Negotiate with [`OverlayEngine::set_caps`]
//! - Install a shaped [`Layout`]
//! - Feed frames through [`OverlayEngine::draw_and_blend`]
#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod foundation;

pub(crate) mod frame;
pub(crate) mod layout;
/// Render backends and the blend-mode selector.
pub mod render;
/// The orchestrator and allocation negotiation.
pub mod overlay;

pub use crate::foundation::core::{
    DeviceCaps, DeviceId, MemoryDomain, OutputConfig, PixelFormat, Placement, ResourceFlags,
};
pub use crate::foundation::error::{OverlayError, OverlayResult};

pub use crate::frame::{AttachedOverlay, FrameData, Plane, PlaneBuf, VideoFrame, copy_planes};
pub use crate::layout::text::{Layout, LayoutKey, LayoutShaper, TextBrush};
pub use crate::overlay::alloc::{AllocationQuery, PoolProposal};
pub use crate::overlay::engine::{EngineOpts, EngineStats, OverlayEngine};
pub use crate::render::backend::{BackendStats, RenderBackend, RenderedInfo, create_backend};
pub use crate::render::mode::{BlendMode, select};
pub use crate::render::sync::{DEFAULT_ASYNC_DEPTH, FenceClock, FenceToken, InFlightRing, WriteFence};

#[cfg(feature = "gpu")]
pub use crate::render::gpu::{GpuContext, GpuFenceClock, GpuSurface, SingleApiBackend};
#[cfg(feature = "gpu")]
pub use crate::render::interop::InteropBackend;
