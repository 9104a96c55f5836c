use std::sync::Arc;

use crate::foundation::core::{OutputConfig, Placement};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::VideoFrame;
use crate::layout::text::{Layout, LayoutKey};
use crate::overlay::alloc::AllocationQuery;
use crate::render::mode::BlendMode;

/// Summary of a rasterized layout held in a backend's cache.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RenderedInfo {
    /// Identity of the layout the buffer was rasterized from.
    pub key: LayoutKey,
    /// Buffer width in pixels.
    pub width: u32,
    /// Buffer height in pixels.
    pub height: u32,
}

/// Per-backend rasterization counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BackendStats {
    /// Times a layout was actually rasterized (cache misses).
    pub rasterizations: u64,
    /// Times the cached rendering was served unchanged.
    pub cache_hits: u64,
}

/// The capability set every render backend variant implements.
///
/// Exactly one variant is instantiated at a time and owned exclusively by the orchestrator.
/// All methods stay inside the backend's execution domain; crossing domains is the orchestrator's
/// job (via rebuild), never the backend's.
pub trait RenderBackend {
    /// Rasterize `layout` into a pooled buffer at the layout's declared dimensions.
    ///
    /// When the cache already holds a rendering for the same layout identity it is returned
    /// unchanged: rasterization cost is paid once per distinct text content, not once per frame.
    fn draw_layout(&mut self, layout: &Layout) -> OverlayResult<RenderedInfo>;

    /// Composite the cached rendering for `key` onto `frame` at `placement`.
    ///
    /// Returns `false` on backend-level failure (device error, converter creation failure);
    /// the caller decides whether to drop or pass the frame through.
    fn blend(&mut self, key: LayoutKey, placement: Placement, frame: &mut VideoFrame) -> bool;

    /// Whether `frame` may serve as the blend destination directly.
    ///
    /// True only if the frame's resource belongs to this backend's execution domain, matches its
    /// current device, and is flagged render-target-eligible. Decoder-only resources never
    /// qualify.
    fn can_blend_in_place(&self, frame: &VideoFrame) -> bool;

    /// Whether `frame` belongs to a different device than this backend.
    ///
    /// A `true` return is destructive: the backend has already cleared its internal resources
    /// and the orchestrator must rebuild before continuing.
    fn update_device(&mut self, frame: &VideoFrame) -> bool;

    /// Bind this backend to the device carried by `frame`, if any.
    ///
    /// Called on a freshly rebuilt backend so the triggering frame continues through the
    /// per-frame sequence instead of failing its first draw. Backends with no device state
    /// accept every frame.
    fn bind_device(&mut self, _frame: &VideoFrame) -> OverlayResult<()> {
        Ok(())
    }

    /// Copy `src` into `dst` when an in-place blend is not possible.
    ///
    /// Uses a device-native copy when both frames share domain and device, falling back to a
    /// generic plane-by-plane copy otherwise. Returns `false` on failure.
    fn upload(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> bool;

    /// Negotiate pool parameters with the upstream allocator, answering `query` in place.
    ///
    /// Must not assume a pool already exists.
    fn handle_allocation_query(&mut self, query: &mut AllocationQuery) -> bool;

    /// Rasterization counters.
    fn stats(&self) -> BackendStats;

    /// The cached rendering as tightly packed premultiplied RGBA8 bytes.
    ///
    /// Used by attach-only mode. Backends whose cache is not CPU-readable without a device
    /// round-trip may refuse.
    fn attach_payload(&mut self, _key: LayoutKey) -> OverlayResult<(u32, u32, Arc<Vec<u8>>)> {
        Err(OverlayError::frame(
            "backend cannot expose an attach payload",
        ))
    }
}

/// Instantiate the backend variant for `mode` against the negotiated output.
///
/// The mapping is closed: software and attach-only modes run on the bitmap backend; the GPU
/// modes run on the single-API backend unless the output domain is the bridged interop space.
/// `async_depth` bounds unretired GPU submissions; the bitmap backend has no use for it.
pub fn create_backend(
    mode: BlendMode,
    output: &OutputConfig,
    async_depth: usize,
) -> OverlayResult<Box<dyn RenderBackend>> {
    match mode {
        BlendMode::NotSupported => Err(OverlayError::negotiation(
            "no backend exists for an unsupported mode",
        )),
        BlendMode::AttachOnly | BlendMode::SoftwareBlend => {
            let _ = async_depth;
            Ok(Box::new(crate::render::bitmap::BitmapBackend::new(output)?))
        }
        BlendMode::DirectBlend | BlendMode::ConvertBlend | BlendMode::ConvertBlendWide => {
            #[cfg(feature = "gpu")]
            {
                use crate::foundation::core::MemoryDomain;
                if output.domain == MemoryDomain::GpuInterop {
                    Ok(Box::new(
                        crate::render::interop::InteropBackend::with_async_depth(
                            output,
                            mode,
                            async_depth,
                        )?,
                    ))
                } else {
                    Ok(Box::new(crate::render::gpu::SingleApiBackend::with_async_depth(
                        output,
                        mode,
                        async_depth,
                    )?))
                }
            }
            #[cfg(not(feature = "gpu"))]
            {
                Err(OverlayError::negotiation(
                    "gpu blend modes require the `gpu` feature",
                ))
            }
        }
    }
}
