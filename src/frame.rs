use std::sync::Arc;

use crate::foundation::core::{DeviceId, MemoryDomain, PixelFormat, Placement, ResourceFlags};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::layout::text::LayoutKey;

/// One plane of CPU pixel data.
#[derive(Clone, Debug)]
pub struct Plane {
    /// Row stride in bytes. May exceed `width * bytes_per_pixel`.
    pub stride: usize,
    /// Plane bytes, `stride * plane_height` long.
    pub data: Vec<u8>,
}

/// CPU-side pixel storage for a frame: one [`Plane`] per format plane.
#[derive(Clone, Debug)]
pub struct PlaneBuf {
    /// Pixel format of the buffer.
    pub format: PixelFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Planes in format order.
    pub planes: Vec<Plane>,
}

impl PlaneBuf {
    /// Allocate a zero-initialized buffer with tight strides.
    pub fn alloc(format: PixelFormat, width: u32, height: u32) -> OverlayResult<Self> {
        if width == 0 || height == 0 {
            return Err(OverlayError::resource("plane buffer dimensions zero"));
        }
        let mut planes = Vec::with_capacity(format.plane_count());
        for p in 0..format.plane_count() {
            let (pw, ph) = format.plane_size(p, width, height);
            let stride = (pw as usize)
                .checked_mul(format.bytes_per_pixel(p))
                .ok_or_else(|| OverlayError::resource("plane stride overflow"))?;
            let len = stride
                .checked_mul(ph as usize)
                .ok_or_else(|| OverlayError::resource("plane size overflow"))?;
            planes.push(Plane {
                stride,
                data: vec![0; len],
            });
        }
        Ok(Self {
            format,
            width,
            height,
            planes,
        })
    }

    /// Zero every plane. Pools make no content guarantee, so recycled buffers go through this.
    pub fn clear(&mut self) {
        for plane in &mut self.planes {
            plane.data.fill(0);
        }
    }
}

/// What actually backs a [`VideoFrame`].
#[derive(Debug)]
pub enum FrameData {
    /// CPU memory.
    Cpu(PlaneBuf),
    /// A GPU texture in the single-API or interop resource space.
    #[cfg(feature = "gpu")]
    Texture(crate::render::gpu::GpuSurface),
}

/// Rendered overlay pixels attached to a frame as metadata instead of being composited.
///
/// Downstream compositors consume this when the engine operates in attach-only mode.
#[derive(Clone, Debug)]
pub struct AttachedOverlay {
    /// Identity of the layout the pixels were rasterized from.
    pub key: LayoutKey,
    /// Overlay width in pixels.
    pub width: u32,
    /// Overlay height in pixels.
    pub height: u32,
    /// Premultiplied RGBA8 bytes, tightly packed.
    pub data: Arc<Vec<u8>>,
    /// Requested placement inside the frame.
    pub placement: Placement,
}

/// A video frame moving through the pipeline.
///
/// Tagged with its memory domain, pixel format, device identity and resource capability flags;
/// the tags drive backend selection, in-place eligibility and device-change detection.
#[derive(Debug)]
pub struct VideoFrame {
    /// Pixel format.
    pub format: PixelFormat,
    /// Memory domain the payload lives in.
    pub domain: MemoryDomain,
    /// Device the payload belongs to. `None` for system memory.
    pub device: Option<DeviceId>,
    /// Capability flags of the underlying resource.
    pub flags: ResourceFlags,
    /// The pixel payload.
    pub data: FrameData,
    /// Attach-only overlay metadata, if any.
    pub attached: Option<AttachedOverlay>,
}

impl VideoFrame {
    /// Build a system-memory frame with freshly allocated zeroed planes.
    pub fn alloc_cpu(format: PixelFormat, width: u32, height: u32) -> OverlayResult<Self> {
        Ok(Self {
            format,
            domain: MemoryDomain::System,
            device: None,
            flags: ResourceFlags::owned(),
            data: FrameData::Cpu(PlaneBuf::alloc(format, width, height)?),
            attached: None,
        })
    }

    /// Frame width in pixels.
    pub fn width(&self) -> u32 {
        match &self.data {
            FrameData::Cpu(buf) => buf.width,
            #[cfg(feature = "gpu")]
            FrameData::Texture(t) => t.width,
        }
    }

    /// Frame height in pixels.
    pub fn height(&self) -> u32 {
        match &self.data {
            FrameData::Cpu(buf) => buf.height,
            #[cfg(feature = "gpu")]
            FrameData::Texture(t) => t.height,
        }
    }

    /// True when both frames carry resources of the same device.
    pub fn same_device(&self, other: &VideoFrame) -> bool {
        self.device == other.device
    }

    /// Borrow the CPU planes, failing for GPU-backed frames.
    pub fn cpu_planes(&self) -> OverlayResult<&PlaneBuf> {
        match &self.data {
            FrameData::Cpu(buf) => Ok(buf),
            #[cfg(feature = "gpu")]
            FrameData::Texture(_) => Err(OverlayError::frame(
                "frame is GPU-backed, no CPU planes available",
            )),
        }
    }

    /// Mutably borrow the CPU planes, failing for GPU-backed frames.
    pub fn cpu_planes_mut(&mut self) -> OverlayResult<&mut PlaneBuf> {
        match &mut self.data {
            FrameData::Cpu(buf) => Ok(buf),
            #[cfg(feature = "gpu")]
            FrameData::Texture(_) => Err(OverlayError::frame(
                "frame is GPU-backed, no CPU planes available",
            )),
        }
    }

    /// Attach rendered overlay pixels as metadata (attach-only mode).
    pub fn attach_overlay(&mut self, overlay: AttachedOverlay) {
        self.attached = Some(overlay);
    }

    /// Allocate a writable frame with the same format, dimensions and domain as `self`.
    ///
    /// The upload destination when an in-place blend is refused: always render-target-eligible,
    /// never decoder-only, on the same device as the source.
    pub fn alloc_like(&self) -> OverlayResult<Self> {
        match &self.data {
            FrameData::Cpu(buf) => Self::alloc_cpu(self.format, buf.width, buf.height),
            #[cfg(feature = "gpu")]
            FrameData::Texture(t) => {
                Self::alloc_gpu(t.ctx.clone(), self.format, t.width, t.height, self.domain)
            }
        }
    }
}

/// Generic plane-by-plane copy between two CPU frames of identical format and size.
///
/// This is the slow upload fallback; intra-domain device copies are handled by the backends.
pub fn copy_planes(src: &VideoFrame, dst: &mut VideoFrame) -> OverlayResult<()> {
    if src.format != dst.format || src.width() != dst.width() || src.height() != dst.height() {
        return Err(OverlayError::frame(
            "plane copy requires matching format and dimensions",
        ));
    }
    let (width, height) = (src.width(), src.height());
    let format = src.format;
    let src_planes = src.cpu_planes()?;
    let dst_planes = dst.cpu_planes_mut()?;
    for p in 0..format.plane_count() {
        let (pw, ph) = format.plane_size(p, width, height);
        let row_bytes = pw as usize * format.bytes_per_pixel(p);
        let sp = &src_planes.planes[p];
        let dp = &mut dst_planes.planes[p];
        for row in 0..ph as usize {
            let s = row * sp.stride;
            let d = row * dp.stride;
            dp.data[d..d + row_bytes].copy_from_slice(&sp.data[s..s + row_bytes]);
        }
    }
    Ok(())
}

#[cfg(test)]
#[path = "../tests/unit/frame.rs"]
mod tests;
