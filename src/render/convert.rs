//! Opaque converter contract.
//!
//! A converter is a fixed-contract operation: source buffer, destination buffer, region, blend
//! flag. The engine never looks inside one; backends create them per format pair and cache them
//! until a destructive event.

use crate::foundation::core::{PixelFormat, Placement};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::PlaneBuf;
use crate::render::composite;

/// Fixed contract every converter implements.
pub trait Converter {
    /// Convert the premultiplied RGBA8 `src` region into `dst` at `placement`.
    ///
    /// With `blend` set the source is composited over the destination; without it the
    /// destination region is overwritten.
    fn run(
        &mut self,
        src: &[u8],
        src_width: u32,
        src_height: u32,
        dst: &mut PlaneBuf,
        placement: Placement,
        blend: bool,
    ) -> OverlayResult<()>;
}

/// CPU converter for a fixed destination format.
pub struct CpuConverter {
    dst_format: PixelFormat,
}

impl CpuConverter {
    /// Create a converter targeting `dst_format`, refusing formats the CPU path cannot serve.
    pub fn new(dst_format: PixelFormat) -> OverlayResult<Self> {
        match dst_format {
            PixelFormat::Rgba8
            | PixelFormat::Bgra8
            | PixelFormat::Rgba16
            | PixelFormat::Nv12
            | PixelFormat::I420 => Ok(Self { dst_format }),
            PixelFormat::P010 | PixelFormat::Unknown => Err(OverlayError::resource(format!(
                "no cpu converter for {dst_format:?}"
            ))),
        }
    }
}

impl Converter for CpuConverter {
    fn run(
        &mut self,
        src: &[u8],
        src_width: u32,
        src_height: u32,
        dst: &mut PlaneBuf,
        placement: Placement,
        blend: bool,
    ) -> OverlayResult<()> {
        if dst.format != self.dst_format {
            return Err(OverlayError::frame(
                "converter destination format mismatch",
            ));
        }
        if blend {
            return match self.dst_format {
                PixelFormat::Rgba8 | PixelFormat::Bgra8 => {
                    composite::blend_rgba8_region(dst, src, src_width, src_height, placement)
                }
                PixelFormat::Rgba16 => {
                    composite::blend_rgba16_region(dst, src, src_width, src_height, placement)
                }
                PixelFormat::Nv12 | PixelFormat::I420 => {
                    composite::blend_yuv420_region(dst, src, src_width, src_height, placement)
                }
                _ => unreachable!("constructor rejects unsupported formats"),
            };
        }

        // Overwrite convert: zero the destination region first, then blend over it. Identical
        // pixel math with a transparent base.
        overwrite_region(dst, src_width, src_height, placement);
        self.run(src, src_width, src_height, dst, placement, true)
    }
}

fn overwrite_region(dst: &mut PlaneBuf, sw: u32, sh: u32, placement: Placement) {
    let Some((_, _, dx, dy, w, h)) = composite::clip_region(placement, sw, sh, dst.width, dst.height)
    else {
        return;
    };
    let yuv = matches!(dst.format, PixelFormat::Nv12 | PixelFormat::I420);
    for p in 0..dst.format.plane_count() {
        // Neutral base: transparent black for RGBA, black video levels for YUV.
        let fill = match (yuv, p) {
            (false, _) => 0u8,
            (true, 0) => 16,
            (true, _) => 128,
        };
        let bpp = dst.format.bytes_per_pixel(p);
        let (divx, divy) = if p == 0 { (1, 1) } else { (2, 2) };
        let stride = dst.planes[p].stride;
        let x0 = dx as usize / divx * bpp;
        let row_bytes = (w as usize).div_ceil(divx) * bpp;
        for row in 0..(h as usize).div_ceil(divy) {
            let y = dy as usize / divy + row;
            let off = y * stride + x0;
            dst.planes[p].data[off..off + row_bytes].fill(fill);
        }
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/convert.rs"]
mod tests;
