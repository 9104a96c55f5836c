//! Integer software compositing over premultiplied RGBA8.

use crate::foundation::core::{PixelFormat, Placement};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::PlaneBuf;

/// One premultiplied RGBA8 pixel.
pub type PremulRgba8 = [u8; 4];

/// Source-over of premultiplied pixels.
pub fn over(dst: PremulRgba8, src: PremulRgba8) -> PremulRgba8 {
    if src[3] == 0 {
        return dst;
    }
    if src[3] == 255 {
        return src;
    }

    let inv = 255u16 - u16::from(src[3]);
    let mut out = [0u8; 4];
    for i in 0..4 {
        out[i] = src[i].saturating_add(mul_div255(u16::from(dst[i]), inv));
    }
    out
}

fn mul_div255(x: u16, y: u16) -> u8 {
    (((u32::from(x) * u32::from(y)) + 127) / 255) as u8
}

/// The overlapping region between an overlay placed at `placement` and a `dw` x `dh` frame.
///
/// Returns `(src_x, src_y, dst_x, dst_y, w, h)` or `None` for fully off-frame placement.
pub fn clip_region(
    placement: Placement,
    sw: u32,
    sh: u32,
    dw: u32,
    dh: u32,
) -> Option<(u32, u32, u32, u32, u32, u32)> {
    let dst_x0 = placement.x.max(0) as i64;
    let dst_y0 = placement.y.max(0) as i64;
    let dst_x1 = (i64::from(placement.x) + i64::from(sw)).min(i64::from(dw));
    let dst_y1 = (i64::from(placement.y) + i64::from(sh)).min(i64::from(dh));
    if dst_x1 <= dst_x0 || dst_y1 <= dst_y0 {
        return None;
    }
    let src_x = (dst_x0 - i64::from(placement.x)) as u32;
    let src_y = (dst_y0 - i64::from(placement.y)) as u32;
    Some((
        src_x,
        src_y,
        dst_x0 as u32,
        dst_y0 as u32,
        (dst_x1 - dst_x0) as u32,
        (dst_y1 - dst_y0) as u32,
    ))
}

/// Blend a premultiplied RGBA8 overlay into an RGBA8 destination plane, clipped to the frame.
pub fn blend_rgba8_region(
    dst: &mut PlaneBuf,
    src: &[u8],
    sw: u32,
    sh: u32,
    placement: Placement,
) -> OverlayResult<()> {
    if dst.format != PixelFormat::Rgba8 && dst.format != PixelFormat::Bgra8 {
        return Err(OverlayError::frame(
            "software blend destination must be RGBA8/BGRA8",
        ));
    }
    if src.len() != (sw as usize) * (sh as usize) * 4 {
        return Err(OverlayError::frame("overlay byte length mismatch"));
    }

    let swap_rb = dst.format == PixelFormat::Bgra8;
    let Some((sx, sy, dx, dy, w, h)) = clip_region(placement, sw, sh, dst.width, dst.height) else {
        return Ok(());
    };

    let dst_stride = dst.planes[0].stride;
    let dst_bytes = &mut dst.planes[0].data;
    for row in 0..h as usize {
        let s_off = ((sy as usize + row) * sw as usize + sx as usize) * 4;
        let d_off = (dy as usize + row) * dst_stride + dx as usize * 4;
        let s_row = &src[s_off..s_off + w as usize * 4];
        let d_row = &mut dst_bytes[d_off..d_off + w as usize * 4];
        for (d, s) in d_row.chunks_exact_mut(4).zip(s_row.chunks_exact(4)) {
            let sp = if swap_rb {
                [s[2], s[1], s[0], s[3]]
            } else {
                [s[0], s[1], s[2], s[3]]
            };
            let out = over([d[0], d[1], d[2], d[3]], sp);
            d.copy_from_slice(&out);
        }
    }
    Ok(())
}

/// Blend a premultiplied RGBA8 overlay into an 8-bit 4:2:0 YUV destination (BT.601).
///
/// The chroma planes are blended at half resolution against the overlay's averaged alpha, which
/// matches what the convert-chain path produces on GPU devices.
pub fn blend_yuv420_region(
    dst: &mut PlaneBuf,
    src: &[u8],
    sw: u32,
    sh: u32,
    placement: Placement,
) -> OverlayResult<()> {
    if dst.format != PixelFormat::Nv12 && dst.format != PixelFormat::I420 {
        return Err(OverlayError::frame(
            "yuv software blend destination must be NV12/I420",
        ));
    }
    if src.len() != (sw as usize) * (sh as usize) * 4 {
        return Err(OverlayError::frame("overlay byte length mismatch"));
    }

    let Some((sx, sy, dx, dy, w, h)) = clip_region(placement, sw, sh, dst.width, dst.height) else {
        return Ok(());
    };

    // Luma.
    let y_stride = dst.planes[0].stride;
    for row in 0..h as usize {
        let s_off = ((sy as usize + row) * sw as usize + sx as usize) * 4;
        let d_off = (dy as usize + row) * y_stride + dx as usize;
        for col in 0..w as usize {
            let s = &src[s_off + col * 4..s_off + col * 4 + 4];
            let a = u16::from(s[3]);
            if a == 0 {
                continue;
            }
            let sy8 = rgb_to_y(s[0], s[1], s[2]);
            let d = &mut dst.planes[0].data[d_off + col];
            *d = blend_channel(*d, sy8, a);
        }
    }

    // Chroma at half resolution.
    let nv12 = dst.format == PixelFormat::Nv12;
    for row in (0..h as usize).step_by(2) {
        for col in (0..w as usize).step_by(2) {
            let s_off = ((sy as usize + row) * sw as usize + sx as usize + col) * 4;
            let s = &src[s_off..s_off + 4];
            let a = u16::from(s[3]);
            if a == 0 {
                continue;
            }
            let (u8v, v8v) = rgb_to_uv(s[0], s[1], s[2], s[3]);
            let cx = (dx as usize + col) / 2;
            let cy = (dy as usize + row) / 2;
            if nv12 {
                let stride = dst.planes[1].stride;
                let off = cy * stride + cx * 2;
                let pl = &mut dst.planes[1].data;
                pl[off] = blend_channel(pl[off], u8v, a);
                pl[off + 1] = blend_channel(pl[off + 1], v8v, a);
            } else {
                let su = dst.planes[1].stride;
                let sv = dst.planes[2].stride;
                let u = &mut dst.planes[1].data[cy * su + cx];
                *u = blend_channel(*u, u8v, a);
                let v = &mut dst.planes[2].data[cy * sv + cx];
                *v = blend_channel(*v, v8v, a);
            }
        }
    }
    Ok(())
}

fn blend_channel(dst: u8, src: u8, alpha: u16) -> u8 {
    let inv = 255 - alpha;
    (((u32::from(src) * u32::from(alpha) + u32::from(dst) * u32::from(inv)) + 127) / 255) as u8
}

fn rgb_to_y(r: u8, g: u8, b: u8) -> u8 {
    let y = 66 * i32::from(r) + 129 * i32::from(g) + 25 * i32::from(b);
    (((y + 128) >> 8) + 16).clamp(0, 255) as u8
}

fn rgb_to_uv(r: u8, g: u8, b: u8, a: u8) -> (u8, u8) {
    // Un-premultiply before the matrix; premultiplied chroma skews toward green.
    let (r, g, b) = if a == 0 || a == 255 {
        (i32::from(r), i32::from(g), i32::from(b))
    } else {
        let a = i32::from(a);
        (
            (i32::from(r) * 255 + a / 2) / a,
            (i32::from(g) * 255 + a / 2) / a,
            (i32::from(b) * 255 + a / 2) / a,
        )
    };
    let u = -38 * r - 74 * g + 112 * b;
    let v = 112 * r - 94 * g - 18 * b;
    (
        (((u + 128) >> 8) + 128).clamp(0, 255) as u8,
        (((v + 128) >> 8) + 128).clamp(0, 255) as u8,
    )
}

/// Widen a premultiplied RGBA8 overlay to RGBA16 while blending into an RGBA16 destination.
pub fn blend_rgba16_region(
    dst: &mut PlaneBuf,
    src: &[u8],
    sw: u32,
    sh: u32,
    placement: Placement,
) -> OverlayResult<()> {
    if dst.format != PixelFormat::Rgba16 {
        return Err(OverlayError::frame(
            "wide software blend destination must be RGBA16",
        ));
    }
    if src.len() != (sw as usize) * (sh as usize) * 4 {
        return Err(OverlayError::frame("overlay byte length mismatch"));
    }

    let Some((sx, sy, dx, dy, w, h)) = clip_region(placement, sw, sh, dst.width, dst.height) else {
        return Ok(());
    };

    let stride = dst.planes[0].stride;
    for row in 0..h as usize {
        let s_off = ((sy as usize + row) * sw as usize + sx as usize) * 4;
        let d_off = (dy as usize + row) * stride + dx as usize * 8;
        for col in 0..w as usize {
            let s = &src[s_off + col * 4..s_off + col * 4 + 4];
            let a16 = widen(s[3]);
            if a16 == 0 {
                continue;
            }
            let inv = 65535u32 - u32::from(a16);
            let d = &mut dst.planes[0].data[d_off + col * 8..d_off + col * 8 + 8];
            for ch in 0..4 {
                let dv = u32::from(u16::from_le_bytes([d[ch * 2], d[ch * 2 + 1]]));
                let sv = u32::from(widen(s[ch]));
                let out = (sv + ((dv * inv + 32767) / 65535)).min(65535) as u16;
                d[ch * 2..ch * 2 + 2].copy_from_slice(&out.to_le_bytes());
            }
        }
    }
    Ok(())
}

fn widen(v: u8) -> u16 {
    u16::from(v) * 257
}

#[cfg(test)]
#[path = "../../tests/unit/render/composite.rs"]
mod tests;
