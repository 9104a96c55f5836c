use crate::foundation::error::{OverlayError, OverlayResult};

/// Pixel formats the overlay negotiates against.
///
/// The set is intentionally small: it is the union of formats the surrounding element actually
/// offers, not a general pixel-format model.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub enum PixelFormat {
    /// 8-bit RGBA, premultiplied alpha when produced by this crate.
    Rgba8,
    /// 8-bit BGRA.
    Bgra8,
    /// 16-bit RGBA.
    Rgba16,
    /// 8-bit 4:2:0 planar YUV (Y plane + interleaved UV plane).
    Nv12,
    /// 8-bit 4:2:0 planar YUV (three planes).
    I420,
    /// 10-bit 4:2:0 planar YUV in 16-bit containers.
    P010,
    /// Anything the selector should treat as unrecognized.
    Unknown,
}

impl PixelFormat {
    /// Bits per channel.
    pub fn bit_depth(self) -> u32 {
        match self {
            Self::Rgba8 | Self::Bgra8 | Self::Nv12 | Self::I420 => 8,
            Self::P010 => 10,
            Self::Rgba16 => 16,
            Self::Unknown => 0,
        }
    }

    /// Whether the format carries an alpha channel.
    pub fn has_alpha(self) -> bool {
        matches!(self, Self::Rgba8 | Self::Bgra8 | Self::Rgba16)
    }

    /// Number of planes a frame of this format carries.
    pub fn plane_count(self) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 | Self::Rgba16 | Self::Unknown => 1,
            Self::Nv12 | Self::P010 => 2,
            Self::I420 => 3,
        }
    }

    /// Bytes per pixel in the given plane.
    pub fn bytes_per_pixel(self, plane: usize) -> usize {
        match self {
            Self::Rgba8 | Self::Bgra8 => 4,
            Self::Rgba16 => 8,
            Self::Nv12 => {
                if plane == 0 {
                    1
                } else {
                    2
                }
            }
            Self::P010 => {
                if plane == 0 {
                    2
                } else {
                    4
                }
            }
            Self::I420 => 1,
            Self::Unknown => 0,
        }
    }

    /// Plane dimensions for a frame of `width` x `height`.
    pub fn plane_size(self, plane: usize, width: u32, height: u32) -> (u32, u32) {
        match self {
            Self::Rgba8 | Self::Bgra8 | Self::Rgba16 | Self::Unknown => (width, height),
            Self::Nv12 | Self::P010 => {
                if plane == 0 {
                    (width, height)
                } else {
                    (width.div_ceil(2), height.div_ceil(2))
                }
            }
            Self::I420 => {
                if plane == 0 {
                    (width, height)
                } else {
                    (width.div_ceil(2), height.div_ceil(2))
                }
            }
        }
    }
}

/// The resource space a buffer lives in.
///
/// A buffer created in one domain cannot be touched in another without an explicit bridging step;
/// backends are selected so that every per-frame operation stays inside one domain.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum MemoryDomain {
    /// Plain CPU memory.
    System,
    /// The single-API GPU resource space.
    Gpu,
    /// The dual-API bridged GPU resource space.
    GpuInterop,
}

impl MemoryDomain {
    /// True for both GPU-backed domains.
    pub fn is_gpu(self) -> bool {
        matches!(self, Self::Gpu | Self::GpuInterop)
    }
}

/// Identity of a device context.
///
/// Assigned monotonically when a device context is created; frames carry the id of the device
/// their resources belong to, and a mismatch with the active backend's id is a destructive event.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, serde::Serialize, serde::Deserialize,
)]
pub struct DeviceId(pub u64);

/// Capability flags of a frame's underlying resource.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct ResourceFlags {
    /// The resource can be sampled/read.
    pub readable: bool,
    /// The resource can be bound as a render target.
    pub render_target: bool,
    /// The resource was produced by a decoder and must not be written to.
    pub decoder_only: bool,
}

impl ResourceFlags {
    /// Flags for a pooled buffer this crate allocates itself.
    pub fn owned() -> Self {
        Self {
            readable: true,
            render_target: true,
            decoder_only: false,
        }
    }
}

/// Result of the device capability query the selector consumes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct DeviceCaps {
    /// The device supports alpha-blended rendering directly into the output format.
    pub direct_alpha_blend: bool,
    /// The device supports render targets above 8 bits per channel.
    pub wide_formats: bool,
}

/// Pixel offset of the overlay inside the output frame. May be negative; blending clips.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, serde::Serialize, serde::Deserialize)]
pub struct Placement {
    /// Horizontal offset in pixels.
    pub x: i32,
    /// Vertical offset in pixels.
    pub y: i32,
}

/// Output configuration established at caps-negotiation time.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct OutputConfig {
    /// Negotiated output pixel format.
    pub format: PixelFormat,
    /// Memory domain the output frames live in.
    pub domain: MemoryDomain,
    /// Output frame width in pixels.
    pub width: u32,
    /// Output frame height in pixels.
    pub height: u32,
    /// Downstream asked for the overlay to be attached as metadata instead of composited.
    pub attach_requested: bool,
    /// Capability query result for the output device.
    pub device_caps: DeviceCaps,
}

impl OutputConfig {
    /// Validate the negotiated dimensions.
    pub fn validate(&self) -> OverlayResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(OverlayError::negotiation(
                "output dimensions must be non-zero",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/core.rs"]
mod tests;
