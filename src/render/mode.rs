use crate::foundation::core::{DeviceCaps, MemoryDomain, PixelFormat};

/// The compositing strategy selected for a negotiated output configuration.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum BlendMode {
    /// No viable strategy; the pipeline must pass frames through unmodified.
    NotSupported,
    /// No pixel compositing: the rendered layout is attached as metadata for a downstream
    /// compositor.
    AttachOnly,
    /// CPU-side software compositing.
    SoftwareBlend,
    /// The frame format accepts direct alpha-blended rendering.
    DirectBlend,
    /// An 8-bit pre-convert/blend/post-convert chain is required.
    ConvertBlend,
    /// The convert chain at higher bit depth.
    ConvertBlendWide,
}

impl BlendMode {
    /// True for every mode that composites pixels on a GPU device.
    pub fn is_gpu(self) -> bool {
        matches!(
            self,
            Self::DirectBlend | Self::ConvertBlend | Self::ConvertBlendWide
        )
    }

    /// True when the mode performs any pixel compositing at all.
    pub fn blends_pixels(self) -> bool {
        !matches!(self, Self::NotSupported | Self::AttachOnly)
    }
}

/// Decide the compositing strategy for an output configuration.
///
/// Pure function of its four inputs; the orchestrator re-derives the mode whenever any of them
/// changes. The decision table:
///
/// - attach requested → [`BlendMode::AttachOnly`], unconditionally
/// - non-GPU domain → [`BlendMode::SoftwareBlend`]
/// - alpha-capable 8/16-bit format with direct render-target support → [`BlendMode::DirectBlend`]
/// - 8-bit format without direct alpha compositing → [`BlendMode::ConvertBlend`]
/// - above 8 bits → [`BlendMode::ConvertBlendWide`] (requires wide render targets)
/// - anything unrecognized → [`BlendMode::SoftwareBlend`] as the safe fallback
pub fn select(
    output_format: PixelFormat,
    domain: MemoryDomain,
    attach_requested: bool,
    caps: DeviceCaps,
) -> BlendMode {
    if attach_requested {
        return BlendMode::AttachOnly;
    }
    if !domain.is_gpu() {
        return BlendMode::SoftwareBlend;
    }

    match output_format {
        PixelFormat::Rgba8 | PixelFormat::Bgra8 | PixelFormat::Rgba16 => {
            if caps.direct_alpha_blend && (output_format.bit_depth() == 8 || caps.wide_formats) {
                BlendMode::DirectBlend
            } else if output_format.bit_depth() > 8 {
                if caps.wide_formats {
                    BlendMode::ConvertBlendWide
                } else {
                    BlendMode::SoftwareBlend
                }
            } else {
                BlendMode::ConvertBlend
            }
        }
        PixelFormat::Nv12 | PixelFormat::I420 => BlendMode::ConvertBlend,
        PixelFormat::P010 => {
            if caps.wide_formats {
                BlendMode::ConvertBlendWide
            } else {
                BlendMode::SoftwareBlend
            }
        }
        PixelFormat::Unknown => BlendMode::SoftwareBlend,
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/mode.rs"]
mod tests;
