use std::sync::Arc;

use crate::foundation::error::{OverlayError, OverlayResult};

/// RGBA8 brush color carried through Parley glyph runs.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TextBrush {
    /// Red channel.
    pub r: u8,
    /// Green channel.
    pub g: u8,
    /// Blue channel.
    pub b: u8,
    /// Alpha channel.
    pub a: u8,
}

impl TextBrush {
    /// Opaque white, the conventional subtitle fill.
    pub fn white() -> Self {
        Self {
            r: 255,
            g: 255,
            b: 255,
            a: 255,
        }
    }
}

/// Content identity of a [`Layout`]: a stable hash of (text, box width, box height).
///
/// Two layouts with the same key render identically; backends key their rendered-layout cache
/// on this value.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct LayoutKey(pub u64);

impl LayoutKey {
    fn derive(text: &str, width: u32, height: u32) -> Self {
        let mut bytes = Vec::with_capacity(text.len() + 8);
        bytes.extend_from_slice(text.as_bytes());
        bytes.extend_from_slice(&width.to_le_bytes());
        bytes.extend_from_slice(&height.to_le_bytes());
        Self(xxhash_rust::xxh3::xxh3_64(&bytes))
    }
}

/// An externally produced, shaped text layout.
///
/// The overlay engine treats this as opaque beyond its identity and box dimensions: it is
/// rasterized by whichever backend is active and cached by [`LayoutKey`]. Replacing the layout on
/// the engine invalidates every cached rendering derived from it.
#[derive(Clone)]
pub struct Layout {
    text: String,
    width: u32,
    height: u32,
    key: LayoutKey,
    shaped: Arc<parley::Layout<TextBrush>>,
    font_bytes: Option<Arc<Vec<u8>>>,
}

impl std::fmt::Debug for Layout {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Layout")
            .field("text", &self.text)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("key", &self.key)
            .finish()
    }
}

impl Layout {
    /// Box width in pixels.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Box height in pixels.
    pub fn height(&self) -> u32 {
        self.height
    }

    /// Content identity.
    pub fn key(&self) -> LayoutKey {
        self.key
    }

    /// The text this layout was shaped from.
    pub fn text(&self) -> &str {
        &self.text
    }

    pub(crate) fn shaped(&self) -> &parley::Layout<TextBrush> {
        &self.shaped
    }

    pub(crate) fn font_bytes(&self) -> Option<&Arc<Vec<u8>>> {
        self.font_bytes.as_ref()
    }

    /// A layout with no glyph content.
    ///
    /// Rasterizes to a fully transparent buffer. Useful as an initial placeholder and for
    /// exercising the engine without a shaping service.
    pub fn empty(text: impl Into<String>, width: u32, height: u32) -> Self {
        let text = text.into();
        let key = LayoutKey::derive(&text, width, height);
        Self {
            text,
            width,
            height,
            key,
            shaped: Arc::new(parley::Layout::default()),
            font_bytes: None,
        }
    }
}

/// Stand-in for the external shaping service: shape plain text into a [`Layout`].
///
/// The engine itself never calls this; callers that do not have a shaping service upstream can
/// use it to produce layouts from raw font bytes.
pub struct LayoutShaper {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
}

impl Default for LayoutShaper {
    fn default() -> Self {
        Self::new()
    }
}

impl LayoutShaper {
    /// Construct a shaper with fresh Parley contexts.
    pub fn new() -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
        }
    }

    /// Shape `text` into a box of `width` x `height` pixels using the provided font bytes.
    pub fn shape(
        &mut self,
        text: &str,
        width: u32,
        height: u32,
        font_bytes: &[u8],
        size_px: f32,
        brush: TextBrush,
    ) -> OverlayResult<Layout> {
        if !size_px.is_finite() || size_px <= 0.0 {
            return Err(OverlayError::negotiation(
                "text size_px must be finite and > 0",
            ));
        }
        if width == 0 || height == 0 {
            return Err(OverlayError::negotiation(
                "layout box dimensions must be non-zero",
            ));
        }

        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(font_bytes.to_vec()), None);
        let family_id = families.first().map(|(id, _)| *id).ok_or_else(|| {
            OverlayError::negotiation("no font families registered from font bytes")
        })?;
        let family_name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| OverlayError::negotiation("registered font family has no name"))?
            .to_string();

        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family_name)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));

        let mut shaped: parley::Layout<TextBrush> = builder.build(text);
        shaped.break_all_lines(Some(width as f32));
        shaped.align(
            Some(width as f32),
            parley::Alignment::Start,
            parley::AlignmentOptions::default(),
        );

        Ok(Layout {
            text: text.to_string(),
            width,
            height,
            key: LayoutKey::derive(text, width, height),
            shaped: Arc::new(shaped),
            font_bytes: Some(Arc::new(font_bytes.to_vec())),
        })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/layout/text.rs"]
mod tests;
