use std::sync::Arc;

use tracing::{debug, warn};

use crate::foundation::core::{MemoryDomain, OutputConfig, PixelFormat, Placement};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::{VideoFrame, copy_planes};
use crate::layout::text::{Layout, LayoutKey};
use crate::overlay::alloc::{AllocationQuery, PoolProposal};
use crate::render::backend::{BackendStats, RenderBackend, RenderedInfo};
use crate::render::convert::{Converter, CpuConverter};
use crate::render::pool::{CpuBufferPool, PooledBuf};

/// Rasterize `layout` into a premultiplied RGBA8 pixmap.
///
/// `slot` holds the rasterizer context across calls; it is rebuilt only when the layout
/// dimensions change, which is rare frame to frame.
pub(crate) fn raster_layout(
    slot: &mut Option<vello_cpu::RenderContext>,
    layout: &Layout,
) -> OverlayResult<vello_cpu::Pixmap> {
    let width: u16 = layout
        .width()
        .try_into()
        .map_err(|_| OverlayError::resource("layout width exceeds u16"))?;
    let height: u16 = layout
        .height()
        .try_into()
        .map_err(|_| OverlayError::resource("layout height exceeds u16"))?;

    let font = layout.font_bytes().map(|bytes| {
        vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes.as_ref().clone()), 0)
    });

    let fits = matches!(&slot, Some(ctx) if ctx.width() == width && ctx.height() == height);
    if !fits {
        *slot = None;
    }
    let ctx = slot.get_or_insert_with(|| vello_cpu::RenderContext::new(width, height));
    ctx.reset();
    ctx.set_transform(vello_cpu::kurbo::Affine::IDENTITY);
    if let Some(font) = &font {
        for line in layout.shaped().lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                ctx.glyph_run(font)
                    .font_size(run.run().font_size())
                    .fill_glyphs(glyphs);
            }
        }
    }
    ctx.flush();

    let mut pixmap = vello_cpu::Pixmap::new(width, height);
    ctx.render_to_pixmap(&mut pixmap);
    Ok(pixmap)
}

struct CachedRender {
    key: LayoutKey,
    width: u32,
    height: u32,
    pooled: PooledBuf,
}

/// CPU-bitmap render backend.
///
/// Rasterizes layouts with `vello_cpu` into pooled premultiplied RGBA8 buffers and composites
/// in software. This backend services every negotiated format, making it the selector's safe
/// fallback, and is the only backend attach-only mode runs on.
pub struct BitmapBackend {
    ctx: Option<vello_cpu::RenderContext>,
    pool: CpuBufferPool,
    cached: Option<CachedRender>,
    attach_cache: Option<(LayoutKey, Arc<Vec<u8>>)>,
    converter: Option<CpuConverter>,
    converter_format: Option<PixelFormat>,
    stats: BackendStats,
}

impl BitmapBackend {
    /// Build a bitmap backend for the negotiated output.
    pub fn new(output: &OutputConfig) -> OverlayResult<Self> {
        output.validate()?;
        Ok(Self {
            ctx: None,
            pool: CpuBufferPool::new(2),
            cached: None,
            attach_cache: None,
            converter: None,
            converter_format: None,
            stats: BackendStats::default(),
        })
    }

    fn rasterize(&mut self, layout: &Layout) -> OverlayResult<PooledBuf> {
        let pixmap = raster_layout(&mut self.ctx, layout)?;

        self.pool
            .configure(PixelFormat::Rgba8, layout.width(), layout.height())?;
        let mut pooled = self.pool.acquire()?;
        let src = pixmap.data_as_u8_slice();
        let stride = pooled.buf.planes[0].stride;
        let row_bytes = layout.width() as usize * 4;
        for row in 0..layout.height() as usize {
            let d = row * stride;
            let s = row * row_bytes;
            pooled.buf.planes[0].data[d..d + row_bytes].copy_from_slice(&src[s..s + row_bytes]);
        }
        Ok(pooled)
    }

    fn cached_for(&self, key: LayoutKey) -> OverlayResult<&CachedRender> {
        match &self.cached {
            Some(c) if c.key == key => Ok(c),
            _ => Err(OverlayError::frame("no cached rendering for layout")),
        }
    }
}

impl RenderBackend for BitmapBackend {
    fn draw_layout(&mut self, layout: &Layout) -> OverlayResult<RenderedInfo> {
        if let Some(c) = &self.cached
            && c.key == layout.key()
        {
            self.stats.cache_hits += 1;
            return Ok(RenderedInfo {
                key: c.key,
                width: c.width,
                height: c.height,
            });
        }

        let pooled = self.rasterize(layout)?;
        self.stats.rasterizations += 1;
        if let Some(old) = self.cached.take() {
            self.pool.release(old.pooled);
        }
        self.attach_cache = None;
        self.cached = Some(CachedRender {
            key: layout.key(),
            width: layout.width(),
            height: layout.height(),
            pooled,
        });
        Ok(RenderedInfo {
            key: layout.key(),
            width: layout.width(),
            height: layout.height(),
        })
    }

    fn blend(&mut self, key: LayoutKey, placement: Placement, frame: &mut VideoFrame) -> bool {
        if frame.domain != MemoryDomain::System {
            warn!("bitmap backend handed a non-system frame");
            return false;
        }
        if self.converter_format != Some(frame.format) {
            match CpuConverter::new(frame.format) {
                Ok(c) => {
                    self.converter = Some(c);
                    self.converter_format = Some(frame.format);
                }
                Err(err) => {
                    warn!(%err, "converter creation failed");
                    return false;
                }
            }
        }

        // Split borrows: converter and cache live in the same struct as the pool.
        let Some(converter) = self.converter.as_mut() else {
            return false;
        };
        let Some(cached) = self.cached.as_ref().filter(|c| c.key == key) else {
            warn!("blend requested for a layout that was never drawn");
            return false;
        };
        let (sw, sh) = (cached.width, cached.height);
        let src = &cached.pooled.buf.planes[0].data;

        let dst = match frame.cpu_planes_mut() {
            Ok(planes) => planes,
            Err(err) => {
                warn!(%err, "bitmap blend destination has no CPU planes");
                return false;
            }
        };
        match converter.run(src, sw, sh, dst, placement, true) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "software blend failed");
                false
            }
        }
    }

    fn can_blend_in_place(&self, frame: &VideoFrame) -> bool {
        frame.domain == MemoryDomain::System
            && frame.device.is_none()
            && frame.flags.render_target
            && !frame.flags.decoder_only
    }

    fn update_device(&mut self, frame: &VideoFrame) -> bool {
        // The bitmap backend has no device; a device-tagged frame means the stream moved to a
        // GPU domain and the orchestrator must rebuild against the new caps.
        if frame.device.is_some() {
            debug!("bitmap backend saw a device-tagged frame, clearing");
            if let Some(old) = self.cached.take() {
                self.pool.release(old.pooled);
            }
            self.attach_cache = None;
            self.pool.invalidate();
            return true;
        }
        false
    }

    fn upload(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> bool {
        if src.domain != MemoryDomain::System || dst.domain != MemoryDomain::System {
            warn!("bitmap upload requires system-memory frames");
            return false;
        }
        match copy_planes(src, dst) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "plane copy failed");
                false
            }
        }
    }

    fn handle_allocation_query(&mut self, query: &mut AllocationQuery) -> bool {
        let min = query.min_buffers.max(1);
        query.propose(PoolProposal {
            domain: MemoryDomain::System,
            min_buffers: min,
            max_buffers: query.max_buffers,
            need_render_target: query.need_render_target,
        });
        true
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }

    fn attach_payload(&mut self, key: LayoutKey) -> OverlayResult<(u32, u32, Arc<Vec<u8>>)> {
        if let Some((cached_key, bytes)) = &self.attach_cache
            && *cached_key == key
        {
            let cached = self.cached_for(key)?;
            return Ok((cached.width, cached.height, bytes.clone()));
        }

        let cached = self.cached_for(key)?;
        let (w, h) = (cached.width, cached.height);
        let stride = cached.pooled.buf.planes[0].stride;
        let row_bytes = w as usize * 4;
        let mut out = Vec::with_capacity(row_bytes * h as usize);
        for row in 0..h as usize {
            let off = row * stride;
            out.extend_from_slice(&cached.pooled.buf.planes[0].data[off..off + row_bytes]);
        }
        let bytes = Arc::new(out);
        self.attach_cache = Some((key, bytes.clone()));
        Ok((w, h, bytes))
    }
}

#[cfg(test)]
#[path = "../../tests/unit/render/bitmap.rs"]
mod tests;
