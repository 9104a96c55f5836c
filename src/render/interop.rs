//! Dual-API interop backend.
//!
//! The overlay is rasterized by the CPU raster API into a mappable staging buffer owned by the
//! GPU API, then copied device-side into an overlay texture and composited exactly like the
//! single-API path. The staging buffer crosses the API boundary through
//! [`crate::render::bridge::Bridged`], whose borrow rules make acquire-before-draw and
//! release-before-copy structurally unskippable.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::foundation::core::{OutputConfig, PixelFormat, Placement};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::{FrameData, VideoFrame};
use crate::layout::text::{Layout, LayoutKey};
use crate::overlay::alloc::{AllocationQuery, PoolProposal};
use crate::render::backend::{BackendStats, RenderBackend, RenderedInfo};
use crate::render::bitmap::raster_layout;
use crate::render::bridge::{BridgeStats, Bridged};
use crate::render::gpu::{GpuCompositor, GpuContext, GpuFenceClock, GpuSurface, TexturePool};
use crate::render::mode::BlendMode;
use crate::render::sync::InFlightRing;

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}

/// The shared resource: a mappable GPU buffer the raster API writes pixel rows into.
pub(crate) struct StagingBuffer {
    buffer: vello::wgpu::Buffer,
    width: u32,
    height: u32,
    bytes_per_row: u32,
}

impl StagingBuffer {
    fn new(ctx: &GpuContext, width: u32, height: u32) -> OverlayResult<Self> {
        let unpadded = width
            .checked_mul(4)
            .ok_or_else(|| OverlayError::resource("staging width overflow"))?;
        let bytes_per_row = align_to(unpadded, vello::wgpu::COPY_BYTES_PER_ROW_ALIGNMENT);
        let size = bytes_per_row as u64 * height as u64;
        let buffer = ctx.device.create_buffer(&vello::wgpu::BufferDescriptor {
            label: Some("textover_interop_staging"),
            size,
            usage: vello::wgpu::BufferUsages::MAP_WRITE | vello::wgpu::BufferUsages::COPY_SRC,
            mapped_at_creation: false,
        });
        Ok(Self {
            buffer,
            width,
            height,
            bytes_per_row,
        })
    }

    /// Write tightly packed RGBA8 rows into the buffer, padding each row to the copy alignment.
    ///
    /// This is the foreign-API draw; callers reach it only through an acquisition.
    fn write_rgba(&mut self, ctx: &GpuContext, pixels: &[u8]) -> OverlayResult<()> {
        let row_bytes = self.width as usize * 4;
        if pixels.len() < row_bytes * self.height as usize {
            return Err(OverlayError::frame("staging write source too small"));
        }

        let slice = self.buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(vello::wgpu::MapMode::Write, move |res| {
            let _ = tx.send(res);
        });
        ctx.device
            .poll(vello::wgpu::PollType::wait_indefinitely())
            .map_err(|e| OverlayError::device_lost(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| OverlayError::resource("staging map channel closed"))?
            .map_err(|e| OverlayError::resource(format!("staging map failed: {e:?}")))?;

        let mut mapped = slice.get_mapped_range_mut();
        let padded = self.bytes_per_row as usize;
        for row in 0..self.height as usize {
            let d = row * padded;
            let s = row * row_bytes;
            mapped[d..d + row_bytes].copy_from_slice(&pixels[s..s + row_bytes]);
        }
        drop(mapped);
        self.buffer.unmap();
        Ok(())
    }
}

struct CachedInterop {
    key: LayoutKey,
    surface: GpuSurface,
}

/// Render backend for the dual-API interop execution domain.
pub struct InteropBackend {
    output: OutputConfig,
    mode: BlendMode,
    async_depth: usize,
    ctx: Option<Arc<GpuContext>>,
    raster: Option<vello_cpu::RenderContext>,
    staging: Option<Bridged<StagingBuffer>>,
    pool: Option<TexturePool>,
    compositor: Option<GpuCompositor>,
    ring: InFlightRing,
    cached: Option<CachedInterop>,
    stats: BackendStats,
}

impl InteropBackend {
    /// Build an interop backend for the negotiated output and mode.
    pub fn new(output: &OutputConfig, mode: BlendMode) -> OverlayResult<Self> {
        Self::with_async_depth(output, mode, crate::render::sync::DEFAULT_ASYNC_DEPTH)
    }

    /// Build with an explicit in-flight submission bound.
    pub fn with_async_depth(
        output: &OutputConfig,
        mode: BlendMode,
        async_depth: usize,
    ) -> OverlayResult<Self> {
        output.validate()?;
        if !mode.is_gpu() {
            return Err(OverlayError::negotiation(
                "interop backend requires a gpu blend mode",
            ));
        }
        Ok(Self {
            output: *output,
            mode,
            async_depth,
            ctx: None,
            raster: None,
            staging: None,
            pool: None,
            compositor: None,
            ring: InFlightRing::new(async_depth),
            cached: None,
            stats: BackendStats::default(),
        })
    }

    /// Bridge protocol counters for the staging resource.
    pub fn bridge_stats(&self) -> BridgeStats {
        self.staging
            .as_ref()
            .map(Bridged::stats)
            .unwrap_or_default()
    }

    /// Texture pool counters, if a device is bound.
    pub fn pool_stats(&self) -> Option<crate::render::pool::PoolStats> {
        self.pool.as_ref().map(TexturePool::stats)
    }

    fn bind(&mut self, ctx: Arc<GpuContext>) {
        self.pool = Some(TexturePool::new(ctx.clone(), 2));
        self.compositor = Some(GpuCompositor::new(ctx.clone()));
        self.staging = None;
        self.cached = None;
        self.ring = InFlightRing::new(self.async_depth);
        self.ctx = Some(ctx);
    }

    fn clear(&mut self) {
        if let Some(ctx) = &self.ctx {
            let clock = GpuFenceClock::new(ctx.clone());
            if let Some(cached) = self.cached.take() {
                let mut surface = cached.surface;
                let _ = surface.fence.settle(&clock);
            }
            let _ = self.ring.drain(&clock);
        }
        self.pool = None;
        self.compositor = None;
        self.staging = None;
        self.ctx = None;
    }

    /// Rasterize with the foreign API into the bridged staging buffer, then copy device-side
    /// into a pooled overlay texture.
    fn rasterize(&mut self, layout: &Layout) -> OverlayResult<GpuSurface> {
        let ctx = self
            .ctx
            .clone()
            .ok_or_else(|| OverlayError::resource("interop draw before a frame bound the device"))?;

        let pixmap = raster_layout(&mut self.raster, layout)?;

        let fits = matches!(
            self.staging.as_ref().map(Bridged::native),
            Some(s) if s.width == layout.width() && s.height == layout.height()
        );
        if !fits {
            let _guard = ctx
                .lock
                .lock()
                .map_err(|_| OverlayError::resource("device lock poisoned"))?;
            self.staging = Some(Bridged::wrap(StagingBuffer::new(
                &ctx,
                layout.width(),
                layout.height(),
            )?));
        }
        let staging = self
            .staging
            .as_mut()
            .ok_or_else(|| OverlayError::resource("interop staging missing"))?;

        {
            // Foreign-API write: only valid between acquire and release, under the device lock.
            let guard = ctx
                .lock
                .lock()
                .map_err(|_| OverlayError::resource("device lock poisoned"))?;
            let mut acquired = staging.acquire(&guard);
            acquired
                .resource_mut()
                .write_rgba(&ctx, pixmap.data_as_u8_slice())?;
        }

        let pool = self
            .pool
            .as_mut()
            .ok_or_else(|| OverlayError::resource("interop backend missing pool"))?;
        pool.configure(PixelFormat::Rgba8, layout.width(), layout.height())?;
        let mut surface = pool.acquire()?;

        // Native-side copy out; reachable only now that the acquisition is released.
        let clock = GpuFenceClock::new(ctx.clone());
        self.ring.admit(&clock)?;
        let native = staging.native();
        let mut encoder = ctx
            .device
            .create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
                label: Some("textover_interop_copy"),
            });
        encoder.copy_buffer_to_texture(
            vello::wgpu::TexelCopyBufferInfo {
                buffer: &native.buffer,
                layout: vello::wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(native.bytes_per_row),
                    rows_per_image: Some(native.height),
                },
            },
            surface.texture.as_image_copy(),
            vello::wgpu::Extent3d {
                width: native.width,
                height: native.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(Some(encoder.finish()));
        let token = self.ring.issue();
        ctx.signal(token);
        surface.fence.tag(token);
        Ok(surface)
    }

    fn blend_inner(
        &mut self,
        key: LayoutKey,
        placement: Placement,
        frame: &mut VideoFrame,
    ) -> OverlayResult<()> {
        let ctx = self
            .ctx
            .clone()
            .ok_or_else(|| OverlayError::resource("interop backend not bound to a device"))?;
        let (overlay, sw, sh) = match &self.cached {
            Some(c) if c.key == key => {
                (c.surface.texture.clone(), c.surface.width, c.surface.height)
            }
            _ => return Err(OverlayError::frame("no cached rendering for layout")),
        };
        let format = frame.format;
        let FrameData::Texture(target) = &mut frame.data else {
            return Err(OverlayError::frame("interop blend target is not a texture"));
        };
        let compositor = self
            .compositor
            .as_mut()
            .ok_or_else(|| OverlayError::resource("interop backend missing compositor"))?;
        compositor.blend(
            &ctx,
            &mut self.ring,
            self.mode,
            &overlay,
            (sw, sh),
            placement,
            format,
            target,
        )
    }
}

impl RenderBackend for InteropBackend {
    fn draw_layout(&mut self, layout: &Layout) -> OverlayResult<RenderedInfo> {
        if let Some(c) = &self.cached
            && c.key == layout.key()
        {
            self.stats.cache_hits += 1;
            return Ok(RenderedInfo {
                key: c.key,
                width: c.surface.width,
                height: c.surface.height,
            });
        }

        let surface = self.rasterize(layout)?;
        self.stats.rasterizations += 1;
        if let Some(old) = self.cached.take()
            && let (Some(ctx), Some(pool)) = (&self.ctx, self.pool.as_mut())
        {
            let clock = GpuFenceClock::new(ctx.clone());
            pool.release(old.surface, &clock);
        }
        let info = RenderedInfo {
            key: layout.key(),
            width: surface.width,
            height: surface.height,
        };
        self.cached = Some(CachedInterop {
            key: layout.key(),
            surface,
        });
        Ok(info)
    }

    fn blend(&mut self, key: LayoutKey, placement: Placement, frame: &mut VideoFrame) -> bool {
        match self.blend_inner(key, placement, frame) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "interop blend failed");
                false
            }
        }
    }

    fn can_blend_in_place(&self, frame: &VideoFrame) -> bool {
        let FrameData::Texture(surface) = &frame.data else {
            return false;
        };
        let Some(ctx) = &self.ctx else {
            return false;
        };
        frame.domain == self.output.domain
            && surface.ctx.id == ctx.id
            && frame.flags.render_target
            && !frame.flags.decoder_only
    }

    fn update_device(&mut self, frame: &VideoFrame) -> bool {
        let FrameData::Texture(surface) = &frame.data else {
            return false;
        };
        match &self.ctx {
            None => {
                self.bind(surface.ctx.clone());
                false
            }
            Some(ctx) if ctx.id == surface.ctx.id => false,
            Some(ctx) => {
                debug!(old = ?ctx.id, new = ?surface.ctx.id, "interop device changed, clearing");
                self.clear();
                true
            }
        }
    }

    fn bind_device(&mut self, frame: &VideoFrame) -> OverlayResult<()> {
        if let FrameData::Texture(surface) = &frame.data {
            self.bind(surface.ctx.clone());
        }
        Ok(())
    }

    fn upload(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> bool {
        // Decoder-only frames land here: a device-native copy into a render-target texture.
        let (FrameData::Texture(s), FrameData::Texture(d)) = (&src.data, &mut dst.data) else {
            warn!("interop upload requires texture frames");
            return false;
        };
        if s.ctx.id != d.ctx.id {
            warn!("interop upload across devices");
            return false;
        }
        let ctx = s.ctx.clone();
        let clock = GpuFenceClock::new(ctx.clone());
        if self.ring.admit(&clock).is_err() {
            return false;
        }
        let mut encoder = ctx
            .device
            .create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
                label: Some("textover_interop_upload"),
            });
        encoder.copy_texture_to_texture(
            s.texture.as_image_copy(),
            d.texture.as_image_copy(),
            vello::wgpu::Extent3d {
                width: s.width.min(d.width),
                height: s.height.min(d.height),
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(Some(encoder.finish()));
        let token = self.ring.issue();
        ctx.signal(token);
        d.fence.tag(token);
        true
    }

    fn handle_allocation_query(&mut self, query: &mut AllocationQuery) -> bool {
        let min = query.min_buffers.clamp(2, self.async_depth as u32);
        let max = if query.max_buffers == 0 {
            self.async_depth as u32
        } else {
            query.max_buffers.min(self.async_depth as u32)
        };
        query.propose(PoolProposal {
            domain: self.output.domain,
            min_buffers: min,
            max_buffers: max,
            need_render_target: true,
        });
        true
    }

    fn stats(&self) -> BackendStats {
        self.stats
    }
}
