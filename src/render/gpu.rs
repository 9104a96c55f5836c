//! Single-API GPU backend.
//!
//! Draws the layout with `vello` into a pooled texture, then composites with a cached
//! premultiplied-alpha pipeline: directly into render-target-capable frames, or through the
//! pre-convert/blend/post-convert chain when the negotiated mode requires it. All GPU work is
//! asynchronous behind the fence ring in [`crate::render::sync`].

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tracing::{debug, warn};

use crate::foundation::core::{
    DeviceId, MemoryDomain, OutputConfig, PixelFormat, Placement, ResourceFlags,
};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::{FrameData, VideoFrame};
use crate::layout::text::{Layout, LayoutKey};
use crate::overlay::alloc::{AllocationQuery, PoolProposal};
use crate::render::backend::{BackendStats, RenderBackend, RenderedInfo};
use crate::render::mode::BlendMode;
use crate::render::pool::PoolStats;
use crate::render::sync::{FenceClock, FenceToken, InFlightRing, WriteFence};

static NEXT_DEVICE_ID: AtomicU64 = AtomicU64::new(1);

/// A GPU device context shared between frames, pools and the backend.
///
/// The device handle is shared read-only; resource creation/teardown and interop acquire/release
/// happen under [`GpuContext::lock`].
pub struct GpuContext {
    /// The wgpu device.
    pub device: vello::wgpu::Device,
    /// The wgpu queue all submissions in this crate go through.
    pub queue: vello::wgpu::Queue,
    /// Identity tag carried by frames created against this context.
    pub id: DeviceId,
    /// Device-scoped lock for resource creation/teardown and interop acquire/release.
    pub lock: Mutex<()>,
    completed: Arc<AtomicU64>,
}

impl GpuContext {
    /// Request an adapter and device and wrap them in a fresh context.
    pub fn request() -> OverlayResult<Arc<Self>> {
        let instance = vello::wgpu::Instance::new(&vello::wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(
            &vello::wgpu::RequestAdapterOptions {
                power_preference: vello::wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .map_err(|e| match e {
            vello::wgpu::RequestAdapterError::NotFound { .. } => {
                OverlayError::resource("no gpu adapter available")
            }
            other => OverlayError::resource(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        // Wide render targets (Rgba16Unorm) need an opt-in feature when the adapter has it.
        let wide = adapter
            .features()
            .contains(vello::wgpu::Features::TEXTURE_FORMAT_16BIT_NORM);
        let (device, queue) =
            pollster::block_on(adapter.request_device(&vello::wgpu::DeviceDescriptor {
                label: None,
                required_features: if wide {
                    vello::wgpu::Features::TEXTURE_FORMAT_16BIT_NORM
                } else {
                    vello::wgpu::Features::empty()
                },
                required_limits: vello::wgpu::Limits::default(),
                experimental_features: vello::wgpu::ExperimentalFeatures::default(),
                memory_hints: vello::wgpu::MemoryHints::Performance,
                trace: vello::wgpu::Trace::Off,
            }))
            .map_err(|e| OverlayError::resource(format!("wgpu request_device failed: {e:?}")))?;

        Ok(Arc::new(Self {
            device,
            queue,
            id: DeviceId(NEXT_DEVICE_ID.fetch_add(1, Ordering::Relaxed)),
            lock: Mutex::new(()),
            completed: Arc::new(AtomicU64::new(0)),
        }))
    }

    /// Register `token` to be marked retired once all work submitted so far completes.
    pub fn signal(&self, token: FenceToken) {
        let completed = self.completed.clone();
        self.queue.on_submitted_work_done(move || {
            completed.fetch_max(token.0, Ordering::Release);
        });
    }
}

/// [`FenceClock`] over a [`GpuContext`].
pub struct GpuFenceClock {
    ctx: Arc<GpuContext>,
}

impl GpuFenceClock {
    /// Observe fences on `ctx`.
    pub fn new(ctx: Arc<GpuContext>) -> Self {
        Self { ctx }
    }
}

impl FenceClock for GpuFenceClock {
    fn completed(&self) -> u64 {
        self.ctx.completed.load(Ordering::Acquire)
    }

    fn wait(&self, token: FenceToken) -> OverlayResult<()> {
        while self.completed() < token.0 {
            self.ctx
                .device
                .poll(vello::wgpu::PollType::wait_indefinitely())
                .map_err(|e| OverlayError::device_lost(format!("wgpu poll failed: {e:?}")))?;
        }
        Ok(())
    }
}

/// A texture living in the single-API GPU resource space.
pub struct GpuSurface {
    /// Context the texture belongs to.
    pub ctx: Arc<GpuContext>,
    /// The texture itself.
    pub texture: vello::wgpu::Texture,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Fence tag of the last GPU write into the texture.
    pub fence: WriteFence,
}

impl std::fmt::Debug for GpuSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GpuSurface")
            .field("device", &self.ctx.id)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

pub(crate) fn texture_format(format: PixelFormat) -> OverlayResult<vello::wgpu::TextureFormat> {
    match format {
        PixelFormat::Rgba8 => Ok(vello::wgpu::TextureFormat::Rgba8Unorm),
        PixelFormat::Bgra8 => Ok(vello::wgpu::TextureFormat::Bgra8Unorm),
        PixelFormat::Rgba16 => Ok(vello::wgpu::TextureFormat::Rgba16Unorm),
        other => Err(OverlayError::resource(format!(
            "no gpu texture format for {other:?}"
        ))),
    }
}

/// Pooled allocator for fixed-format, fixed-size GPU textures on one device.
pub(crate) struct TexturePool {
    ctx: Arc<GpuContext>,
    config: Option<(PixelFormat, u32, u32)>,
    generation: u64,
    free: Vec<GpuSurface>,
    max_retained: usize,
    stats: PoolStats,
}

impl TexturePool {
    pub(crate) fn new(ctx: Arc<GpuContext>, max_retained: usize) -> Self {
        Self {
            ctx,
            config: None,
            generation: 0,
            free: Vec::new(),
            max_retained,
            stats: PoolStats::default(),
        }
    }

    pub(crate) fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn stats(&self) -> PoolStats {
        self.stats
    }

    pub(crate) fn configure(
        &mut self,
        format: PixelFormat,
        width: u32,
        height: u32,
    ) -> OverlayResult<()> {
        if width == 0 || height == 0 {
            return Err(OverlayError::resource("pool dimensions must be non-zero"));
        }
        texture_format(format)?;
        if self.config == Some((format, width, height)) {
            return Ok(());
        }
        debug!(?format, width, height, "texture pool reconfigure");
        self.free.clear();
        self.config = Some((format, width, height));
        self.generation += 1;
        Ok(())
    }

    pub(crate) fn acquire(&mut self) -> OverlayResult<GpuSurface> {
        let (format, width, height) = self
            .config
            .ok_or_else(|| OverlayError::resource("texture pool acquire before configure"))?;
        if let Some(surface) = self.free.pop() {
            self.stats.reuses += 1;
            return Ok(surface);
        }

        self.stats.allocs += 1;
        let wgpu_format = texture_format(format)?;
        let mut usage = vello::wgpu::TextureUsages::TEXTURE_BINDING
            | vello::wgpu::TextureUsages::RENDER_ATTACHMENT
            | vello::wgpu::TextureUsages::COPY_SRC
            | vello::wgpu::TextureUsages::COPY_DST;
        // The vello renderer writes its target from a compute pass.
        if wgpu_format == vello::wgpu::TextureFormat::Rgba8Unorm {
            usage |= vello::wgpu::TextureUsages::STORAGE_BINDING;
        }
        let _guard = self
            .ctx
            .lock
            .lock()
            .map_err(|_| OverlayError::resource("device lock poisoned"))?;
        let texture = self
            .ctx
            .device
            .create_texture(&vello::wgpu::TextureDescriptor {
                label: Some("textover_pooled"),
                size: vello::wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: vello::wgpu::TextureDimension::D2,
                format: wgpu_format,
                usage,
                view_formats: &[],
            });
        Ok(GpuSurface {
            ctx: self.ctx.clone(),
            texture,
            width,
            height,
            fence: WriteFence::default(),
        })
    }

    pub(crate) fn release(&mut self, surface: GpuSurface, clock: &dyn FenceClock) {
        if !Arc::ptr_eq(&surface.ctx, &self.ctx) || self.free.len() >= self.max_retained {
            self.stats.drops += 1;
            return;
        }
        let mut surface = surface;
        // A recycled texture may still be written by in-flight work.
        if surface.fence.settle(clock).is_err() {
            self.stats.drops += 1;
            return;
        }
        self.free.push(surface);
    }
}

const BLEND_SHADER: &str = r#"
struct VsOut {
  @builtin(position) pos: vec4<f32>,
  @location(0) uv: vec2<f32>,
};

@group(0) @binding(0) var t_src: texture_2d<f32>;
@group(0) @binding(1) var s_src: sampler;
@group(0) @binding(2) var<uniform> rect: vec4<f32>;

@vertex
fn vs(@builtin(vertex_index) vi: u32) -> VsOut {
  var corners = array<vec2<f32>, 6>(
    vec2<f32>(0.0, 0.0),
    vec2<f32>(1.0, 0.0),
    vec2<f32>(0.0, 1.0),
    vec2<f32>(1.0, 0.0),
    vec2<f32>(1.0, 1.0),
    vec2<f32>(0.0, 1.0),
  );
  let c = corners[vi];
  var o: VsOut;
  // rect = (x0, y0, x1, y1) in NDC, y already flipped.
  o.pos = vec4<f32>(mix(rect.x, rect.z, c.x), mix(rect.y, rect.w, c.y), 0.0, 1.0);
  o.uv = c;
  return o;
}

@fragment
fn fs(in: VsOut) -> @location(0) vec4<f32> {
  return textureSample(t_src, s_src, in.uv);
}
"#;

/// Cached composite/convert pipelines for one destination texture format.
pub(crate) struct BlendPipelines {
    blend: vello::wgpu::RenderPipeline,
    replace: vello::wgpu::RenderPipeline,
    bind_group_layout: vello::wgpu::BindGroupLayout,
    sampler: vello::wgpu::Sampler,
    rect: vello::wgpu::Buffer,
}

impl BlendPipelines {
    pub(crate) fn new(
        ctx: &GpuContext,
        target_format: vello::wgpu::TextureFormat,
    ) -> OverlayResult<Self> {
        let _guard = ctx
            .lock
            .lock()
            .map_err(|_| OverlayError::resource("device lock poisoned"))?;
        let device = &ctx.device;

        let sampler = device.create_sampler(&vello::wgpu::SamplerDescriptor {
            label: Some("textover_blend_sampler"),
            address_mode_u: vello::wgpu::AddressMode::ClampToEdge,
            address_mode_v: vello::wgpu::AddressMode::ClampToEdge,
            address_mode_w: vello::wgpu::AddressMode::ClampToEdge,
            mag_filter: vello::wgpu::FilterMode::Nearest,
            min_filter: vello::wgpu::FilterMode::Nearest,
            mipmap_filter: vello::wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let rect = device.create_buffer(&vello::wgpu::BufferDescriptor {
            label: Some("textover_blend_rect"),
            size: 16,
            usage: vello::wgpu::BufferUsages::UNIFORM | vello::wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout =
            device.create_bind_group_layout(&vello::wgpu::BindGroupLayoutDescriptor {
                label: Some("textover_blend_bgl"),
                entries: &[
                    vello::wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: vello::wgpu::ShaderStages::FRAGMENT,
                        ty: vello::wgpu::BindingType::Texture {
                            multisampled: false,
                            view_dimension: vello::wgpu::TextureViewDimension::D2,
                            sample_type: vello::wgpu::TextureSampleType::Float { filterable: true },
                        },
                        count: None,
                    },
                    vello::wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: vello::wgpu::ShaderStages::FRAGMENT,
                        ty: vello::wgpu::BindingType::Sampler(
                            vello::wgpu::SamplerBindingType::Filtering,
                        ),
                        count: None,
                    },
                    vello::wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: vello::wgpu::ShaderStages::VERTEX,
                        ty: vello::wgpu::BindingType::Buffer {
                            ty: vello::wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: false,
                            min_binding_size: vello::wgpu::BufferSize::new(16),
                        },
                        count: None,
                    },
                ],
            });

        let shader = device.create_shader_module(vello::wgpu::ShaderModuleDescriptor {
            label: Some("textover_blend_shader"),
            source: vello::wgpu::ShaderSource::Wgsl(BLEND_SHADER.into()),
        });

        let pipeline_layout =
            device.create_pipeline_layout(&vello::wgpu::PipelineLayoutDescriptor {
                label: Some("textover_blend_pl"),
                bind_group_layouts: &[&bind_group_layout],
                push_constant_ranges: &[],
            });

        let make = |blend: Option<vello::wgpu::BlendState>, label: &str| {
            device.create_render_pipeline(&vello::wgpu::RenderPipelineDescriptor {
                label: Some(label),
                layout: Some(&pipeline_layout),
                vertex: vello::wgpu::VertexState {
                    module: &shader,
                    entry_point: Some("vs"),
                    compilation_options: vello::wgpu::PipelineCompilationOptions::default(),
                    buffers: &[],
                },
                fragment: Some(vello::wgpu::FragmentState {
                    module: &shader,
                    entry_point: Some("fs"),
                    compilation_options: vello::wgpu::PipelineCompilationOptions::default(),
                    targets: &[Some(vello::wgpu::ColorTargetState {
                        format: target_format,
                        blend,
                        write_mask: vello::wgpu::ColorWrites::ALL,
                    })],
                }),
                primitive: vello::wgpu::PrimitiveState::default(),
                depth_stencil: None,
                multisample: vello::wgpu::MultisampleState::default(),
                multiview: None,
                cache: None,
            })
        };

        Ok(Self {
            blend: make(
                Some(vello::wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                "textover_blend_pipeline",
            ),
            replace: make(None, "textover_replace_pipeline"),
            bind_group_layout,
            sampler,
            rect,
        })
    }
}

/// Record one composite pass drawing `src` over (or into) `dst` at `rect_ndc` and submit it.
///
/// The caller handles fence ring admission and token tagging.
pub(crate) fn run_composite_pass(
    ctx: &GpuContext,
    pipelines: &BlendPipelines,
    src: &vello::wgpu::Texture,
    dst: &vello::wgpu::Texture,
    rect_ndc: [f32; 4],
    replace: bool,
    clear: bool,
) {
    ctx.queue.write_buffer(&pipelines.rect, 0, &{
        let mut bytes = [0u8; 16];
        for (i, v) in rect_ndc.iter().enumerate() {
            bytes[i * 4..i * 4 + 4].copy_from_slice(&v.to_le_bytes());
        }
        bytes
    });

    let src_view = src.create_view(&vello::wgpu::TextureViewDescriptor::default());
    let dst_view = dst.create_view(&vello::wgpu::TextureViewDescriptor::default());
    let bind_group = ctx
        .device
        .create_bind_group(&vello::wgpu::BindGroupDescriptor {
            label: Some("textover_blend_bg"),
            layout: &pipelines.bind_group_layout,
            entries: &[
                vello::wgpu::BindGroupEntry {
                    binding: 0,
                    resource: vello::wgpu::BindingResource::TextureView(&src_view),
                },
                vello::wgpu::BindGroupEntry {
                    binding: 1,
                    resource: vello::wgpu::BindingResource::Sampler(&pipelines.sampler),
                },
                vello::wgpu::BindGroupEntry {
                    binding: 2,
                    resource: pipelines.rect.as_entire_binding(),
                },
            ],
        });

    let mut encoder = ctx
        .device
        .create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
            label: Some("textover_blend_encoder"),
        });
    {
        let mut rp = encoder.begin_render_pass(&vello::wgpu::RenderPassDescriptor {
            label: Some("textover_blend_rp"),
            color_attachments: &[Some(vello::wgpu::RenderPassColorAttachment {
                view: &dst_view,
                resolve_target: None,
                depth_slice: None,
                ops: vello::wgpu::Operations {
                    load: if clear {
                        vello::wgpu::LoadOp::Clear(vello::wgpu::Color::TRANSPARENT)
                    } else {
                        vello::wgpu::LoadOp::Load
                    },
                    store: vello::wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });
        rp.set_pipeline(if replace {
            &pipelines.replace
        } else {
            &pipelines.blend
        });
        rp.set_bind_group(0, &bind_group, &[]);
        rp.draw(0..6, 0..1);
    }
    ctx.queue.submit(Some(encoder.finish()));
}

/// Placement rectangle in pixels to normalized device coordinates, y flipped.
pub(crate) fn placement_ndc(placement: Placement, sw: u32, sh: u32, dw: u32, dh: u32) -> [f32; 4] {
    let x0 = placement.x as f32 / dw as f32 * 2.0 - 1.0;
    let x1 = (placement.x as f32 + sw as f32) / dw as f32 * 2.0 - 1.0;
    let y0 = 1.0 - placement.y as f32 / dh as f32 * 2.0;
    let y1 = 1.0 - (placement.y as f32 + sh as f32) / dh as f32 * 2.0;
    [x0, y0, x1, y1]
}

/// Format-keyed composite pipelines plus the scratch target for the convert chain.
///
/// Shared between the single-API and interop backends: once the overlay exists as a texture on
/// the device, compositing it into a frame is the same work in both execution domains.
pub(crate) struct GpuCompositor {
    pipelines: std::collections::HashMap<vello::wgpu::TextureFormat, BlendPipelines>,
    scratch: TexturePool,
}

impl GpuCompositor {
    pub(crate) fn new(ctx: Arc<GpuContext>) -> Self {
        Self {
            pipelines: std::collections::HashMap::new(),
            scratch: TexturePool::new(ctx, 2),
        }
    }

    fn pass(
        &mut self,
        ctx: &Arc<GpuContext>,
        ring: &mut InFlightRing,
        format: vello::wgpu::TextureFormat,
        src: &vello::wgpu::Texture,
        dst: &vello::wgpu::Texture,
        rect_ndc: [f32; 4],
        replace: bool,
        clear: bool,
    ) -> OverlayResult<FenceToken> {
        let clock = GpuFenceClock::new(ctx.clone());
        ring.admit(&clock)?;
        if !self.pipelines.contains_key(&format) {
            self.pipelines
                .insert(format, BlendPipelines::new(ctx, format)?);
        }
        let pipelines = self
            .pipelines
            .get(&format)
            .ok_or_else(|| OverlayError::resource("blend pipelines missing"))?;
        run_composite_pass(ctx, pipelines, src, dst, rect_ndc, replace, clear);
        let token = ring.issue();
        ctx.signal(token);
        Ok(token)
    }

    /// Composite `overlay` into `target` at `placement` under the negotiated `mode`.
    ///
    /// Direct modes are one pass. Convert modes run the pre-convert/blend/post-convert chain
    /// through a pooled scratch target, wide at 16 bits per channel.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn blend(
        &mut self,
        ctx: &Arc<GpuContext>,
        ring: &mut InFlightRing,
        mode: BlendMode,
        overlay: &vello::wgpu::Texture,
        overlay_size: (u32, u32),
        placement: Placement,
        frame_format: PixelFormat,
        target: &mut GpuSurface,
    ) -> OverlayResult<()> {
        let (sw, sh) = overlay_size;
        let (dw, dh) = (target.width, target.height);
        let rect = placement_ndc(placement, sw, sh, dw, dh);

        match mode {
            BlendMode::DirectBlend => {
                let token = self.pass(
                    ctx,
                    ring,
                    texture_format(frame_format)?,
                    overlay,
                    &target.texture,
                    rect,
                    false,
                    false,
                )?;
                target.fence.tag(token);
            }
            BlendMode::ConvertBlend | BlendMode::ConvertBlendWide => {
                let scratch_format = if mode == BlendMode::ConvertBlendWide {
                    PixelFormat::Rgba16
                } else {
                    PixelFormat::Rgba8
                };
                self.scratch.configure(scratch_format, dw, dh)?;
                let mut scratch = self.scratch.acquire()?;

                let full = [-1.0, 1.0, 1.0, -1.0];
                self.pass(
                    ctx,
                    ring,
                    texture_format(scratch_format)?,
                    &target.texture,
                    &scratch.texture,
                    full,
                    true,
                    true,
                )?;
                self.pass(
                    ctx,
                    ring,
                    texture_format(scratch_format)?,
                    overlay,
                    &scratch.texture,
                    rect,
                    false,
                    false,
                )?;
                let token = self.pass(
                    ctx,
                    ring,
                    texture_format(frame_format)?,
                    &scratch.texture,
                    &target.texture,
                    full,
                    true,
                    false,
                )?;
                scratch.fence.tag(token);
                target.fence.tag(token);

                let clock = GpuFenceClock::new(ctx.clone());
                self.scratch.release(scratch, &clock);
            }
            _ => return Err(OverlayError::frame("gpu composite in a non-gpu mode")),
        }
        Ok(())
    }
}

struct CachedGpuRender {
    key: LayoutKey,
    surface: GpuSurface,
}

/// Render backend for the single-API GPU execution domain.
pub struct SingleApiBackend {
    output: OutputConfig,
    mode: BlendMode,
    async_depth: usize,
    ctx: Option<Arc<GpuContext>>,
    renderer: Option<vello::Renderer>,
    scene: vello::Scene,
    pool: Option<TexturePool>,
    compositor: Option<GpuCompositor>,
    ring: InFlightRing,
    cached: Option<CachedGpuRender>,
    font_cache: Option<(LayoutKey, vello::peniko::FontData)>,
    stats: BackendStats,
}

impl SingleApiBackend {
    /// Build a GPU backend for the negotiated output and mode.
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
                "gpu backend requires a gpu blend mode",
            ));
        }
        Ok(Self {
            output: *output,
            mode,
            async_depth,
            ctx: None,
            renderer: None,
            scene: vello::Scene::new(),
            pool: None,
            compositor: None,
            ring: InFlightRing::new(async_depth),
            cached: None,
            font_cache: None,
            stats: BackendStats::default(),
        })
    }

    /// Texture pool generation, for verifying device-change invalidation.
    pub fn pool_generation(&self) -> Option<u64> {
        self.pool.as_ref().map(TexturePool::generation)
    }

    /// Texture pool counters, if a device is bound.
    pub fn pool_stats(&self) -> Option<PoolStats> {
        self.pool.as_ref().map(TexturePool::stats)
    }

    fn clock(&self) -> OverlayResult<GpuFenceClock> {
        let ctx = self
            .ctx
            .as_ref()
            .ok_or_else(|| OverlayError::resource("gpu backend not bound to a device"))?;
        Ok(GpuFenceClock::new(ctx.clone()))
    }

    fn bind(&mut self, ctx: Arc<GpuContext>) -> OverlayResult<()> {
        let renderer = {
            let _guard = ctx
                .lock
                .lock()
                .map_err(|_| OverlayError::resource("device lock poisoned"))?;
            vello::Renderer::new(&ctx.device, vello::RendererOptions::default())
                .map_err(|e| OverlayError::resource(format!("vello renderer init failed: {e:?}")))?
        };
        self.pool = Some(TexturePool::new(ctx.clone(), 2));
        self.compositor = Some(GpuCompositor::new(ctx.clone()));
        self.renderer = Some(renderer);
        self.cached = None;
        self.ring = InFlightRing::new(self.async_depth);
        self.ctx = Some(ctx);
        Ok(())
    }

    fn clear(&mut self) {
        if let (Ok(clock), Some(cached)) = (self.clock(), self.cached.take()) {
            let mut surface = cached.surface;
            let _ = surface.fence.settle(&clock);
        }
        if let Ok(clock) = self.clock() {
            let _ = self.ring.drain(&clock);
        }
        self.pool = None;
        self.compositor = None;
        self.renderer = None;
        self.font_cache = None;
        self.ctx = None;
    }

    fn font_for(&mut self, layout: &Layout) -> Option<vello::peniko::FontData> {
        if let Some((key, font)) = &self.font_cache
            && *key == layout.key()
        {
            return Some(font.clone());
        }
        let bytes = layout.font_bytes()?;
        let font =
            vello::peniko::FontData::new(vello::peniko::Blob::from(bytes.as_ref().clone()), 0);
        self.font_cache = Some((layout.key(), font.clone()));
        Some(font)
    }

    fn rasterize(&mut self, layout: &Layout) -> OverlayResult<GpuSurface> {
        let ctx = self
            .ctx
            .clone()
            .ok_or_else(|| OverlayError::resource("gpu draw before a frame bound the device"))?;
        let font = self.font_for(layout);

        self.scene.reset();
        if let Some(font) = &font {
            for line in layout.shaped().lines() {
                for item in line.items() {
                    let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                        continue;
                    };
                    let brush = run.style().brush;
                    self.scene
                        .draw_glyphs(font)
                        .transform(kurbo::Affine::IDENTITY)
                        .font_size(run.run().font_size())
                        .brush(vello::peniko::Color::from_rgba8(
                            brush.r, brush.g, brush.b, brush.a,
                        ))
                        .draw(
                            vello::peniko::Fill::NonZero,
                            run.glyphs().map(|g| vello::Glyph {
                                id: g.id,
                                x: g.x,
                                y: g.y,
                            }),
                        );
                }
            }
        }

        let pool = self
            .pool
            .as_mut()
            .ok_or_else(|| OverlayError::resource("gpu backend missing pool"))?;
        pool.configure(PixelFormat::Rgba8, layout.width(), layout.height())?;
        let mut surface = pool.acquire()?;

        let clock = GpuFenceClock::new(ctx.clone());
        self.ring.admit(&clock)?;

        let view = surface
            .texture
            .create_view(&vello::wgpu::TextureViewDescriptor::default());
        let renderer = self
            .renderer
            .as_mut()
            .ok_or_else(|| OverlayError::resource("gpu backend missing renderer"))?;
        renderer
            .render_to_texture(
                &ctx.device,
                &ctx.queue,
                &self.scene,
                &view,
                &vello::RenderParams {
                    base_color: vello::peniko::Color::from_rgba8(0, 0, 0, 0),
                    width: layout.width(),
                    height: layout.height(),
                    antialiasing_method: vello::AaConfig::Area,
                },
            )
            .map_err(|e| OverlayError::frame(format!("vello render failed: {e:?}")))?;

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
            .ok_or_else(|| OverlayError::resource("gpu backend not bound to a device"))?;
        let (overlay, sw, sh) = match &self.cached {
            Some(c) if c.key == key => {
                (c.surface.texture.clone(), c.surface.width, c.surface.height)
            }
            _ => return Err(OverlayError::frame("no cached rendering for layout")),
        };
        let format = frame.format;
        let FrameData::Texture(target) = &mut frame.data else {
            return Err(OverlayError::frame("gpu blend target is not a texture"));
        };
        let compositor = self
            .compositor
            .as_mut()
            .ok_or_else(|| OverlayError::resource("gpu backend missing compositor"))?;
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

impl RenderBackend for SingleApiBackend {
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
        if let (Ok(clock), Some(old)) = (self.clock(), self.cached.take())
            && let Some(pool) = self.pool.as_mut()
        {
            pool.release(old.surface, &clock);
        }
        let info = RenderedInfo {
            key: layout.key(),
            width: surface.width,
            height: surface.height,
        };
        self.cached = Some(CachedGpuRender {
            key: layout.key(),
            surface,
        });
        Ok(info)
    }

    fn blend(&mut self, key: LayoutKey, placement: Placement, frame: &mut VideoFrame) -> bool {
        match self.blend_inner(key, placement, frame) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, "gpu blend failed");
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
                // First frame binds the device; not a device change.
                if let Err(err) = self.bind(surface.ctx.clone()) {
                    warn!(%err, "device bind failed");
                }
                false
            }
            Some(ctx) if ctx.id == surface.ctx.id => false,
            Some(ctx) => {
                debug!(old = ?ctx.id, new = ?surface.ctx.id, "gpu device changed, clearing");
                self.clear();
                true
            }
        }
    }

    fn bind_device(&mut self, frame: &VideoFrame) -> OverlayResult<()> {
        if let FrameData::Texture(surface) = &frame.data {
            self.bind(surface.ctx.clone())?;
        }
        Ok(())
    }

    fn upload(&mut self, src: &VideoFrame, dst: &mut VideoFrame) -> bool {
        match (&src.data, &mut dst.data) {
            (FrameData::Texture(s), FrameData::Texture(d)) if s.ctx.id == d.ctx.id => {
                // Intra-domain fast path: device-native copy.
                let ctx = s.ctx.clone();
                let clock = GpuFenceClock::new(ctx.clone());
                if self.ring.admit(&clock).is_err() {
                    return false;
                }
                let mut encoder =
                    ctx.device
                        .create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
                            label: Some("textover_upload_encoder"),
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
            (FrameData::Cpu(planes), FrameData::Texture(d)) => {
                // Generic fallback: plane upload through the queue.
                if texture_format(planes.format).is_err() {
                    warn!(format = ?planes.format, "no gpu upload path for format");
                    return false;
                }
                let ctx = d.ctx.clone();
                ctx.queue.write_texture(
                    d.texture.as_image_copy(),
                    &planes.planes[0].data,
                    vello::wgpu::TexelCopyBufferLayout {
                        offset: 0,
                        bytes_per_row: Some(planes.planes[0].stride as u32),
                        rows_per_image: Some(planes.height),
                    },
                    vello::wgpu::Extent3d {
                        width: planes.width,
                        height: planes.height,
                        depth_or_array_layers: 1,
                    },
                );
                true
            }
            _ => {
                warn!("gpu upload between incompatible frame payloads");
                false
            }
        }
    }

    fn handle_allocation_query(&mut self, query: &mut AllocationQuery) -> bool {
        // GPU pools are clamped to the async depth: more in-flight buffers than the fence ring
        // admits would only add latency.
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

impl VideoFrame {
    /// Build a GPU frame backed by a fresh pooled-style texture on `ctx`.
    #[cfg(feature = "gpu")]
    pub fn alloc_gpu(
        ctx: Arc<GpuContext>,
        format: PixelFormat,
        width: u32,
        height: u32,
        domain: MemoryDomain,
    ) -> OverlayResult<Self> {
        let mut pool = TexturePool::new(ctx, 0);
        pool.configure(format, width, height)?;
        let surface = pool.acquire()?;
        Ok(Self {
            format,
            domain,
            device: Some(surface.ctx.id),
            flags: ResourceFlags::owned(),
            data: FrameData::Texture(surface),
            attached: None,
        })
    }
}
