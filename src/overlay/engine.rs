//! The overlay orchestrator.
//!
//! Owns the active [`RenderBackend`], re-derives the blend mode on caps changes, rebuilds the
//! backend on device changes, and drives the per-frame draw → blend → upload sequence. All
//! failure policy from the error taxonomy is applied here: negotiation failures fall back to
//! passthrough, resource failures tear down the configuration, per-frame failures drop the
//! frame and leave the backend intact, and device loss rebuilds.

use tracing::{debug, info, warn};

use crate::foundation::core::{OutputConfig, PixelFormat, Placement};
use crate::foundation::error::{OverlayError, OverlayResult};
use crate::frame::{AttachedOverlay, VideoFrame};
use crate::layout::text::Layout;
use crate::overlay::alloc::AllocationQuery;
use crate::render::backend::{RenderBackend, create_backend};
use crate::render::mode::{BlendMode, select};
use crate::render::sync::DEFAULT_ASYNC_DEPTH;

/// Engine-level knobs.
#[derive(Clone, Copy, Debug)]
pub struct EngineOpts {
    /// Pass frames through unmodified on recoverable per-frame errors instead of surfacing them.
    pub passthrough_on_frame_error: bool,
    /// Bound on unretired GPU submissions.
    pub async_depth: usize,
}

impl Default for EngineOpts {
    fn default() -> Self {
        Self {
            passthrough_on_frame_error: false,
            async_depth: DEFAULT_ASYNC_DEPTH,
        }
    }
}

/// Per-engine frame counters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct EngineStats {
    /// Frames handed to [`OverlayEngine::draw_and_blend`].
    pub frames: u64,
    /// Frames blended directly into the incoming buffer.
    pub blends_in_place: u64,
    /// Frames that went through the upload path.
    pub uploads: u64,
    /// Backend rebuilds (device changes and device loss).
    pub rebuilds: u64,
    /// Recoverable per-frame failures.
    pub frame_errors: u64,
}

type BackendFactory = fn(BlendMode, &OutputConfig, usize) -> OverlayResult<Box<dyn RenderBackend>>;

enum State {
    Unconfigured,
    /// `backend` is `None` exactly when `mode == BlendMode::NotSupported` (passthrough).
    Configured {
        mode: BlendMode,
        output: OutputConfig,
        backend: Option<Box<dyn RenderBackend>>,
    },
}

/// The overlay orchestrator: one per stream, driven by a single pipeline thread.
pub struct OverlayEngine {
    opts: EngineOpts,
    factory: BackendFactory,
    layout: Option<Layout>,
    state: State,
    stats: EngineStats,
}

fn frame_failed(stats: &mut EngineStats, opts: &EngineOpts, err: OverlayError) -> OverlayResult<bool> {
    stats.frame_errors += 1;
    warn!(%err, "frame dropped");
    if opts.passthrough_on_frame_error {
        Ok(false)
    } else {
        Err(err)
    }
}

impl OverlayEngine {
    /// An unconfigured engine with default options.
    pub fn new() -> Self {
        Self::with_opts(EngineOpts::default())
    }

    /// An unconfigured engine with explicit options.
    pub fn with_opts(opts: EngineOpts) -> Self {
        Self::with_factory(opts, create_backend)
    }

    fn with_factory(opts: EngineOpts, factory: BackendFactory) -> Self {
        Self {
            opts,
            factory,
            layout: None,
            state: State::Unconfigured,
            stats: EngineStats::default(),
        }
    }

    /// The active blend mode, if configured.
    pub fn mode(&self) -> Option<BlendMode> {
        match &self.state {
            State::Unconfigured => None,
            State::Configured { mode, .. } => Some(*mode),
        }
    }

    /// Frame counters.
    pub fn stats(&self) -> EngineStats {
        self.stats
    }

    /// Rasterization counters of the active backend, if any.
    pub fn backend_stats(&self) -> Option<crate::render::backend::BackendStats> {
        match &self.state {
            State::Configured {
                backend: Some(b), ..
            } => Some(b.stats()),
            _ => None,
        }
    }

    /// Re-derive the blend mode and rebuild the backend for newly negotiated caps.
    ///
    /// The only way a blend mode is ever established. Must be called on every caps
    /// renegotiation; an unsupported combination leaves the pipeline in passthrough and a
    /// resource failure leaves the engine unconfigured.
    pub fn set_caps(
        &mut self,
        in_format: PixelFormat,
        output: &OutputConfig,
    ) -> OverlayResult<BlendMode> {
        self.state = State::Unconfigured;
        output.validate()?;

        let mode = select(
            output.format,
            output.domain,
            output.attach_requested,
            output.device_caps,
        );
        info!(?in_format, format = ?output.format, domain = ?output.domain, ?mode, "caps negotiated");

        if mode == BlendMode::NotSupported {
            self.state = State::Configured {
                mode,
                output: *output,
                backend: None,
            };
            return Ok(mode);
        }

        let backend = match (self.factory)(mode, output, self.opts.async_depth) {
            Ok(b) => b,
            Err(err @ OverlayError::Negotiation(_)) => {
                // No viable backend for this combination: not fatal, run passthrough.
                warn!(%err, "falling back to passthrough");
                self.state = State::Configured {
                    mode: BlendMode::NotSupported,
                    output: *output,
                    backend: None,
                };
                return Ok(BlendMode::NotSupported);
            }
            Err(err) => return Err(err),
        };
        self.state = State::Configured {
            mode,
            output: *output,
            backend: Some(backend),
        };
        Ok(mode)
    }

    /// Replace the layout. Cached renderings keyed on the old identity expire on the next draw.
    pub fn set_layout(&mut self, layout: Layout) {
        self.layout = Some(layout);
    }

    /// Drop the layout; subsequent frames pass through untouched.
    pub fn clear_layout(&mut self) {
        self.layout = None;
    }

    /// The single per-frame entry point.
    ///
    /// Returns `Ok(true)` when `frame` now carries the composited overlay (possibly in a
    /// replacement buffer), `Ok(false)` when the frame passed through untouched or carries the
    /// overlay only as attached metadata.
    pub fn draw_and_blend(
        &mut self,
        x: i32,
        y: i32,
        frame: &mut VideoFrame,
    ) -> OverlayResult<bool> {
        self.stats.frames += 1;

        let (mode, output) = match &self.state {
            State::Configured { mode, output, .. } => (*mode, *output),
            State::Unconfigured => {
                return Err(OverlayError::resource(
                    "draw_and_blend before caps negotiation",
                ));
            }
        };
        if mode == BlendMode::NotSupported || self.layout.is_none() {
            return Ok(false);
        }

        // (1) Device change is destructive: the backend has already cleared itself, rebuild.
        let device_changed = {
            let State::Configured {
                backend: Some(backend),
                ..
            } = &mut self.state
            else {
                return Err(OverlayError::resource("configured mode lost its backend"));
            };
            backend.update_device(frame)
        };
        if device_changed {
            self.stats.rebuilds += 1;
            debug!("rebuilding backend after device change");
            match (self.factory)(mode, &output, self.opts.async_depth) {
                Ok(mut b) => {
                    // Bind up front so the triggering frame keeps going through (2) and (3).
                    if let Err(err) = b.bind_device(frame) {
                        self.state = State::Unconfigured;
                        return Err(OverlayError::resource(format!(
                            "backend rebuild failed: {err}"
                        )));
                    }
                    if let State::Configured { backend, .. } = &mut self.state {
                        *backend = Some(b);
                    }
                }
                Err(err) => {
                    self.state = State::Unconfigured;
                    return Err(OverlayError::resource(format!(
                        "backend rebuild failed: {err}"
                    )));
                }
            }
        }

        let Some(layout) = &self.layout else {
            return Ok(false);
        };
        let State::Configured {
            backend: Some(backend),
            ..
        } = &mut self.state
        else {
            return Err(OverlayError::resource("configured mode lost its backend"));
        };

        // (2) Draw (cached per layout identity).
        let info = match backend.draw_layout(layout) {
            Ok(info) => info,
            Err(err @ OverlayError::DeviceLost(_)) => {
                // The frame is dropped unconditionally; the rebuilt backend serves the next one.
                self.stats.rebuilds += 1;
                warn!(%err, "device lost during draw, rebuilding");
                match (self.factory)(mode, &output, self.opts.async_depth) {
                    Ok(b) => {
                        if let State::Configured { backend, .. } = &mut self.state {
                            *backend = Some(b);
                        }
                        return Err(err);
                    }
                    Err(rebuild_err) => {
                        self.state = State::Unconfigured;
                        return Err(OverlayError::resource(format!(
                            "backend rebuild failed: {rebuild_err}"
                        )));
                    }
                }
            }
            Err(err) => return frame_failed(&mut self.stats, &self.opts, err),
        };
        let placement = Placement { x, y };

        // Attach-only: no compositing, the rendered pixels ride along as metadata.
        if mode == BlendMode::AttachOnly {
            match backend.attach_payload(info.key) {
                Ok((width, height, data)) => {
                    frame.attach_overlay(AttachedOverlay {
                        key: info.key,
                        width,
                        height,
                        data,
                        placement,
                    });
                    return Ok(false);
                }
                Err(err) => return frame_failed(&mut self.stats, &self.opts, err),
            }
        }

        // (3) Blend in place when the frame qualifies, else through an uploaded copy.
        if backend.can_blend_in_place(frame) {
            if backend.blend(info.key, placement, frame) {
                self.stats.blends_in_place += 1;
                return Ok(true);
            }
            return frame_failed(
                &mut self.stats,
                &self.opts,
                OverlayError::frame("in-place blend failed"),
            );
        }

        let mut out = match frame.alloc_like() {
            Ok(out) => out,
            Err(err) => return frame_failed(&mut self.stats, &self.opts, err),
        };
        if !backend.upload(frame, &mut out) {
            return frame_failed(
                &mut self.stats,
                &self.opts,
                OverlayError::frame("upload to output buffer failed"),
            );
        }
        if !backend.blend(info.key, placement, &mut out) {
            return frame_failed(
                &mut self.stats,
                &self.opts,
                OverlayError::frame("blend into uploaded buffer failed"),
            );
        }
        *frame = out;
        self.stats.uploads += 1;
        Ok(true)
    }

    /// Forward an upstream allocation proposal query to the active backend.
    pub fn propose_allocation(&mut self, query: &mut AllocationQuery) -> bool {
        match &mut self.state {
            State::Configured {
                backend: Some(b), ..
            } => b.handle_allocation_query(query),
            _ => false,
        }
    }

    /// Forward an allocation decision query; true when a proposal was adopted.
    pub fn decide_allocation(&mut self, query: &mut AllocationQuery) -> bool {
        match &mut self.state {
            State::Configured {
                backend: Some(b), ..
            } => {
                if query.decided().is_none() {
                    b.handle_allocation_query(query);
                }
                query.decided().is_some()
            }
            _ => false,
        }
    }
}

impl Default for OverlayEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "../../tests/unit/overlay/engine.rs"]
mod tests;
