use super::*;

use crate::foundation::core::{DeviceCaps, DeviceId, OutputConfig, ResourceFlags};
use crate::layout::text::Layout;

fn output(format: PixelFormat) -> OutputConfig {
    OutputConfig {
        format,
        domain: MemoryDomain::System,
        width: 64,
        height: 64,
        attach_requested: false,
        device_caps: DeviceCaps::default(),
    }
}

#[test]
fn draw_layout_rasterizes_once_per_identity() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    let layout = Layout::empty("once", 16, 8);

    let first = backend.draw_layout(&layout).unwrap();
    for _ in 0..5 {
        let again = backend.draw_layout(&layout).unwrap();
        assert_eq!(again, first);
    }
    let stats = backend.stats();
    assert_eq!(stats.rasterizations, 1);
    assert_eq!(stats.cache_hits, 5);
}

#[test]
fn changing_the_layout_invalidates_the_cache() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    backend.draw_layout(&Layout::empty("a", 16, 8)).unwrap();
    backend.draw_layout(&Layout::empty("b", 16, 8)).unwrap();
    assert_eq!(backend.stats().rasterizations, 2);
}

#[test]
fn blend_placement_does_not_invalidate_the_cache() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    let layout = Layout::empty("steady", 16, 8);
    let info = backend.draw_layout(&layout).unwrap();

    let mut frame = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 64, 64).unwrap();
    assert!(backend.blend(info.key, Placement { x: 0, y: 0 }, &mut frame));
    assert!(backend.blend(info.key, Placement { x: 10, y: 20 }, &mut frame));
    backend.draw_layout(&layout).unwrap();
    assert_eq!(backend.stats().rasterizations, 1);
}

#[test]
fn empty_layout_blends_transparently() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    let info = backend.draw_layout(&Layout::empty("t", 8, 8)).unwrap();

    let mut frame = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 16, 16).unwrap();
    frame.cpu_planes_mut().unwrap().planes[0].data.fill(9);
    assert!(backend.blend(info.key, Placement::default(), &mut frame));
    assert!(frame
        .cpu_planes()
        .unwrap()
        .planes[0]
        .data
        .iter()
        .all(|&b| b == 9));
}

#[test]
fn blend_services_planar_yuv_frames() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Nv12)).unwrap();
    let info = backend.draw_layout(&Layout::empty("yuv", 8, 8)).unwrap();
    let mut frame = VideoFrame::alloc_cpu(PixelFormat::Nv12, 16, 16).unwrap();
    assert!(backend.blend(info.key, Placement::default(), &mut frame));
}

#[test]
fn blend_refuses_a_never_drawn_key() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    backend.draw_layout(&Layout::empty("x", 8, 8)).unwrap();
    let mut frame = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 16, 16).unwrap();
    let other = Layout::empty("y", 8, 8);
    assert!(!backend.blend(other.key(), Placement::default(), &mut frame));
}

#[test]
fn in_place_requires_writable_system_frames() {
    let backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    let mut frame = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 16, 16).unwrap();
    assert!(backend.can_blend_in_place(&frame));

    frame.flags.decoder_only = true;
    assert!(!backend.can_blend_in_place(&frame));
    frame.flags = ResourceFlags {
        readable: true,
        render_target: false,
        decoder_only: false,
    };
    assert!(!backend.can_blend_in_place(&frame));
    frame.flags = ResourceFlags::owned();
    frame.device = Some(DeviceId(1));
    assert!(!backend.can_blend_in_place(&frame));
}

#[test]
fn device_tagged_frame_triggers_rebuild_and_clears_cache() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    backend.draw_layout(&Layout::empty("gone", 8, 8)).unwrap();

    let mut frame = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 16, 16).unwrap();
    assert!(!backend.update_device(&frame));
    frame.device = Some(DeviceId(3));
    assert!(backend.update_device(&frame));

    // The cache went with the device change.
    backend.draw_layout(&Layout::empty("gone", 8, 8)).unwrap();
    assert_eq!(backend.stats().rasterizations, 2);
}

#[test]
fn upload_copies_between_system_frames() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    let mut src = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 8, 8).unwrap();
    src.cpu_planes_mut().unwrap().planes[0].data[0] = 42;
    let mut dst = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 8, 8).unwrap();
    assert!(backend.upload(&src, &mut dst));
    assert_eq!(dst.cpu_planes().unwrap().planes[0].data[0], 42);
}

#[test]
fn allocation_query_proposes_a_system_pool() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    let mut query = crate::overlay::alloc::AllocationQuery::new(PixelFormat::Rgba8, 64, 64);
    assert!(backend.handle_allocation_query(&mut query));
    let pool = query.decided().unwrap();
    assert_eq!(pool.domain, MemoryDomain::System);
    assert!(pool.min_buffers >= 1);
}

#[test]
fn attach_payload_returns_tightly_packed_pixels() {
    let mut backend = BitmapBackend::new(&output(PixelFormat::Rgba8)).unwrap();
    let info = backend.draw_layout(&Layout::empty("attach", 6, 3)).unwrap();
    let (w, h, bytes) = backend.attach_payload(info.key).unwrap();
    assert_eq!((w, h), (6, 3));
    assert_eq!(bytes.len(), 6 * 3 * 4);
    // Cached: a second call hands back the same allocation.
    let (_, _, again) = backend.attach_payload(info.key).unwrap();
    assert!(std::sync::Arc::ptr_eq(&bytes, &again));
}
