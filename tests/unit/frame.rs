use super::*;

use crate::foundation::core::{MemoryDomain, PixelFormat, Placement};
use crate::layout::text::LayoutKey;

#[test]
fn plane_buf_alloc_sizes_nv12_planes() {
    let buf = PlaneBuf::alloc(PixelFormat::Nv12, 7, 5).unwrap();
    assert_eq!(buf.planes.len(), 2);
    // Luma: 7x5 at 1 byte.
    assert_eq!(buf.planes[0].data.len(), buf.planes[0].stride * 5);
    assert!(buf.planes[0].stride >= 7);
    // Chroma: 4x3 at 2 bytes (interleaved UV).
    assert_eq!(buf.planes[1].data.len(), buf.planes[1].stride * 3);
    assert!(buf.planes[1].stride >= 8);
}

#[test]
fn plane_buf_alloc_is_zeroed() {
    let buf = PlaneBuf::alloc(PixelFormat::Rgba8, 4, 4).unwrap();
    assert!(buf.planes[0].data.iter().all(|&b| b == 0));
}

#[test]
fn alloc_cpu_frame_is_system_owned() {
    let frame = VideoFrame::alloc_cpu(PixelFormat::I420, 16, 8).unwrap();
    assert_eq!(frame.domain, MemoryDomain::System);
    assert!(frame.device.is_none());
    assert!(frame.flags.render_target);
    assert!(!frame.flags.decoder_only);
    assert_eq!(frame.width(), 16);
    assert_eq!(frame.height(), 8);
    assert_eq!(frame.cpu_planes().unwrap().planes.len(), 3);
}

#[test]
fn alloc_like_matches_source_shape() {
    let src = VideoFrame::alloc_cpu(PixelFormat::Bgra8, 32, 24).unwrap();
    let out = src.alloc_like().unwrap();
    assert_eq!(out.format, src.format);
    assert_eq!(out.domain, src.domain);
    assert_eq!((out.width(), out.height()), (32, 24));
}

#[test]
fn copy_planes_rejects_shape_mismatch() {
    let a = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 8, 8).unwrap();
    let mut b = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 8, 4).unwrap();
    assert!(copy_planes(&a, &mut b).is_err());
    let mut c = VideoFrame::alloc_cpu(PixelFormat::Bgra8, 8, 8).unwrap();
    assert!(copy_planes(&a, &mut c).is_err());
}

#[test]
fn copy_planes_copies_content() {
    let mut a = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 4, 2).unwrap();
    a.cpu_planes_mut().unwrap().planes[0].data[0] = 201;
    let mut b = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 4, 2).unwrap();
    copy_planes(&a, &mut b).unwrap();
    assert_eq!(b.cpu_planes().unwrap().planes[0].data[0], 201);
}

#[test]
fn attach_overlay_replaces_previous_metadata() {
    let mut frame = VideoFrame::alloc_cpu(PixelFormat::Rgba8, 8, 8).unwrap();
    assert!(frame.attached.is_none());
    frame.attach_overlay(AttachedOverlay {
        key: LayoutKey(1),
        width: 2,
        height: 2,
        data: std::sync::Arc::new(vec![0; 16]),
        placement: Placement::default(),
    });
    frame.attach_overlay(AttachedOverlay {
        key: LayoutKey(2),
        width: 2,
        height: 2,
        data: std::sync::Arc::new(vec![0; 16]),
        placement: Placement { x: 3, y: 4 },
    });
    let attached = frame.attached.as_ref().unwrap();
    assert_eq!(attached.key, LayoutKey(2));
    assert_eq!(attached.placement, Placement { x: 3, y: 4 });
}
