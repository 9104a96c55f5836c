use super::*;

fn solid(w: u32, h: u32, px: [u8; 4]) -> Vec<u8> {
    px.repeat((w * h) as usize)
}

#[test]
fn constructor_rejects_formats_without_a_cpu_path() {
    assert!(CpuConverter::new(PixelFormat::Rgba8).is_ok());
    assert!(CpuConverter::new(PixelFormat::I420).is_ok());
    assert!(CpuConverter::new(PixelFormat::P010).is_err());
    assert!(CpuConverter::new(PixelFormat::Unknown).is_err());
}

#[test]
fn run_rejects_mismatched_destination() {
    let mut conv = CpuConverter::new(PixelFormat::Rgba8).unwrap();
    let mut dst = PlaneBuf::alloc(PixelFormat::Nv12, 4, 4).unwrap();
    let src = solid(2, 2, [0, 0, 0, 255]);
    assert!(conv
        .run(&src, 2, 2, &mut dst, Placement::default(), true)
        .is_err());
}

#[test]
fn blend_composites_over_existing_content() {
    let mut conv = CpuConverter::new(PixelFormat::Rgba8).unwrap();
    let mut dst = PlaneBuf::alloc(PixelFormat::Rgba8, 2, 2).unwrap();
    dst.planes[0].data.fill(255);
    // Transparent overlay leaves the opaque white frame alone.
    let src = solid(2, 2, [0, 0, 0, 0]);
    conv.run(&src, 2, 2, &mut dst, Placement::default(), true)
        .unwrap();
    assert!(dst.planes[0].data.iter().all(|&b| b == 255));
}

#[test]
fn overwrite_replaces_the_region_instead_of_blending() {
    let mut conv = CpuConverter::new(PixelFormat::Rgba8).unwrap();
    let mut dst = PlaneBuf::alloc(PixelFormat::Rgba8, 2, 1).unwrap();
    dst.planes[0].data.fill(255);
    // A transparent overlay written without blending must clear the region.
    let src = solid(1, 1, [0, 0, 0, 0]);
    conv.run(&src, 1, 1, &mut dst, Placement::default(), false)
        .unwrap();
    assert_eq!(&dst.planes[0].data[0..4], &[0, 0, 0, 0]);
    assert_eq!(&dst.planes[0].data[4..8], &[255, 255, 255, 255]);
}

#[test]
fn overwrite_on_yuv_fills_video_black() {
    let mut conv = CpuConverter::new(PixelFormat::Nv12).unwrap();
    let mut dst = PlaneBuf::alloc(PixelFormat::Nv12, 4, 4).unwrap();
    dst.planes[0].data.fill(200);
    dst.planes[1].data.fill(60);
    let src = solid(2, 2, [0, 0, 0, 0]);
    conv.run(&src, 2, 2, &mut dst, Placement::default(), false)
        .unwrap();
    // Overwritten region holds neutral video levels, remainder untouched.
    assert_eq!(dst.planes[0].data[0], 16);
    assert_eq!(dst.planes[0].data[3], 200);
    assert_eq!(dst.planes[1].data[0], 128);
    let chroma_stride = dst.planes[1].stride;
    assert_eq!(dst.planes[1].data[chroma_stride + 2], 60);
}

#[test]
fn off_frame_placement_is_a_noop_in_both_modes() {
    let mut conv = CpuConverter::new(PixelFormat::Rgba8).unwrap();
    let mut dst = PlaneBuf::alloc(PixelFormat::Rgba8, 4, 4).unwrap();
    dst.planes[0].data.fill(7);
    let src = solid(2, 2, [255, 255, 255, 255]);
    conv.run(&src, 2, 2, &mut dst, Placement { x: -5, y: 0 }, true)
        .unwrap();
    conv.run(&src, 2, 2, &mut dst, Placement { x: 0, y: 9 }, false)
        .unwrap();
    assert!(dst.planes[0].data.iter().all(|&b| b == 7));
}
