use super::*;

#[test]
fn plane_counts_match_format_layout() {
    assert_eq!(PixelFormat::Rgba8.plane_count(), 1);
    assert_eq!(PixelFormat::Rgba16.plane_count(), 1);
    assert_eq!(PixelFormat::Nv12.plane_count(), 2);
    assert_eq!(PixelFormat::I420.plane_count(), 3);
    assert_eq!(PixelFormat::P010.plane_count(), 2);
}

#[test]
fn chroma_planes_are_half_resolution_rounded_up() {
    assert_eq!(PixelFormat::Nv12.plane_size(0, 7, 5), (7, 5));
    assert_eq!(PixelFormat::Nv12.plane_size(1, 7, 5), (4, 3));
    assert_eq!(PixelFormat::I420.plane_size(2, 8, 8), (4, 4));
}

#[test]
fn bit_depths() {
    assert_eq!(PixelFormat::Rgba8.bit_depth(), 8);
    assert_eq!(PixelFormat::P010.bit_depth(), 10);
    assert_eq!(PixelFormat::Rgba16.bit_depth(), 16);
    assert_eq!(PixelFormat::Unknown.bit_depth(), 0);
}

#[test]
fn gpu_domains() {
    assert!(!MemoryDomain::System.is_gpu());
    assert!(MemoryDomain::Gpu.is_gpu());
    assert!(MemoryDomain::GpuInterop.is_gpu());
}

#[test]
fn owned_flags_are_render_target_eligible() {
    let flags = ResourceFlags::owned();
    assert!(flags.readable);
    assert!(flags.render_target);
    assert!(!flags.decoder_only);
}

#[test]
fn output_config_rejects_zero_dimensions() {
    let mut config = OutputConfig {
        format: PixelFormat::Rgba8,
        domain: MemoryDomain::System,
        width: 1920,
        height: 1080,
        attach_requested: false,
        device_caps: DeviceCaps::default(),
    };
    assert!(config.validate().is_ok());
    config.width = 0;
    assert!(config.validate().is_err());
}
