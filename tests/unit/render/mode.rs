use super::*;

fn caps(direct: bool, wide: bool) -> DeviceCaps {
    DeviceCaps {
        direct_alpha_blend: direct,
        wide_formats: wide,
    }
}

#[test]
fn attach_requested_wins_over_everything() {
    for format in [
        PixelFormat::Rgba8,
        PixelFormat::Nv12,
        PixelFormat::P010,
        PixelFormat::Unknown,
    ] {
        for domain in [
            MemoryDomain::System,
            MemoryDomain::Gpu,
            MemoryDomain::GpuInterop,
        ] {
            for dc in [caps(false, false), caps(true, true)] {
                assert_eq!(select(format, domain, true, dc), BlendMode::AttachOnly);
            }
        }
    }
}

#[test]
fn system_domain_is_always_software() {
    for format in [
        PixelFormat::Rgba8,
        PixelFormat::Rgba16,
        PixelFormat::I420,
        PixelFormat::P010,
    ] {
        assert_eq!(
            select(format, MemoryDomain::System, false, caps(true, true)),
            BlendMode::SoftwareBlend
        );
    }
}

#[test]
fn rgba8_direct_when_device_blends_alpha() {
    assert_eq!(
        select(PixelFormat::Rgba8, MemoryDomain::Gpu, false, caps(true, false)),
        BlendMode::DirectBlend
    );
    assert_eq!(
        select(PixelFormat::Bgra8, MemoryDomain::GpuInterop, false, caps(true, false)),
        BlendMode::DirectBlend
    );
}

#[test]
fn rgba8_without_direct_alpha_needs_convert_chain() {
    assert_eq!(
        select(PixelFormat::Rgba8, MemoryDomain::Gpu, false, caps(false, false)),
        BlendMode::ConvertBlend
    );
}

#[test]
fn wide_rgba_follows_wide_format_support() {
    assert_eq!(
        select(PixelFormat::Rgba16, MemoryDomain::Gpu, false, caps(true, true)),
        BlendMode::DirectBlend
    );
    assert_eq!(
        select(PixelFormat::Rgba16, MemoryDomain::Gpu, false, caps(false, true)),
        BlendMode::ConvertBlendWide
    );
    assert_eq!(
        select(PixelFormat::Rgba16, MemoryDomain::Gpu, false, caps(false, false)),
        BlendMode::SoftwareBlend
    );
}

#[test]
fn yuv_8bit_on_gpu_uses_convert_chain() {
    for format in [PixelFormat::Nv12, PixelFormat::I420] {
        assert_eq!(
            select(format, MemoryDomain::GpuInterop, false, caps(true, true)),
            BlendMode::ConvertBlend
        );
    }
}

#[test]
fn p010_needs_wide_targets_or_falls_back() {
    assert_eq!(
        select(PixelFormat::P010, MemoryDomain::Gpu, false, caps(true, true)),
        BlendMode::ConvertBlendWide
    );
    assert_eq!(
        select(PixelFormat::P010, MemoryDomain::Gpu, false, caps(true, false)),
        BlendMode::SoftwareBlend
    );
}

#[test]
fn unknown_format_falls_back_to_software() {
    assert_eq!(
        select(PixelFormat::Unknown, MemoryDomain::Gpu, false, caps(true, true)),
        BlendMode::SoftwareBlend
    );
}

#[test]
fn selector_is_deterministic() {
    let inputs = (
        PixelFormat::Nv12,
        MemoryDomain::GpuInterop,
        false,
        caps(true, false),
    );
    let first = select(inputs.0, inputs.1, inputs.2, inputs.3);
    for _ in 0..100 {
        assert_eq!(select(inputs.0, inputs.1, inputs.2, inputs.3), first);
    }
}

#[test]
fn mode_classification() {
    assert!(BlendMode::DirectBlend.is_gpu());
    assert!(BlendMode::ConvertBlendWide.is_gpu());
    assert!(!BlendMode::SoftwareBlend.is_gpu());
    assert!(!BlendMode::AttachOnly.blends_pixels());
    assert!(!BlendMode::NotSupported.blends_pixels());
    assert!(BlendMode::SoftwareBlend.blends_pixels());
}
