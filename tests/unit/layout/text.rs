use super::*;

#[test]
fn key_depends_on_text_and_box() {
    let a = Layout::empty("hello", 320, 64);
    let b = Layout::empty("hello", 320, 64);
    assert_eq!(a.key(), b.key());

    assert_ne!(a.key(), Layout::empty("hell0", 320, 64).key());
    assert_ne!(a.key(), Layout::empty("hello", 321, 64).key());
    assert_ne!(a.key(), Layout::empty("hello", 320, 63).key());
}

#[test]
fn empty_layout_has_no_font_and_no_glyph_lines() {
    let layout = Layout::empty("placeholder", 100, 40);
    assert!(layout.font_bytes().is_none());
    assert_eq!(layout.shaped().lines().count(), 0);
    assert_eq!(layout.width(), 100);
    assert_eq!(layout.height(), 40);
    assert_eq!(layout.text(), "placeholder");
}

#[test]
fn shaper_rejects_bad_parameters() {
    let mut shaper = LayoutShaper::new();
    assert!(shaper
        .shape("hi", 0, 40, &[], 16.0, TextBrush::white())
        .is_err());
    assert!(shaper
        .shape("hi", 100, 40, &[], 0.0, TextBrush::white())
        .is_err());
    assert!(shaper
        .shape("hi", 100, 40, &[], f32::NAN, TextBrush::white())
        .is_err());
}

#[test]
fn shaper_rejects_bytes_with_no_font() {
    let mut shaper = LayoutShaper::new();
    let err = shaper
        .shape("hi", 100, 40, b"not a font", 16.0, TextBrush::white())
        .unwrap_err();
    assert!(matches!(err, OverlayError::Negotiation(_)));
}

#[test]
fn white_brush_is_opaque() {
    let brush = TextBrush::white();
    assert_eq!(brush.a, 255);
    assert_eq!((brush.r, brush.g, brush.b), (255, 255, 255));
}
