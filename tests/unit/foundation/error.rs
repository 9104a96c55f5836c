use super::*;

#[test]
fn constructors_map_to_variants() {
    assert!(matches!(
        OverlayError::negotiation("x"),
        OverlayError::Negotiation(_)
    ));
    assert!(matches!(
        OverlayError::resource("x"),
        OverlayError::Resource(_)
    ));
    assert!(matches!(OverlayError::frame("x"), OverlayError::Frame(_)));
    assert!(matches!(
        OverlayError::device_lost("x"),
        OverlayError::DeviceLost(_)
    ));
    assert!(matches!(
        OverlayError::interop_order("x"),
        OverlayError::InteropOrder(_)
    ));
}

#[test]
fn fatal_for_config_covers_resource_and_device_loss() {
    assert!(OverlayError::resource("pool").is_fatal_for_config());
    assert!(OverlayError::device_lost("gone").is_fatal_for_config());
    assert!(!OverlayError::negotiation("caps").is_fatal_for_config());
    assert!(!OverlayError::frame("blend").is_fatal_for_config());
}

#[test]
fn display_includes_category_and_message() {
    let err = OverlayError::frame("blend into uploaded buffer failed");
    let text = err.to_string();
    assert!(text.contains("frame error"));
    assert!(text.contains("blend into uploaded buffer failed"));
}

#[test]
fn anyhow_errors_convert_transparently() {
    let inner = anyhow::anyhow!("collaborator exploded");
    let err: OverlayError = inner.into();
    assert!(matches!(err, OverlayError::Other(_)));
    assert_eq!(err.to_string(), "collaborator exploded");
}
