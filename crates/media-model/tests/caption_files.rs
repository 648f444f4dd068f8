//! Loading cue lists and caption styles from JSON files.

use clipforge_media_model::{CaptionStyle, CueTrack, MediaModelError, Rgba, VerticalPosition};

const CUES: &str = r#"[
    { "id": 2, "startTime": 4.0, "endTime": 6.5, "text": "second" },
    { "id": 1, "startTime": 0.0, "endTime": 4.0, "text": "first, then\nmore" },
    { "id": 3, "start_secs": 6.0, "end_secs": 8.0, "text": "überlappend" }
]"#;

#[test]
fn cue_list_lookup_uses_times_not_positions() {
    let track = CueTrack::from_json(CUES).unwrap();
    assert_eq!(track.len(), 3);
    assert_eq!(track.active_at(1.0).map(|c| c.id), Some(1));
    assert_eq!(track.active_at(7.5).map(|c| c.id), Some(3));
    assert!(track.active_at(8.5).is_none());
    assert_eq!(track.end_secs(), 8.0);
}

#[test]
fn shared_boundary_resolves_to_first_cue_in_list() {
    let track = CueTrack::from_json(CUES).unwrap();
    assert_eq!(track.active_at(4.0).map(|c| c.id), Some(2));
    assert_eq!(track.active_at(6.25).map(|c| c.id), Some(2));
    assert_eq!(track.overlaps(), vec![(2, 3)]);
}

#[test]
fn inverted_cue_is_rejected_with_its_id() {
    let json = r#"[{ "id": 9, "startTime": 3.0, "endTime": 1.0, "text": "x" }]"#;
    match CueTrack::from_json(json) {
        Err(MediaModelError::InvalidCue { id, .. }) => assert_eq!(id, 9),
        other => panic!("expected invalid cue, got {other:?}"),
    }
}

#[test]
fn partial_style_fills_in_defaults() {
    let style = CaptionStyle::from_json(
        r##"{ "fontSizePx": 32, "textColor": "#ff0", "verticalPosition": "top" }"##,
    )
    .unwrap();
    assert_eq!(style.font_size_px, 32.0);
    assert_eq!(style.text_color, Rgba::rgb(255, 255, 0));
    assert_eq!(style.vertical_position, VerticalPosition::Top);
    assert_eq!(style.font_family, CaptionStyle::default().font_family);
    assert_eq!(style.background_fill(), Some(Rgba::new(0, 0, 0, 128)));
}

#[test]
fn style_round_trips_colors_as_hex() {
    let style = CaptionStyle {
        background_color: Rgba::new(16, 32, 48, 200),
        background_opacity: 0.0,
        ..CaptionStyle::default()
    };
    let json = serde_json::to_string(&style).unwrap();
    assert!(json.contains("\"#102030c8\""));
    assert_eq!(style.background_fill(), None);
    assert_eq!(CaptionStyle::from_json(&json).unwrap(), style);
}

#[test]
fn bad_style_values_are_rejected() {
    assert!(matches!(
        CaptionStyle::from_json(r#"{ "backgroundOpacity": 1.5 }"#),
        Err(MediaModelError::InvalidStyle { .. })
    ));
    assert!(matches!(
        CaptionStyle::from_json(r#"{ "textColor": "white" }"#),
        Err(MediaModelError::ParseError(_))
    ));
}
