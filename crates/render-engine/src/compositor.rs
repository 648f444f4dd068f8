//! Caption compositor: wraps and positions cue text over a frame buffer.
//!
//! Font size scales with output width against an 800px reference so that
//! captions keep their proportions at any resolution. All text widths come
//! from the surface's own measurement.

use clipforge_media_model::{CaptionStyle, Rgba, VerticalPosition};

use crate::host::{FontSpec, RasterSurface, TextShadow};

/// Width at which `CaptionStyle::font_size_px` applies unscaled.
pub const REFERENCE_WIDTH: f64 = 800.0;

/// Smallest font size ever drawn.
pub const MIN_FONT_PX: f64 = 12.0;

/// Lines are wrapped to stay within this fraction of the frame width.
pub const MAX_LINE_FRACTION: f64 = 0.9;

pub const LINE_HEIGHT_FACTOR: f64 = 1.4;
pub const PADDING_FACTOR: f64 = 0.3;

/// Drop shadow applied to all caption text.
pub const CAPTION_SHADOW: TextShadow = TextShadow {
    offset_x: 2.0,
    offset_y: 2.0,
    blur: 4.0,
    color: Rgba::new(0, 0, 0, 204),
};

/// One wrapped line placed on the frame.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLine {
    pub text: String,
    /// Measured width in pixels.
    pub width: f64,
    /// Top of the line box.
    pub top: f64,
}

/// Resolved geometry for one caption on one frame size.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptionLayout {
    pub font: FontSpec,
    pub line_height: f64,
    pub padding: f64,
    pub center_x: f64,
    pub lines: Vec<CaptionLine>,
}

impl CaptionLayout {
    pub fn block_height(&self) -> f64 {
        self.lines.len() as f64 * self.line_height
    }
}

/// `max(font_size x frame_width / 800, 12)`.
pub fn scaled_font_size(font_size_px: f64, frame_width: u32) -> f64 {
    (font_size_px * frame_width as f64 / REFERENCE_WIDTH).max(MIN_FONT_PX)
}

/// Greedy word wrap. Explicit newlines always break; a single word wider
/// than `max_width` is kept whole on its own line.
pub fn wrap_text(
    surface: &dyn RasterSurface,
    text: &str,
    font: &FontSpec,
    max_width: f64,
) -> Vec<(String, f64)> {
    if text.trim().is_empty() {
        return Vec::new();
    }

    let mut lines = Vec::new();
    for paragraph in text.lines() {
        let mut words = paragraph.split_whitespace();
        let Some(first) = words.next() else {
            lines.push((String::new(), 0.0));
            continue;
        };

        let mut current = first.to_string();
        let mut current_width = surface.measure_text(&current, font);
        for word in words {
            let candidate = format!("{current} {word}");
            let width = surface.measure_text(&candidate, font);
            if width <= max_width {
                current = candidate;
                current_width = width;
            } else {
                let finished = std::mem::replace(&mut current, word.to_string());
                lines.push((finished, current_width));
                current_width = surface.measure_text(&current, font);
            }
        }
        lines.push((current, current_width));
    }
    lines
}

/// Compute where each caption line goes on the surface.
pub fn layout_caption(surface: &dyn RasterSurface, text: &str, style: &CaptionStyle) -> CaptionLayout {
    let (width, height) = surface.size();
    let (w, h) = (width as f64, height as f64);
    let font = FontSpec {
        family: style.font_family.clone(),
        size_px: scaled_font_size(style.font_size_px, width),
    };
    let line_height = LINE_HEIGHT_FACTOR * font.size_px;
    let padding = PADDING_FACTOR * font.size_px;

    let wrapped = wrap_text(surface, text, &font, w * MAX_LINE_FRACTION);
    let block_height = wrapped.len() as f64 * line_height;
    let block_top = match style.vertical_position {
        VerticalPosition::Top => h * 0.1,
        VerticalPosition::Middle => (h - block_height) / 2.0,
        VerticalPosition::Bottom => h * 0.9 - block_height,
    };

    let lines = wrapped
        .into_iter()
        .enumerate()
        .map(|(i, (text, width))| CaptionLine {
            text,
            width,
            top: block_top + i as f64 * line_height,
        })
        .collect();

    CaptionLayout {
        font,
        line_height,
        padding,
        center_x: w / 2.0,
        lines,
    }
}

/// Draw a caption: per-line background boxes first, then shadowed text.
pub fn draw_caption(surface: &mut dyn RasterSurface, text: &str, style: &CaptionStyle) {
    let layout = layout_caption(&*surface, text, style);
    let background = style.background_fill();

    for line in layout.lines.iter().filter(|l| !l.text.is_empty()) {
        let left = layout.center_x - line.width / 2.0;
        if let Some(fill) = background {
            surface.fill_rect(
                left - layout.padding,
                line.top,
                line.width + 2.0 * layout.padding,
                layout.line_height,
                fill,
            );
        }
        surface.fill_text(
            &line.text,
            left,
            line.top + layout.line_height / 2.0,
            &layout.font,
            style.text_color,
            Some(&CAPTION_SHADOW),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::host::VideoFrame;

    /// Every character is 10px wide; records draw calls.
    struct GridSurface {
        frame: VideoFrame,
        rects: Vec<(f64, f64, f64, f64)>,
        texts: Vec<(String, f64, f64)>,
    }

    impl GridSurface {
        fn new(w: u32, h: u32) -> Self {
            Self {
                frame: VideoFrame::new(w, h),
                rects: Vec::new(),
                texts: Vec::new(),
            }
        }
    }

    impl RasterSurface for GridSurface {
        fn size(&self) -> (u32, u32) {
            (self.frame.width, self.frame.height)
        }
        fn resize(&mut self, width: u32, height: u32) {
            self.frame = VideoFrame::new(width, height);
        }
        fn draw_image(&mut self, _frame: &VideoFrame) {}
        fn fill_rect(&mut self, x: f64, y: f64, w: f64, h: f64, _color: Rgba) {
            self.rects.push((x, y, w, h));
        }
        fn measure_text(&self, text: &str, _font: &FontSpec) -> f64 {
            text.chars().count() as f64 * 10.0
        }
        fn fill_text(
            &mut self,
            text: &str,
            x: f64,
            y: f64,
            _font: &FontSpec,
            _color: Rgba,
            shadow: Option<&TextShadow>,
        ) {
            assert!(shadow.is_some());
            self.texts.push((text.to_string(), x, y));
        }
        fn snapshot(&self) -> &VideoFrame {
            &self.frame
        }
    }

    #[test]
    fn test_font_scales_with_width_and_has_floor() {
        assert_eq!(scaled_font_size(24.0, 800), 24.0);
        assert_eq!(scaled_font_size(24.0, 1600), 48.0);
        assert_eq!(scaled_font_size(24.0, 200), 12.0);
    }

    #[test]
    fn test_wrap_respects_width_limit() {
        let surface = GridSurface::new(100, 100);
        let font = FontSpec {
            family: "sans-serif".into(),
            size_px: 12.0,
        };
        // 90px limit = 9 characters.
        let lines = wrap_text(&surface, "aaa bbb ccc dddddddddddd", &font, 90.0);
        let texts: Vec<&str> = lines.iter().map(|(t, _)| t.as_str()).collect();
        assert_eq!(texts, vec!["aaa bbb", "ccc", "dddddddddddd"]);
        assert_eq!(lines[0].1, 70.0);
    }

    #[test]
    fn test_explicit_newlines_break() {
        let surface = GridSurface::new(1000, 100);
        let font = FontSpec {
            family: "sans-serif".into(),
            size_px: 12.0,
        };
        let lines = wrap_text(&surface, "one\ntwo", &font, 900.0);
        assert_eq!(lines.len(), 2);
    }

    #[test]
    fn test_bottom_block_ends_at_ninety_percent() {
        let surface = GridSurface::new(800, 600);
        let layout = layout_caption(&surface, "hello\nworld", &CaptionStyle::default());
        let bottom = layout.lines.last().unwrap().top + layout.line_height;
        assert!((bottom - 540.0).abs() < 1e-9);
        assert!((layout.line_height - 24.0 * 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_top_and_middle_placement() {
        let surface = GridSurface::new(800, 600);
        let top = CaptionStyle {
            vertical_position: VerticalPosition::Top,
            ..Default::default()
        };
        assert!((layout_caption(&surface, "x", &top).lines[0].top - 60.0).abs() < 1e-9);

        let middle = CaptionStyle {
            vertical_position: VerticalPosition::Middle,
            ..Default::default()
        };
        let layout = layout_caption(&surface, "x", &middle);
        let center = layout.lines[0].top + layout.line_height / 2.0;
        assert!((center - 300.0).abs() < 1e-9);
    }

    #[test]
    fn test_background_box_per_line() {
        let mut surface = GridSurface::new(800, 600);
        draw_caption(&mut surface, "hi\nthere", &CaptionStyle::default());
        assert_eq!(surface.rects.len(), 2);
        assert_eq!(surface.texts.len(), 2);

        let pad = 0.3 * 24.0;
        let (x, _, w, h) = surface.rects[0];
        assert!((w - (20.0 + 2.0 * pad)).abs() < 1e-9);
        assert!((x - (400.0 - 10.0 - pad)).abs() < 1e-9);
        assert!((h - 24.0 * 1.4).abs() < 1e-9);
    }

    #[test]
    fn test_no_background_when_opacity_zero() {
        let mut surface = GridSurface::new(800, 600);
        let style = CaptionStyle {
            background_opacity: 0.0,
            ..Default::default()
        };
        draw_caption(&mut surface, "hi", &style);
        assert!(surface.rects.is_empty());
        assert_eq!(surface.texts.len(), 1);
    }

    #[test]
    fn test_empty_and_multibyte_text() {
        let mut surface = GridSurface::new(800, 600);
        draw_caption(&mut surface, "", &CaptionStyle::default());
        draw_caption(&mut surface, "   ", &CaptionStyle::default());
        assert!(surface.texts.is_empty());

        draw_caption(&mut surface, "héllo 👋", &CaptionStyle::default());
        let (text, x, _) = &surface.texts[0];
        assert_eq!(text, "héllo 👋");
        // 7 chars at 10px, centered on 400.
        assert!((x - 365.0).abs() < 1e-9);
    }
}
