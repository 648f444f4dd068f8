//! CPU frame buffer with SVG-rendered text.
//!
//! Text is laid out and rasterized by usvg/resvg so that measurement and
//! drawing use the same shaping and the same font database.

use std::sync::Arc;

use clipforge_media_model::Rgba;

use crate::host::{FontSpec, RasterSurface, TextShadow, VideoFrame};

/// Average advance of a glyph relative to the font size, used when no
/// font can be resolved.
const FALLBACK_ADVANCE: f64 = 0.55;

/// Build a font database with the system fonts loaded.
pub fn system_fontdb() -> Arc<usvg::fontdb::Database> {
    let mut db = usvg::fontdb::Database::new();
    db.load_system_fonts();
    tracing::debug!(faces = db.len(), "Loaded system fonts");
    Arc::new(db)
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// `<text>` element for one caption line.
fn text_element(text: &str, x: f64, y: f64, font: &FontSpec, color: Rgba, filter: bool) -> String {
    format!(
        r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" fill="{fill}" fill-opacity="{opacity}" dominant-baseline="middle" xml:space="preserve"{filter}>{body}</text>"#,
        family = escape_xml(&font.family),
        size = font.size_px,
        fill = color.to_hex_rgb(),
        opacity = color.alpha_f32(),
        filter = if filter { r#" filter="url(#shadow)""# } else { "" },
        body = escape_xml(text),
    )
}

fn shadow_filter(shadow: &TextShadow) -> String {
    format!(
        r#"<defs><filter id="shadow" x="-50%" y="-50%" width="200%" height="200%"><feDropShadow dx="{dx}" dy="{dy}" stdDeviation="{sd}" flood-color="{color}" flood-opacity="{opacity}"/></filter></defs>"#,
        dx = shadow.offset_x,
        dy = shadow.offset_y,
        sd = shadow.blur / 2.0,
        color = shadow.color.to_hex_rgb(),
        opacity = shadow.color.alpha_f32(),
    )
}

/// Composite one premultiplied source pixel over a straight-alpha
/// destination pixel.
fn blend_premultiplied(dst: &mut [u8], src: [f32; 4]) {
    let sa = src[3];
    if sa <= 0.0 {
        return;
    }
    let da = dst[3] as f32 / 255.0;
    let out_a = sa + da * (1.0 - sa);
    for i in 0..3 {
        let d = dst[i] as f32 / 255.0 * da;
        let premul = src[i] + d * (1.0 - sa);
        dst[i] = (premul / out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    }
    dst[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
}

/// RGBA8 frame buffer implementing [`RasterSurface`].
pub struct RgbaSurface {
    frame: VideoFrame,
    fontdb: Arc<usvg::fontdb::Database>,
}

impl RgbaSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self::with_fontdb(width, height, system_fontdb())
    }

    /// Surface for jobs that never draw text.
    pub fn without_fonts(width: u32, height: u32) -> Self {
        Self::with_fontdb(width, height, Arc::new(usvg::fontdb::Database::new()))
    }

    pub fn with_fontdb(width: u32, height: u32, fontdb: Arc<usvg::fontdb::Database>) -> Self {
        Self {
            frame: VideoFrame::new(width, height),
            fontdb,
        }
    }

    fn parse(&self, svg: &str) -> Option<usvg::Tree> {
        let opts = usvg::Options {
            fontdb: Arc::clone(&self.fontdb),
            ..Default::default()
        };
        match usvg::Tree::from_data(svg.as_bytes(), &opts) {
            Ok(tree) => Some(tree),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to build caption text tree");
                None
            }
        }
    }

    fn estimate_width(text: &str, font: &FontSpec) -> f64 {
        text.chars().count() as f64 * font.size_px * FALLBACK_ADVANCE
    }
}

impl RasterSurface for RgbaSurface {
    fn size(&self) -> (u32, u32) {
        (self.frame.width, self.frame.height)
    }

    fn resize(&mut self, width: u32, height: u32) {
        if (width, height) != self.size() {
            self.frame = VideoFrame::new(width, height);
        }
    }

    /// Nearest-neighbor scale of `frame` onto the whole surface.
    fn draw_image(&mut self, frame: &VideoFrame) {
        self.frame.pts_secs = frame.pts_secs;
        let (dw, dh) = self.size();
        if (frame.width, frame.height) == (dw, dh) {
            self.frame.data.copy_from_slice(&frame.data);
            return;
        }
        if frame.width == 0 || frame.height == 0 {
            return;
        }
        for y in 0..dh {
            let sy = (y as u64 * frame.height as u64 / dh as u64) as usize;
            for x in 0..dw {
                let sx = (x as u64 * frame.width as u64 / dw as u64) as usize;
                let s = (sy * frame.width as usize + sx) * 4;
                let d = (y as usize * dw as usize + x as usize) * 4;
                self.frame.data[d..d + 4].copy_from_slice(&frame.data[s..s + 4]);
            }
        }
    }

    fn fill_rect(&mut self, x: f64, y: f64, width: f64, height: f64, color: Rgba) {
        let (fw, fh) = self.size();
        let x0 = x.max(0.0).round() as u32;
        let y0 = y.max(0.0).round() as u32;
        let x1 = ((x + width).round().max(0.0) as u32).min(fw);
        let y1 = ((y + height).round().max(0.0) as u32).min(fh);
        let a = color.alpha_f32();
        let src = [
            color.r as f32 / 255.0 * a,
            color.g as f32 / 255.0 * a,
            color.b as f32 / 255.0 * a,
            a,
        ];
        for py in y0..y1 {
            for px in x0..x1 {
                let i = (py as usize * fw as usize + px as usize) * 4;
                blend_premultiplied(&mut self.frame.data[i..i + 4], src);
            }
        }
    }

    fn measure_text(&self, text: &str, font: &FontSpec) -> f64 {
        if text.is_empty() {
            return 0.0;
        }
        if self.fontdb.is_empty() {
            return Self::estimate_width(text, font);
        }
        let canvas_w = (Self::estimate_width(text, font) * 4.0).max(1.0).ceil();
        let canvas_h = (font.size_px * 3.0).max(1.0).ceil();
        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{canvas_w}" height="{canvas_h}">{}</svg>"#,
            text_element(text, 0.0, canvas_h / 2.0, font, Rgba::BLACK, false)
        );
        let width = self
            .parse(&svg)
            .map(|tree| tree.root().abs_bounding_box().width() as f64)
            .unwrap_or(0.0);
        if width > 0.0 {
            width
        } else {
            Self::estimate_width(text, font)
        }
    }

    fn fill_text(
        &mut self,
        text: &str,
        x: f64,
        y: f64,
        font: &FontSpec,
        color: Rgba,
        shadow: Option<&TextShadow>,
    ) {
        if text.trim().is_empty() {
            return;
        }
        let (fw, fh) = self.size();
        let margin = shadow.map_or(0.0, |s| s.blur * 2.0 + s.offset_x.abs().max(s.offset_y.abs()));
        let text_w = self.measure_text(text, font);

        // Only the region around the line is rasterized.
        let left = (x - font.size_px - margin).floor().max(0.0);
        let top = (y - font.size_px - margin).floor().max(0.0);
        let right = (x + text_w + font.size_px + margin).ceil().min(fw as f64);
        let bottom = (y + font.size_px + margin).ceil().min(fh as f64);
        if right <= left || bottom <= top {
            return;
        }
        let (rw, rh) = ((right - left) as u32, (bottom - top) as u32);

        let svg = format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{fw}" height="{fh}">{}{}</svg>"#,
            shadow.map(shadow_filter).unwrap_or_default(),
            text_element(text, x, y, font, color, shadow.is_some()),
        );
        let Some(tree) = self.parse(&svg) else {
            return;
        };
        let Some(mut pixmap) = resvg::tiny_skia::Pixmap::new(rw, rh) else {
            tracing::warn!(width = rw, height = rh, "Failed to allocate text pixmap");
            return;
        };
        let xform = resvg::tiny_skia::Transform::from_translate(-left as f32, -top as f32);
        resvg::render(&tree, xform, &mut pixmap.as_mut());

        let (ox, oy) = (left as usize, top as usize);
        for (row, src_row) in pixmap.data().chunks_exact(rw as usize * 4).enumerate() {
            for (col, px) in src_row.chunks_exact(4).enumerate() {
                if px[3] == 0 {
                    continue;
                }
                let i = ((oy + row) * fw as usize + ox + col) * 4;
                let src = [
                    px[0] as f32 / 255.0,
                    px[1] as f32 / 255.0,
                    px[2] as f32 / 255.0,
                    px[3] as f32 / 255.0,
                ];
                blend_premultiplied(&mut self.frame.data[i..i + 4], src);
            }
        }
    }

    fn snapshot(&self) -> &VideoFrame {
        &self.frame
    }
}
