//! Caption style parameters.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MediaModelError;

/// An sRGB color with straight (non-premultiplied) alpha.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const WHITE: Rgba = Rgba::rgb(255, 255, 255);
    pub const BLACK: Rgba = Rgba::rgb(0, 0, 0);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Same color with alpha scaled by `opacity` in `[0, 1]`.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let o = opacity.clamp(0.0, 1.0);
        Self {
            a: (self.a as f64 * o).round() as u8,
            ..self
        }
    }

    pub fn alpha_f32(&self) -> f32 {
        self.a as f32 / 255.0
    }

    /// `#rrggbb` without alpha, as used in SVG fill attributes.
    pub fn to_hex_rgb(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }
}

impl FromStr for Rgba {
    type Err = MediaModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || MediaModelError::InvalidColor {
            value: s.to_string(),
        };
        let hex = s.trim().strip_prefix('#').ok_or_else(invalid)?;
        if !hex.is_ascii() {
            return Err(invalid());
        }
        let nibble = |i: usize| u8::from_str_radix(&hex[i..i + 1], 16).map_err(|_| invalid());
        let byte = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| invalid());

        match hex.len() {
            3 => Ok(Rgba::rgb(nibble(0)? * 17, nibble(1)? * 17, nibble(2)? * 17)),
            6 => Ok(Rgba::rgb(byte(0)?, byte(2)?, byte(4)?)),
            8 => Ok(Rgba::new(byte(0)?, byte(2)?, byte(4)?, byte(6)?)),
            _ => Err(invalid()),
        }
    }
}

impl TryFrom<String> for Rgba {
    type Error = MediaModelError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Rgba> for String {
    fn from(c: Rgba) -> Self {
        c.to_string()
    }
}

impl fmt::Display for Rgba {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.a == 255 {
            write!(f, "{}", self.to_hex_rgb())
        } else {
            write!(f, "{}{:02x}", self.to_hex_rgb(), self.a)
        }
    }
}

/// Where the caption block sits in the frame.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VerticalPosition {
    Top,
    Middle,
    #[default]
    Bottom,
}

/// Visual parameters for burned-in captions. Immutable per render pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptionStyle {
    /// Font size at the 800px reference width.
    pub font_size_px: f64,

    pub text_color: Rgba,

    pub background_color: Rgba,

    /// Opacity of the per-line background box, `0` disables it.
    pub background_opacity: f64,

    pub vertical_position: VerticalPosition,

    pub font_family: String,
}

impl Default for CaptionStyle {
    fn default() -> Self {
        Self {
            font_size_px: 24.0,
            text_color: Rgba::WHITE,
            background_color: Rgba::BLACK,
            background_opacity: 0.5,
            vertical_position: VerticalPosition::Bottom,
            font_family: "sans-serif".to_string(),
        }
    }
}

impl CaptionStyle {
    /// Load a style from JSON; missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self, MediaModelError> {
        let style: Self = serde_json::from_str(json)?;
        style.validate()?;
        Ok(style)
    }

    pub fn validate(&self) -> Result<(), MediaModelError> {
        if !(self.font_size_px.is_finite() && self.font_size_px > 0.0) {
            return Err(MediaModelError::InvalidStyle {
                message: format!("font size must be positive, got {}", self.font_size_px),
            });
        }
        if !(0.0..=1.0).contains(&self.background_opacity) {
            return Err(MediaModelError::InvalidStyle {
                message: format!(
                    "background opacity must be within [0, 1], got {}",
                    self.background_opacity
                ),
            });
        }
        if self.font_family.trim().is_empty() {
            return Err(MediaModelError::InvalidStyle {
                message: "font family is empty".to_string(),
            });
        }
        Ok(())
    }

    /// Background fill with the style's opacity applied, or `None` when
    /// backgrounds are disabled.
    pub fn background_fill(&self) -> Option<Rgba> {
        if self.background_opacity > 0.0 {
            Some(self.background_color.with_opacity(self.background_opacity))
        } else {
            None
        }
    }
}
