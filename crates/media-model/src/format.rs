//! Typed container/codec descriptors.
//!
//! A [`FormatCandidate`] is what the format negotiator offers to an encode
//! capability query. The MIME string is derived from it, never parsed back.

use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Container {
    Mp4,
    WebM,
    Matroska,
    Ogg,
}

impl Container {
    fn subtype(&self) -> &'static str {
        match self {
            Container::Mp4 => "mp4",
            Container::WebM => "webm",
            Container::Matroska => "x-matroska",
            Container::Ogg => "ogg",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VideoCodec {
    /// H.264 constrained baseline, level 3.0.
    Avc1Baseline,
    /// H.264 with the profile left to the encoder.
    Avc1,
    Vp9,
    Vp8,
}

impl VideoCodec {
    pub fn codec_string(&self) -> &'static str {
        match self {
            VideoCodec::Avc1Baseline => "avc1.42E01E",
            VideoCodec::Avc1 => "avc1",
            VideoCodec::Vp9 => "vp9",
            VideoCodec::Vp8 => "vp8",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AudioCodec {
    /// AAC-LC.
    Aac,
    Opus,
}

impl AudioCodec {
    pub fn codec_string(&self) -> &'static str {
        match self {
            AudioCodec::Aac => "mp4a.40.2",
            AudioCodec::Opus => "opus",
        }
    }
}

/// Which tracks the output carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackLayout {
    Muxed,
    VideoOnly,
    AudioOnly,
}

/// One container/codec combination to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FormatCandidate {
    pub container: Container,
    pub layout: TrackLayout,

    /// `None` lets the encoder pick its default for the container.
    #[serde(default)]
    pub video: Option<VideoCodec>,

    #[serde(default)]
    pub audio: Option<AudioCodec>,
}

impl FormatCandidate {
    /// Container-only candidate; codecs are chosen by the encoder.
    pub const fn new(container: Container, layout: TrackLayout) -> Self {
        Self {
            container,
            layout,
            video: None,
            audio: None,
        }
    }

    pub const fn with_video(mut self, codec: VideoCodec) -> Self {
        self.video = Some(codec);
        self
    }

    pub const fn with_audio(mut self, codec: AudioCodec) -> Self {
        self.audio = Some(codec);
        self
    }

    pub fn is_audio_only(&self) -> bool {
        self.layout == TrackLayout::AudioOnly
    }

    pub fn has_video(&self) -> bool {
        !self.is_audio_only()
    }

    pub fn has_audio(&self) -> bool {
        self.layout != TrackLayout::VideoOnly
    }

    /// MIME type with a `codecs` parameter when codecs are pinned,
    /// e.g. `video/mp4;codecs=avc1.42E01E,mp4a.40.2`.
    pub fn mime_type(&self) -> String {
        let media = if self.is_audio_only() { "audio" } else { "video" };
        let codecs: Vec<&str> = self
            .video
            .filter(|_| self.has_video())
            .map(|v| v.codec_string())
            .into_iter()
            .chain(
                self.audio
                    .filter(|_| self.has_audio())
                    .map(|a| a.codec_string()),
            )
            .collect();

        if codecs.is_empty() {
            format!("{media}/{}", self.container.subtype())
        } else {
            format!("{media}/{};codecs={}", self.container.subtype(), codecs.join(","))
        }
    }

    /// Conventional file extension for artifacts in this format.
    pub fn file_extension(&self) -> &'static str {
        match (self.container, self.is_audio_only()) {
            (Container::Mp4, false) => "mp4",
            (Container::Mp4, true) => "m4a",
            (Container::WebM, false) => "webm",
            (Container::WebM, true) => "weba",
            (Container::Matroska, false) => "mkv",
            (Container::Matroska, true) => "mka",
            (Container::Ogg, false) => "ogv",
            (Container::Ogg, true) => "ogg",
        }
    }
}

impl fmt::Display for FormatCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.mime_type())
    }
}

/// The three video operations sharing the render-capture pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    BurnIn,
    Trim,
    Convert,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationKind::BurnIn => write!(f, "burn-in"),
            OperationKind::Trim => write!(f, "trim"),
            OperationKind::Convert => write!(f, "convert"),
        }
    }
}

/// Container family and layout requested by a conversion target extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConvertTarget {
    pub container: Container,
    pub audio_only: bool,
}

/// Map a target extension (with or without leading dot, any case) to its
/// container family. Unknown extensions yield `None`.
pub fn target_from_extension(ext: &str) -> Option<ConvertTarget> {
    let ext = ext.trim().trim_start_matches('.').to_ascii_lowercase();
    let (container, audio_only) = match ext.as_str() {
        "mp4" | "m4v" | "mov" => (Container::Mp4, false),
        "webm" => (Container::WebM, false),
        "mkv" => (Container::Matroska, false),
        "weba" => (Container::WebM, true),
        "ogg" | "oga" | "opus" => (Container::Ogg, true),
        "m4a" => (Container::Mp4, true),
        _ => return None,
    };
    Some(ConvertTarget {
        container,
        audio_only,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_muxed_mime_type() {
        let c = FormatCandidate::new(Container::Mp4, TrackLayout::Muxed)
            .with_video(VideoCodec::Avc1Baseline)
            .with_audio(AudioCodec::Aac);
        assert_eq!(c.mime_type(), "video/mp4;codecs=avc1.42E01E,mp4a.40.2");
        assert_eq!(c.file_extension(), "mp4");
    }

    #[test]
    fn test_audio_only_mime_has_no_video_indicator() {
        let c = FormatCandidate::new(Container::WebM, TrackLayout::AudioOnly)
            .with_video(VideoCodec::Vp8)
            .with_audio(AudioCodec::Opus);
        assert_eq!(c.mime_type(), "audio/webm;codecs=opus");
        assert!(!c.has_video());
        assert_eq!(c.file_extension(), "weba");
    }

    #[test]
    fn test_generic_container_mime() {
        let c = FormatCandidate::new(Container::WebM, TrackLayout::Muxed);
        assert_eq!(c.mime_type(), "video/webm");
    }

    #[test]
    fn test_target_from_extension() {
        let weba = target_from_extension(".WEBA").unwrap();
        assert_eq!(weba.container, Container::WebM);
        assert!(weba.audio_only);

        let mkv = target_from_extension("mkv").unwrap();
        assert_eq!(mkv.container, Container::Matroska);
        assert!(!mkv.audio_only);

        assert!(target_from_extension("avi").is_none());
    }
}
