//! Output format negotiation.
//!
//! Each operation has an ordered candidate ladder. The host capability is
//! queried in order and the first supported candidate wins. Muxed mp4
//! variants come before webm for burn-in and trim: broad playback
//! compatibility matters more than which candidate is found first.

use clipforge_common::error::{ClipforgeError, ClipforgeResult};
use clipforge_media_model::{
    target_from_extension, AudioCodec, Container, ConvertTarget, FormatCandidate, OperationKind,
    TrackLayout, VideoCodec,
};

use crate::host::EncodeCapability;

fn muxed(container: Container) -> FormatCandidate {
    FormatCandidate::new(container, TrackLayout::Muxed)
}

fn video_only(container: Container) -> FormatCandidate {
    FormatCandidate::new(container, TrackLayout::VideoOnly)
}

fn audio_only(container: Container) -> FormatCandidate {
    FormatCandidate::new(container, TrackLayout::AudioOnly)
}

/// Candidates of one container family, most specific first.
fn family_ladder(container: Container, layout: TrackLayout) -> Vec<FormatCandidate> {
    match (container, layout) {
        (Container::Mp4, TrackLayout::Muxed) => vec![
            muxed(Container::Mp4)
                .with_video(VideoCodec::Avc1Baseline)
                .with_audio(AudioCodec::Aac),
            muxed(Container::Mp4)
                .with_video(VideoCodec::Avc1)
                .with_audio(AudioCodec::Opus),
            muxed(Container::Mp4),
        ],
        (Container::Mp4, TrackLayout::VideoOnly) => vec![
            video_only(Container::Mp4).with_video(VideoCodec::Avc1),
            video_only(Container::Mp4),
        ],
        (Container::Mp4, TrackLayout::AudioOnly) => vec![
            audio_only(Container::Mp4).with_audio(AudioCodec::Aac),
            audio_only(Container::Mp4),
        ],
        (Container::WebM, TrackLayout::Muxed) => vec![
            muxed(Container::WebM)
                .with_video(VideoCodec::Vp9)
                .with_audio(AudioCodec::Opus),
            muxed(Container::WebM)
                .with_video(VideoCodec::Vp8)
                .with_audio(AudioCodec::Opus),
            muxed(Container::WebM),
        ],
        (Container::WebM, TrackLayout::VideoOnly) => vec![
            video_only(Container::WebM).with_video(VideoCodec::Vp9),
            video_only(Container::WebM).with_video(VideoCodec::Vp8),
            video_only(Container::WebM),
        ],
        (Container::WebM, TrackLayout::AudioOnly) => vec![
            audio_only(Container::WebM).with_audio(AudioCodec::Opus),
            audio_only(Container::WebM),
        ],
        (Container::Matroska, TrackLayout::Muxed) => vec![
            muxed(Container::Matroska)
                .with_video(VideoCodec::Avc1)
                .with_audio(AudioCodec::Opus),
            muxed(Container::Matroska)
                .with_video(VideoCodec::Vp9)
                .with_audio(AudioCodec::Opus),
            muxed(Container::Matroska),
        ],
        (Container::Matroska, TrackLayout::VideoOnly) => vec![
            video_only(Container::Matroska).with_video(VideoCodec::Avc1),
            video_only(Container::Matroska),
        ],
        (Container::Matroska, TrackLayout::AudioOnly) => vec![
            audio_only(Container::Matroska).with_audio(AudioCodec::Opus),
            audio_only(Container::Matroska),
        ],
        (Container::Ogg, TrackLayout::AudioOnly) => vec![
            audio_only(Container::Ogg).with_audio(AudioCodec::Opus),
            audio_only(Container::Ogg),
        ],
        // Theora-only video; no extension asks for it today.
        (Container::Ogg, layout) => vec![FormatCandidate::new(Container::Ogg, layout)],
    }
}

/// Ladder used for burn-in and trim outputs.
fn default_ladder(layout: TrackLayout) -> Vec<FormatCandidate> {
    match layout {
        TrackLayout::AudioOnly => {
            let mut ladder = family_ladder(Container::WebM, TrackLayout::AudioOnly);
            ladder.push(audio_only(Container::Ogg).with_audio(AudioCodec::Opus));
            ladder.push(audio_only(Container::Mp4));
            ladder
        }
        layout => {
            let mut ladder = family_ladder(Container::Mp4, layout);
            ladder.extend(family_ladder(Container::WebM, layout));
            ladder
        }
    }
}

/// The ordered candidates for an operation.
///
/// `target_ext` is only consulted for conversions. A silent source produces
/// video-only candidates.
pub fn candidate_ladder(
    kind: OperationKind,
    target_ext: Option<&str>,
    source_has_audio: bool,
) -> Vec<FormatCandidate> {
    let av_layout = if source_has_audio {
        TrackLayout::Muxed
    } else {
        TrackLayout::VideoOnly
    };

    match kind {
        OperationKind::BurnIn | OperationKind::Trim => default_ladder(av_layout),
        OperationKind::Convert => {
            let target = target_ext.and_then(target_from_extension);
            match target {
                Some(ConvertTarget {
                    container,
                    audio_only: true,
                }) => {
                    let mut ladder = family_ladder(container, TrackLayout::AudioOnly);
                    push_unique(
                        &mut ladder,
                        family_ladder(Container::WebM, TrackLayout::AudioOnly),
                    );
                    ladder
                }
                Some(ConvertTarget { container, .. }) => {
                    let mut ladder = family_ladder(container, av_layout);
                    push_unique(&mut ladder, family_ladder(Container::WebM, av_layout));
                    ladder
                }
                None => family_ladder(Container::WebM, av_layout),
            }
        }
    }
}

fn push_unique(ladder: &mut Vec<FormatCandidate>, more: Vec<FormatCandidate>) {
    for candidate in more {
        if !ladder.contains(&candidate) {
            ladder.push(candidate);
        }
    }
}

/// Pick the first candidate the host can encode.
pub fn negotiate(
    kind: OperationKind,
    target_ext: Option<&str>,
    source_has_audio: bool,
    capability: &dyn EncodeCapability,
) -> ClipforgeResult<FormatCandidate> {
    let ladder = candidate_ladder(kind, target_ext, source_has_audio);
    for candidate in &ladder {
        let supported = capability.can_encode(candidate);
        tracing::debug!(
            operation = %kind,
            candidate = %candidate,
            supported,
            "Format candidate checked"
        );
        if supported {
            tracing::info!(operation = %kind, format = %candidate, "Negotiated output format");
            return Ok(*candidate);
        }
    }

    let target = match (kind, target_ext) {
        (OperationKind::Convert, Some(ext)) => ext.trim_start_matches('.').to_string(),
        _ => format!("{kind} output (mp4 or webm)"),
    };
    tracing::warn!(%target, tried = ladder.len(), "No supported output format");
    Err(ClipforgeError::unsupported_format(target))
}
