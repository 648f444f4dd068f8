//! Caption cues and cue tracks.
//!
//! Cues may be edited out of order, so lookups compare times by value
//! instead of relying on list position. Overlapping cues are tolerated:
//! the first match in list order wins.

use serde::{Deserialize, Serialize};

use crate::error::MediaModelError;

/// One timed caption entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cue {
    /// Ordering hint; not required to be unique.
    pub id: u32,

    /// Start time in seconds.
    #[serde(alias = "startTime")]
    pub start_secs: f64,

    /// End time in seconds.
    #[serde(alias = "endTime")]
    pub end_secs: f64,

    /// Caption text, possibly multi-line.
    pub text: String,
}

impl Cue {
    pub fn new(id: u32, start_secs: f64, end_secs: f64, text: impl Into<String>) -> Self {
        Self {
            id,
            start_secs,
            end_secs,
            text: text.into(),
        }
    }

    /// Whether this cue is visible at time `t` (both bounds inclusive).
    pub fn is_active_at(&self, t: f64) -> bool {
        t >= self.start_secs && t <= self.end_secs
    }

    pub fn duration_secs(&self) -> f64 {
        (self.end_secs - self.start_secs).max(0.0)
    }

    /// Check `0 <= start < end`.
    pub fn validate(&self) -> Result<(), MediaModelError> {
        if !self.start_secs.is_finite() || !self.end_secs.is_finite() {
            return Err(MediaModelError::InvalidCue {
                id: self.id,
                message: "cue times must be finite".to_string(),
            });
        }
        if self.start_secs < 0.0 {
            return Err(MediaModelError::InvalidCue {
                id: self.id,
                message: format!("start {:.3}s is negative", self.start_secs),
            });
        }
        if self.end_secs <= self.start_secs {
            return Err(MediaModelError::InvalidCue {
                id: self.id,
                message: format!(
                    "end {:.3}s is not after start {:.3}s",
                    self.end_secs, self.start_secs
                ),
            });
        }
        Ok(())
    }
}

/// An ordered collection of cues.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CueTrack {
    cues: Vec<Cue>,
}

impl CueTrack {
    pub fn new(cues: Vec<Cue>) -> Self {
        Self { cues }
    }

    /// Parse a JSON array of cues and validate each one.
    pub fn from_json(json: &str) -> Result<Self, MediaModelError> {
        let track: Self = serde_json::from_str(json)?;
        for cue in &track.cues {
            cue.validate()?;
        }
        Ok(track)
    }

    /// The cue visible at time `t`, if any. First match in list order.
    pub fn active_at(&self, t: f64) -> Option<&Cue> {
        self.cues.iter().find(|cue| cue.is_active_at(t))
    }

    pub fn cues(&self) -> &[Cue] {
        &self.cues
    }

    pub fn push(&mut self, cue: Cue) {
        self.cues.push(cue);
    }

    pub fn len(&self) -> usize {
        self.cues.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cues.is_empty()
    }

    /// Pairs of cue ids whose time ranges overlap.
    ///
    /// Overlaps render fine (first match wins) but usually indicate an
    /// editing mistake worth surfacing.
    pub fn overlaps(&self) -> Vec<(u32, u32)> {
        let mut pairs = Vec::new();
        for (i, a) in self.cues.iter().enumerate() {
            for b in &self.cues[i + 1..] {
                if a.start_secs < b.end_secs && b.start_secs < a.end_secs {
                    pairs.push((a.id, b.id));
                }
            }
        }
        pairs
    }

    /// Last end time across all cues.
    pub fn end_secs(&self) -> f64 {
        self.cues.iter().map(|c| c.end_secs).fold(0.0, f64::max)
    }
}

impl From<Vec<Cue>> for CueTrack {
    fn from(cues: Vec<Cue>) -> Self {
        Self::new(cues)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_boundary_resolves_to_first_in_list_order() {
        let track = CueTrack::new(vec![
            Cue::new(1, 0.0, 2.0, "first"),
            Cue::new(2, 2.0, 4.0, "second"),
        ]);
        assert_eq!(track.active_at(2.0).unwrap().text, "first");

        let reversed = CueTrack::new(vec![
            Cue::new(2, 2.0, 4.0, "second"),
            Cue::new(1, 0.0, 2.0, "first"),
        ]);
        assert_eq!(reversed.active_at(2.0).unwrap().text, "second");
    }

    #[test]
    fn test_lookup_is_by_value_not_index() {
        let track = CueTrack::new(vec![
            Cue::new(3, 10.0, 12.0, "late"),
            Cue::new(1, 1.0, 3.0, "early"),
        ]);
        assert_eq!(track.active_at(1.5).unwrap().id, 1);
        assert_eq!(track.active_at(11.0).unwrap().id, 3);
        assert!(track.active_at(5.0).is_none());
    }

    #[test]
    fn test_overlapping_cues_do_not_panic() {
        let track = CueTrack::new(vec![
            Cue::new(1, 0.0, 5.0, "a"),
            Cue::new(2, 1.0, 3.0, "b"),
        ]);
        assert_eq!(track.active_at(2.0).unwrap().id, 1);
        assert_eq!(track.overlaps(), vec![(1, 2)]);
    }

    #[test]
    fn test_from_json_accepts_camel_case_times() {
        let json = r#"[{"id":1,"startTime":0.5,"endTime":1.5,"text":"Hello\nworld"}]"#;
        let track = CueTrack::from_json(json).unwrap();
        assert_eq!(track.len(), 1);
        assert_eq!(track.cues()[0].start_secs, 0.5);
        assert!(track.cues()[0].text.contains('\n'));
    }

    #[test]
    fn test_from_json_rejects_inverted_cue() {
        let json = r#"[{"id":7,"start_secs":3.0,"end_secs":1.0,"text":"x"}]"#;
        let err = CueTrack::from_json(json).unwrap_err();
        assert!(err.to_string().contains("cue 7"));
    }
}
