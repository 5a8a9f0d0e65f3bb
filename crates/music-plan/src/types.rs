//! Plan and event value types.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Shortest and longest track the planner will accept, seconds.
pub const MIN_DURATION_SEC: u32 = 30;
pub const MAX_DURATION_SEC: u32 = 120;

/// Planner input, a subset of the generation request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PlanRequest {
    pub prompt: String,
    pub genres: Vec<String>,
    pub duration_sec: u32,
    #[serde(default)]
    pub artist_inspiration: Vec<String>,
    /// Explicit seed; derived from the request hash when absent.
    #[serde(default)]
    pub seed: Option<u32>,
}

/// Melodic scale for the plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    Major,
    Minor,
    Blues,
    Pentatonic,
}

impl Scale {
    /// Whether the underlying tonality is minor (drives chord spelling).
    pub fn is_minor_mode(self) -> bool {
        matches!(self, Scale::Minor)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Scale::Major => "major",
            Scale::Minor => "minor",
            Scale::Blues => "blues",
            Scale::Pentatonic => "pentatonic",
        }
    }
}

/// One section of the arrangement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub name: String,
    pub bars: u32,
}

/// A fully derived plan. Same request, same plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MusicPlan {
    pub bpm: u32,
    /// Key label, e.g. `"A minor"`.
    pub key: String,
    pub scale: Scale,
    pub sections: Vec<Section>,
    /// Section name to chord symbols. BTreeMap keeps the encoding stable.
    pub chords_by_section: BTreeMap<String, Vec<String>>,
    pub duration_sec: u32,
    pub drum_pattern: String,
    pub bass_style: String,
    pub energy: f32,
    pub reverb: f32,
    pub distortion: f32,
    /// Swing amount 0..1 applied to off-beat eighths.
    pub swing: f32,
    /// The seed every choice above was drawn from.
    pub seed: u32,
}

impl MusicPlan {
    /// Root pitch class of the plan's key (0 = C).
    pub fn root_pitch_class(&self) -> u8 {
        crate::pitch::parse_root(&self.key).unwrap_or(0)
    }

    /// Root frequency in Hz at the given octave (octave 4 holds middle C).
    pub fn root_frequency_hz(&self, octave: i32) -> f64 {
        crate::pitch::frequency_hz(self.root_pitch_class(), octave)
    }
}

/// What a sequenced event triggers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Kick,
    Snare,
    Hat,
    Bass,
    Lead,
}

impl EventKind {
    pub const ALL: [EventKind; 5] = [
        EventKind::Kick,
        EventKind::Snare,
        EventKind::Hat,
        EventKind::Bass,
        EventKind::Lead,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Kick => "kick",
            EventKind::Snare => "snare",
            EventKind::Hat => "hat",
            EventKind::Bass => "bass",
            EventKind::Lead => "lead",
        }
    }
}

/// One placed one-shot. Ordered by `t_sec`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub t_sec: f64,
    pub kind: EventKind,
    /// MIDI pitch for pitched stems; drums leave this empty.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pitch: Option<u8>,
}

/// Planning failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PlanError {
    #[error("prompt must not be empty")]
    EmptyPrompt,

    #[error("at least one genre is required")]
    EmptyGenres,

    #[error("duration {0}s outside {MIN_DURATION_SEC}..={MAX_DURATION_SEC}")]
    DurationOutOfRange(u32),
}
