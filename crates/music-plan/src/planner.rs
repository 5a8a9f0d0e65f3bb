//! Plan derivation.
//!
//! Every choice is driven by the request seed (explicit, or the first 32
//! bits of a SHA-256 over the canonicalized request), so planning is a pure
//! function of the request.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;

use crate::genres::{self, DEFAULT_BPM};
use crate::moods::{self, Mood};
use crate::pitch;
use crate::types::{
    MusicPlan, PlanError, PlanRequest, Scale, Section, MAX_DURATION_SEC, MIN_DURATION_SEC,
};

/// Derive the planning seed from the request.
///
/// Fields are fed to the hash in a fixed order with explicit separators, so
/// the digest is a canonical fingerprint of the request: whitespace around
/// values and genre casing do not change it, reordering genres does.
pub fn derive_seed(request: &PlanRequest) -> u32 {
    let mut hasher = Sha256::new();
    hasher.update(request.prompt.trim().as_bytes());
    hasher.update([0u8]);
    for genre in &request.genres {
        hasher.update(genre.trim().to_ascii_lowercase().as_bytes());
        hasher.update([0u8]);
    }
    hasher.update(request.duration_sec.to_be_bytes());
    for artist in &request.artist_inspiration {
        hasher.update(artist.trim().as_bytes());
        hasher.update([0u8]);
    }

    let digest = hasher.finalize();
    u32::from_be_bytes([digest[0], digest[1], digest[2], digest[3]])
}

/// Derive a complete plan from a request. Same request, same plan.
pub fn plan(request: &PlanRequest) -> Result<MusicPlan, PlanError> {
    if request.prompt.trim().is_empty() {
        return Err(PlanError::EmptyPrompt);
    }
    if request.genres.is_empty() {
        return Err(PlanError::EmptyGenres);
    }
    if !(MIN_DURATION_SEC..=MAX_DURATION_SEC).contains(&request.duration_sec) {
        return Err(PlanError::DurationOutOfRange(request.duration_sec));
    }

    let seed = request.seed.unwrap_or_else(|| derive_seed(request));
    let mut rng = StdRng::seed_from_u64(seed as u64);

    let bpm = derive_bpm(&request.genres, &mut rng);

    let mood = moods::detect(&request.prompt);
    let keys = moods::keys_for(mood);
    let key = keys[seed as usize % keys.len()].to_string();

    let minor = pitch::is_minor(&key);
    let scale = derive_scale(&request.genres, minor);

    let sections = derive_sections(bpm, request.duration_sec);
    let chords = render_chords(mood, minor, &key);
    let chords_by_section: BTreeMap<String, Vec<String>> = sections
        .iter()
        .map(|s| (s.name.clone(), chords.clone()))
        .collect();

    let (energy, reverb, distortion) = derive_production(&request.genres);
    let (drum_pattern, bass_style, swing) = derive_styles(&request.genres);

    Ok(MusicPlan {
        bpm,
        key,
        scale,
        sections,
        chords_by_section,
        duration_sec: request.duration_sec,
        drum_pattern,
        bass_style,
        energy,
        reverb,
        distortion,
        swing,
        seed,
    })
}

/// Position-weighted mean of the genre bpm ranges, seeded ±5 jitter,
/// clamped to 60..=200. Unknown genres contribute the 120 default.
fn derive_bpm(genre_names: &[String], rng: &mut StdRng) -> u32 {
    let mut weighted = 0.0;
    let mut total_weight = 0.0;

    for (i, name) in genre_names.iter().enumerate() {
        let weight = 1.0 / (i as f64 + 1.0);
        let mean = genres::find(name).map(|g| g.bpm_mean()).unwrap_or(DEFAULT_BPM);
        weighted += mean * weight;
        total_weight += weight;
    }

    let mean = weighted / total_weight;
    let jitter: i32 = rng.gen_range(-5..=5);
    (mean.round() as i32 + jitter).clamp(60, 200) as u32
}

/// Scale from the key label, with genre overrides checked in request order.
fn derive_scale(genre_names: &[String], minor: bool) -> Scale {
    for name in genre_names {
        let lowered = name.trim().to_ascii_lowercase();
        match lowered.as_str() {
            "blues" | "jazz" => return Scale::Blues,
            "lofi" | "hip-hop" | "ambient" => return Scale::Pentatonic,
            _ => {}
        }
    }
    if minor {
        Scale::Minor
    } else {
        Scale::Major
    }
}

/// Section templates walked by the budget algorithm: name, bars for the
/// long/short arrangement, and whether the walk may skip it and continue.
const STRUCTURE: &[(&str, u32, u32, bool)] = &[
    ("verse", 16, 8, false),
    ("chorus", 16, 8, false),
    ("verse", 16, 8, true),
    ("chorus", 16, 8, false),
    ("bridge", 8, 8, true),
    ("breakdown", 8, 8, true),
    ("chorus", 16, 8, false),
];

const INTRO_BARS: u32 = 8;
const OUTRO_BARS: u32 = 8;

/// Greedy structure walk: intro first, then candidates in order while the
/// budget holds, outro always last even when truncated.
fn derive_sections(bpm: u32, duration_sec: u32) -> Vec<Section> {
    let bar_sec = 240.0 / bpm as f64;
    let long_form = duration_sec >= 90;

    let mut sections = vec![Section {
        name: "intro".to_string(),
        bars: INTRO_BARS,
    }];
    let mut remaining = duration_sec as f64 - INTRO_BARS as f64 * bar_sec;

    // Keep at least two bars of tail for the outro.
    let threshold = 2.0 * bar_sec;

    for &(name, long_bars, short_bars, optional) in STRUCTURE {
        let bars = if long_form { long_bars } else { short_bars };
        let cost = bars as f64 * bar_sec;

        if remaining - cost < threshold {
            if optional {
                continue;
            }
            break;
        }

        sections.push(Section {
            name: name.to_string(),
            bars,
        });
        remaining -= cost;
    }

    let outro_bars = ((remaining / bar_sec).floor() as u32).clamp(1, OUTRO_BARS);
    sections.push(Section {
        name: "outro".to_string(),
        bars: outro_bars,
    });

    sections
}

/// Render the (mood, mode) chord template against the key root.
pub fn render_chords(mood: Mood, minor: bool, key: &str) -> Vec<String> {
    let root = pitch::parse_root(key).unwrap_or(0);
    let degrees: &[u8] = if minor {
        &[0, 2, 3, 5, 7, 8, 10]
    } else {
        &[0, 2, 4, 5, 7, 9, 11]
    };

    moods::chord_template(mood, minor)
        .iter()
        .map(|chord| {
            let offset = degrees[(chord.degree as usize - 1) % degrees.len()];
            let pc = (root + offset) % 12;
            format!("{}{}", pitch::note_name(pc), chord.quality)
        })
        .collect()
}

/// Position-weighted production parameters over the known genre entries.
fn derive_production(genre_names: &[String]) -> (f32, f32, f32) {
    let mut energy = 0.0;
    let mut reverb = 0.0;
    let mut distortion = 0.0;
    let mut total_weight = 0.0;

    for (i, name) in genre_names.iter().enumerate() {
        if let Some(g) = genres::find(name) {
            let weight = 1.0 / (i as f64 + 1.0);
            energy += g.energy as f64 * weight;
            reverb += g.reverb as f64 * weight;
            distortion += g.distortion as f64 * weight;
            total_weight += weight;
        }
    }

    if total_weight == 0.0 {
        return (0.5, 0.3, 0.1);
    }

    (
        (energy / total_weight) as f32,
        (reverb / total_weight) as f32,
        (distortion / total_weight) as f32,
    )
}

/// Drum pattern, bass style, and swing from the first genre the table knows.
fn derive_styles(genre_names: &[String]) -> (String, String, f32) {
    for name in genre_names {
        if let Some(g) = genres::find(name) {
            return (
                g.drum_pattern.to_string(),
                g.bass_style.to_string(),
                g.swing,
            );
        }
    }
    ("four-on-the-floor".to_string(), "pulse".to_string(), 0.0)
}
