//! Fixed genre lookup table.
//!
//! Every numeric plan parameter starts from these entries. Ranges and
//! production values are averaged with position weights (first genre counts
//! most), so the table order inside one entry never matters but the caller's
//! genre order does.

/// Tempo range and production profile for one genre.
pub struct GenreProfile {
    pub name: &'static str,
    pub bpm_lo: u32,
    pub bpm_hi: u32,
    pub energy: f32,
    pub reverb: f32,
    pub distortion: f32,
    pub drum_pattern: &'static str,
    pub bass_style: &'static str,
    pub swing: f32,
}

impl GenreProfile {
    pub fn bpm_mean(&self) -> f64 {
        (self.bpm_lo + self.bpm_hi) as f64 / 2.0
    }
}

/// BPM assumed for genres the table does not know.
pub const DEFAULT_BPM: f64 = 120.0;

/// All recognized genres. Lookup is case-insensitive on the exact name.
pub static GENRES: &[GenreProfile] = &[
    GenreProfile { name: "house",      bpm_lo: 120, bpm_hi: 128, energy: 0.70, reverb: 0.35, distortion: 0.10, drum_pattern: "four-on-the-floor", bass_style: "offbeat",   swing: 0.00 },
    GenreProfile { name: "techno",     bpm_lo: 125, bpm_hi: 140, energy: 0.80, reverb: 0.30, distortion: 0.25, drum_pattern: "four-on-the-floor", bass_style: "pulse",     swing: 0.00 },
    GenreProfile { name: "trance",     bpm_lo: 132, bpm_hi: 142, energy: 0.75, reverb: 0.50, distortion: 0.10, drum_pattern: "four-on-the-floor", bass_style: "offbeat",   swing: 0.00 },
    GenreProfile { name: "synthwave",  bpm_lo: 110, bpm_hi: 130, energy: 0.60, reverb: 0.55, distortion: 0.15, drum_pattern: "four-on-the-floor", bass_style: "pulse",     swing: 0.00 },
    GenreProfile { name: "edm",        bpm_lo: 124, bpm_hi: 132, energy: 0.85, reverb: 0.35, distortion: 0.20, drum_pattern: "four-on-the-floor", bass_style: "sub-808",   swing: 0.00 },
    GenreProfile { name: "drum-and-bass", bpm_lo: 165, bpm_hi: 178, energy: 0.90, reverb: 0.25, distortion: 0.30, drum_pattern: "dnb-syncop",    bass_style: "sub-808",   swing: 0.00 },
    GenreProfile { name: "dubstep",    bpm_lo: 138, bpm_hi: 145, energy: 0.85, reverb: 0.30, distortion: 0.45, drum_pattern: "808-grid",          bass_style: "sub-808",   swing: 0.00 },
    GenreProfile { name: "hip-hop",    bpm_lo: 80,  bpm_hi: 100, energy: 0.65, reverb: 0.25, distortion: 0.15, drum_pattern: "boom-bap",          bass_style: "sub-808",   swing: 0.15 },
    GenreProfile { name: "trap",       bpm_lo: 130, bpm_hi: 160, energy: 0.70, reverb: 0.30, distortion: 0.20, drum_pattern: "808-grid",          bass_style: "sub-808",   swing: 0.05 },
    GenreProfile { name: "lofi",       bpm_lo: 70,  bpm_hi: 90,  energy: 0.35, reverb: 0.45, distortion: 0.20, drum_pattern: "boom-bap",          bass_style: "sustained", swing: 0.25 },
    GenreProfile { name: "ambient",    bpm_lo: 60,  bpm_hi: 85,  energy: 0.20, reverb: 0.80, distortion: 0.05, drum_pattern: "four-on-the-floor", bass_style: "sustained", swing: 0.00 },
    GenreProfile { name: "jazz",       bpm_lo: 90,  bpm_hi: 140, energy: 0.50, reverb: 0.35, distortion: 0.05, drum_pattern: "boom-bap",          bass_style: "walking",   swing: 0.45 },
    GenreProfile { name: "blues",      bpm_lo: 70,  bpm_hi: 110, energy: 0.45, reverb: 0.30, distortion: 0.25, drum_pattern: "boom-bap",          bass_style: "walking",   swing: 0.40 },
    GenreProfile { name: "rock",       bpm_lo: 100, bpm_hi: 140, energy: 0.75, reverb: 0.25, distortion: 0.55, drum_pattern: "four-on-the-floor", bass_style: "pulse",     swing: 0.00 },
    GenreProfile { name: "metal",      bpm_lo: 120, bpm_hi: 180, energy: 0.95, reverb: 0.20, distortion: 0.85, drum_pattern: "four-on-the-floor", bass_style: "pulse",     swing: 0.00 },
    GenreProfile { name: "pop",        bpm_lo: 96,  bpm_hi: 124, energy: 0.65, reverb: 0.35, distortion: 0.10, drum_pattern: "four-on-the-floor", bass_style: "pulse",     swing: 0.00 },
    GenreProfile { name: "funk",       bpm_lo: 95,  bpm_hi: 115, energy: 0.70, reverb: 0.20, distortion: 0.20, drum_pattern: "boom-bap",          bass_style: "offbeat",   swing: 0.30 },
    GenreProfile { name: "cinematic",  bpm_lo: 70,  bpm_hi: 110, energy: 0.55, reverb: 0.70, distortion: 0.05, drum_pattern: "four-on-the-floor", bass_style: "sustained", swing: 0.00 },
    GenreProfile { name: "folk",       bpm_lo: 85,  bpm_hi: 115, energy: 0.40, reverb: 0.30, distortion: 0.05, drum_pattern: "boom-bap",          bass_style: "walking",   swing: 0.10 },
];

/// Case-insensitive lookup.
pub fn find(name: &str) -> Option<&'static GenreProfile> {
    GENRES
        .iter()
        .find(|g| g.name.eq_ignore_ascii_case(name.trim()))
}
