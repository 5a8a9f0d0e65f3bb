//! Mood detection tables: prompt keywords, key lists, chord grids.

/// Detected emotional register of a prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mood {
    Uplifting,
    Melancholic,
    Aggressive,
    Dreamy,
    Cinematic,
    Dark,
    Chill,
}

impl Mood {
    pub fn as_str(self) -> &'static str {
        match self {
            Mood::Uplifting => "uplifting",
            Mood::Melancholic => "melancholic",
            Mood::Aggressive => "aggressive",
            Mood::Dreamy => "dreamy",
            Mood::Cinematic => "cinematic",
            Mood::Dark => "dark",
            Mood::Chill => "chill",
        }
    }
}

/// Keyword table, checked in order; the first mood with a hit wins.
static MOOD_KEYWORDS: &[(Mood, &[&str])] = &[
    (Mood::Uplifting, &["happy", "uplifting", "joy", "bright", "euphoric", "sunny", "hopeful", "celebrate"]),
    (Mood::Melancholic, &["sad", "melancholic", "melancholy", "longing", "rain", "goodbye", "lonely", "tears"]),
    (Mood::Aggressive, &["aggressive", "angry", "rage", "hard", "brutal", "fight", "intense", "heavy"]),
    (Mood::Dreamy, &["dreamy", "dream", "floating", "ethereal", "hazy", "nostalgic", "wistful", "drift"]),
    (Mood::Cinematic, &["cinematic", "epic", "soundtrack", "orchestral", "trailer", "heroic", "vast"]),
    (Mood::Dark, &["dark", "night", "shadow", "haunting", "sinister", "cold", "void", "eerie"]),
    (Mood::Chill, &["chill", "relax", "calm", "mellow", "smooth", "laid-back", "easy", "lounge"]),
];

/// Detect a prompt's mood by keyword match. Default is chill.
pub fn detect(prompt: &str) -> Mood {
    let lowered = prompt.to_ascii_lowercase();
    for (mood, words) in MOOD_KEYWORDS {
        if words.iter().any(|w| lowered.contains(w)) {
            return *mood;
        }
    }
    Mood::Chill
}

/// Candidate keys per mood; selected with `seed % len`.
pub fn keys_for(mood: Mood) -> &'static [&'static str] {
    match mood {
        Mood::Uplifting => &["C major", "G major", "D major", "A major", "E major"],
        Mood::Melancholic => &["A minor", "D minor", "E minor", "B minor", "F# minor"],
        Mood::Aggressive => &["E minor", "A minor", "D minor", "G minor"],
        Mood::Dreamy => &["C major", "F major", "A major", "Eb major", "G major"],
        Mood::Cinematic => &["D minor", "C minor", "G minor", "Eb major"],
        Mood::Dark => &["C minor", "F minor", "G# minor", "Bb minor"],
        Mood::Chill => &["C major", "A minor", "F major", "G major", "D minor"],
    }
}

/// One chord in a degree template: scale degree (1-based) plus a literal
/// quality suffix.
pub struct ChordDegree {
    pub degree: u8,
    pub quality: &'static str,
}

macro_rules! d {
    ($degree:expr, $quality:expr) => {
        ChordDegree { degree: $degree, quality: $quality }
    };
}

/// Chord grid template by (mood, minor-mode).
///
/// Degrees are rendered against the plan's key root; the same template
/// applies to every section of the arrangement.
pub fn chord_template(mood: Mood, minor: bool) -> &'static [ChordDegree] {
    match (mood, minor) {
        (Mood::Uplifting, false) => &[d!(1, ""), d!(5, ""), d!(6, "m"), d!(4, "")],
        (Mood::Uplifting, true) => &[d!(1, "m"), d!(6, ""), d!(3, ""), d!(7, "")],
        (Mood::Melancholic, false) => &[d!(6, "m"), d!(4, ""), d!(1, ""), d!(5, "")],
        (Mood::Melancholic, true) => &[d!(1, "m"), d!(4, "m"), d!(6, ""), d!(5, "m")],
        (Mood::Aggressive, false) => &[d!(1, "5"), d!(4, "5"), d!(6, "5"), d!(5, "5")],
        (Mood::Aggressive, true) => &[d!(1, "5"), d!(6, "5"), d!(7, "5"), d!(1, "5")],
        (Mood::Dreamy, false) => &[d!(1, "maj7"), d!(6, "m7"), d!(4, "maj7"), d!(5, "")],
        (Mood::Dreamy, true) => &[d!(1, "m7"), d!(4, "m7"), d!(6, "maj7"), d!(7, "")],
        (Mood::Cinematic, false) => &[d!(1, ""), d!(4, ""), d!(6, "m"), d!(5, "sus4")],
        (Mood::Cinematic, true) => &[d!(1, "m"), d!(6, ""), d!(4, "m"), d!(5, "")],
        (Mood::Dark, false) => &[d!(1, "m"), d!(2, "dim"), d!(4, "m"), d!(5, "m")],
        (Mood::Dark, true) => &[d!(1, "m"), d!(2, "dim"), d!(6, ""), d!(5, "m")],
        (Mood::Chill, false) => &[d!(1, "maj7"), d!(4, "maj7"), d!(2, "m7"), d!(5, "7")],
        (Mood::Chill, true) => &[d!(1, "m7"), d!(4, "7"), d!(6, "maj7"), d!(5, "m7")],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keyword_hit_picks_the_first_table_entry() {
        // "dark rain" hits melancholic ("rain") before dark in table order.
        assert_eq!(detect("dark rain on the window"), Mood::Melancholic);
        assert_eq!(detect("dreamy synthwave nights"), Mood::Dreamy);
    }

    #[test]
    fn unmatched_prompt_defaults_to_chill() {
        assert_eq!(detect("four chords and the truth"), Mood::Chill);
    }

    #[test]
    fn every_mood_has_keys_and_chords() {
        for mood in [
            Mood::Uplifting,
            Mood::Melancholic,
            Mood::Aggressive,
            Mood::Dreamy,
            Mood::Cinematic,
            Mood::Dark,
            Mood::Chill,
        ] {
            assert!(!keys_for(mood).is_empty());
            assert!(!chord_template(mood, false).is_empty());
            assert!(!chord_template(mood, true).is_empty());
        }
    }
}
