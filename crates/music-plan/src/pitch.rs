//! Note-name parsing and pitch math shared by the planner and renderer.

const NOTE_NAMES_SHARP: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];
const NOTE_NAMES_FLAT: [&str; 12] = [
    "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
];

/// Pitch classes conventionally spelled with flats.
const FLAT_ROOTS: [u8; 6] = [1, 3, 5, 6, 8, 10]; // Db, Eb, F, Gb, Ab, Bb

/// Spell a pitch class as a note name, preferring conventional flats.
pub fn note_name(pitch_class: u8) -> &'static str {
    let idx = (pitch_class % 12) as usize;
    if FLAT_ROOTS.contains(&(idx as u8)) {
        NOTE_NAMES_FLAT[idx]
    } else {
        NOTE_NAMES_SHARP[idx]
    }
}

/// Parse the root note of a key label like `"A minor"` or `"Db major"`.
pub fn parse_root(key: &str) -> Option<u8> {
    let name = key.split_whitespace().next()?;
    NOTE_NAMES_SHARP
        .iter()
        .position(|n| *n == name)
        .or_else(|| NOTE_NAMES_FLAT.iter().position(|n| *n == name))
        .map(|idx| idx as u8)
}

/// Whether a key label names a minor key.
pub fn is_minor(key: &str) -> bool {
    key.to_ascii_lowercase().contains("minor")
}

/// Equal-temperament frequency for a pitch class at an octave
/// (A4 = 440 Hz, octave 4 holds middle C).
pub fn frequency_hz(pitch_class: u8, octave: i32) -> f64 {
    let midi = midi_note(pitch_class, octave) as f64;
    440.0 * 2f64.powf((midi - 69.0) / 12.0)
}

/// MIDI note number for a pitch class at an octave.
pub fn midi_note(pitch_class: u8, octave: i32) -> u8 {
    let n = (octave + 1) * 12 + (pitch_class % 12) as i32;
    n.clamp(0, 127) as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_sharp_and_flat_roots() {
        assert_eq!(parse_root("A minor"), Some(9));
        assert_eq!(parse_root("Db major"), Some(1));
        assert_eq!(parse_root("F# minor"), Some(6));
        assert_eq!(parse_root("H major"), None);
    }

    #[test]
    fn minor_detection_reads_the_label() {
        assert!(is_minor("A minor"));
        assert!(!is_minor("C major"));
    }

    #[test]
    fn a4_is_440() {
        assert!((frequency_hz(9, 4) - 440.0).abs() < 1e-9);
    }

    #[test]
    fn middle_c_is_midi_60() {
        assert_eq!(midi_note(0, 4), 60);
    }

    #[test]
    fn flat_spelling_for_conventional_roots() {
        assert_eq!(note_name(10), "Bb");
        assert_eq!(note_name(7), "G");
    }
}
