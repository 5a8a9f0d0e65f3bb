//! SubRip caption generation for lyric tracks.

/// Words per caption cue.
pub const WORDS_PER_CUE: usize = 6;

/// Split lyrics into cues of [`WORDS_PER_CUE`] words and distribute them
/// evenly across the track duration, SubRip-formatted.
pub fn render_srt(lyrics: &str, duration_sec: f64) -> String {
    render_srt_chunked(lyrics, duration_sec, WORDS_PER_CUE)
}

pub fn render_srt_chunked(lyrics: &str, duration_sec: f64, words_per_cue: usize) -> String {
    let words: Vec<&str> = lyrics.split_whitespace().collect();
    if words.is_empty() || duration_sec <= 0.0 {
        return String::new();
    }

    let cues: Vec<String> = words
        .chunks(words_per_cue.max(1))
        .map(|chunk| chunk.join(" "))
        .collect();
    let slot = duration_sec / cues.len() as f64;

    let mut out = String::new();
    for (i, text) in cues.iter().enumerate() {
        let start = slot * i as f64;
        let end = slot * (i + 1) as f64;
        out.push_str(&format!(
            "{}\n{} --> {}\n{}\n\n",
            i + 1,
            format_timestamp(start),
            format_timestamp(end),
            text
        ));
    }
    out
}

/// `HH:MM:SS,mmm` per the SubRip format.
pub fn format_timestamp(seconds: f64) -> String {
    let total_ms = (seconds.max(0.0) * 1000.0).round() as u64;
    let ms = total_ms % 1000;
    let total_sec = total_ms / 1000;
    let s = total_sec % 60;
    let m = (total_sec / 60) % 60;
    let h = total_sec / 3600;
    format!("{h:02}:{m:02}:{s:02},{ms:03}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn timestamps_use_comma_milliseconds() {
        assert_eq!(format_timestamp(0.0), "00:00:00,000");
        assert_eq!(format_timestamp(83.456), "00:01:23,456");
        assert_eq!(format_timestamp(3725.5), "01:02:05,500");
    }

    #[test]
    fn cues_cover_the_duration_evenly() {
        let lyrics = "one two three four five six seven eight nine ten eleven twelve";
        let srt = render_srt(lyrics, 60.0);

        let blocks: Vec<&str> = srt.trim().split("\n\n").collect();
        assert_eq!(blocks.len(), 2);
        assert!(blocks[0].contains("00:00:00,000 --> 00:00:30,000"));
        assert!(blocks[0].ends_with("one two three four five six"));
        assert!(blocks[1].contains("00:00:30,000 --> 00:01:00,000"));
    }

    #[test]
    fn short_lyrics_get_one_full_length_cue() {
        let srt = render_srt("hello world", 45.0);
        let blocks: Vec<&str> = srt.trim().split("\n\n").collect();
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].contains("00:00:00,000 --> 00:00:45,000"));
    }

    #[test]
    fn empty_lyrics_yield_empty_output() {
        assert_eq!(render_srt("   ", 60.0), "");
        assert_eq!(render_srt("words", 0.0), "");
    }

    #[test]
    fn cue_numbering_is_one_based_and_sequential() {
        let lyrics = (0..30).map(|i| format!("w{i}")).collect::<Vec<_>>().join(" ");
        let srt = render_srt(&lyrics, 30.0);
        let numbers: Vec<&str> = srt
            .trim()
            .split("\n\n")
            .map(|b| b.lines().next().unwrap())
            .collect();
        assert_eq!(numbers, ["1", "2", "3", "4", "5"]);
    }
}
