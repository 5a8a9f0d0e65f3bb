//! Argument-vector builders for every transcoder invocation.
//!
//! All builders are pure: paths and plan values in, argv out. Nothing here
//! touches a shell - the gateway passes these vectors straight to the child
//! process. Filter coefficients live here so the renderer stays a plain
//! sequencing loop.

use std::path::Path;

use music_plan::{EventKind, MusicPlan};

/// Audio sample rate for everything we produce.
pub const SAMPLE_RATE: u32 = 44_100;

/// Mix weights: drums 0.9, hats 0.7, bass 0.7, lead 0.7.
pub fn stem_weight(kind: EventKind) -> f32 {
    match kind {
        EventKind::Kick | EventKind::Snare => 0.9,
        EventKind::Hat | EventKind::Bass | EventKind::Lead => 0.7,
    }
}

/// Weight at which synthesized vocals join the mastered mix.
pub const VOCAL_WEIGHT: f32 = 0.6;

/// Limiter ceiling of -1 dBTP as a linear gain.
const LIMITER_CEILING: &str = "0.891";

fn arg(s: impl Into<String>) -> String {
    s.into()
}

fn path_arg(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

/// Common leading arguments. Stats stay enabled - the gateway parses the
/// `time=` lines they produce.
fn base_args() -> Vec<String> {
    vec![arg("-hide_banner"), arg("-y")]
}

fn mono_wav_output(out: &Path) -> Vec<String> {
    vec![
        arg("-ar"),
        SAMPLE_RATE.to_string(),
        arg("-ac"),
        arg("1"),
        arg("-c:a"),
        arg("pcm_s16le"),
        path_arg(out),
    ]
}

fn stereo_wav_output(out: &Path) -> Vec<String> {
    vec![
        arg("-ar"),
        SAMPLE_RATE.to_string(),
        arg("-ac"),
        arg("2"),
        arg("-c:a"),
        arg("pcm_s16le"),
        path_arg(out),
    ]
}

// ---------------------------------------------------------------------------
// One-shot synthesis
// ---------------------------------------------------------------------------

/// Synthesis graph for one stem's instrument sample (< 250 ms).
///
/// Drums are fixed; bass and lead follow the plan's key root.
pub fn oneshot_args(kind: EventKind, plan: &MusicPlan, out: &Path) -> Vec<String> {
    let (source, filter) = match kind {
        EventKind::Kick => (
            "sine=frequency=55:duration=0.25".to_string(),
            "afade=t=in:st=0:d=0.005,afade=t=out:st=0.05:d=0.2,lowpass=f=150".to_string(),
        ),
        EventKind::Snare => (
            "anoisesrc=duration=0.2:color=pink:amplitude=0.8".to_string(),
            "highpass=f=200,lowpass=f=6000,afade=t=out:st=0.02:d=0.18".to_string(),
        ),
        EventKind::Hat => (
            "anoisesrc=duration=0.08:color=white:amplitude=0.6".to_string(),
            "highpass=f=8000,afade=t=out:st=0.01:d=0.07".to_string(),
        ),
        EventKind::Bass => (
            format!(
                "sine=frequency={:.2}:duration=0.24",
                plan.root_frequency_hz(2)
            ),
            "afade=t=in:st=0:d=0.005,afade=t=out:st=0.12:d=0.12,lowpass=f=400".to_string(),
        ),
        EventKind::Lead => (
            format!(
                "sine=frequency={:.2}:duration=0.12",
                plan.root_frequency_hz(4)
            ),
            "vibrato=f=6:d=0.2,afade=t=out:st=0.04:d=0.08".to_string(),
        ),
    };

    let mut args = base_args();
    args.extend([
        arg("-f"),
        arg("lavfi"),
        arg("-i"),
        source,
        arg("-af"),
        filter,
    ]);
    args.extend(mono_wav_output(out));
    args
}

// ---------------------------------------------------------------------------
// Stem assembly
// ---------------------------------------------------------------------------

/// One entry in a stem's concat sequence.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Slot {
    /// Silence of this length (seconds).
    Silence { len: f64 },
    /// The one-shot, padded or trimmed to this length.
    Shot { len: f64 },
}

impl Slot {
    pub fn len(&self) -> f64 {
        match self {
            Slot::Silence { len } | Slot::Shot { len } => *len,
        }
    }
}

/// Turn one stem's event onsets into a gapless slot sequence covering the
/// whole track. Slot lengths are rounded to the millisecond so identical
/// gaps share one rendered segment file.
pub fn plan_slots(onsets: &[f64], duration_sec: f64) -> Vec<Slot> {
    const EPSILON: f64 = 1e-3;

    let round = |len: f64| (len * 1000.0).round() / 1000.0;
    let mut slots = Vec::new();

    if onsets.is_empty() {
        return vec![Slot::Silence {
            len: round(duration_sec),
        }];
    }

    if onsets[0] > EPSILON {
        slots.push(Slot::Silence {
            len: round(onsets[0]),
        });
    }

    for (i, &t) in onsets.iter().enumerate() {
        let end = onsets.get(i + 1).copied().unwrap_or(duration_sec);
        let len = round(end - t);
        if len > EPSILON {
            slots.push(Slot::Shot { len });
        }
    }

    slots
}

/// Pad-or-trim the one-shot to an exact slot length.
pub fn segment_args(oneshot: &Path, len: f64, out: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        arg("-i"),
        path_arg(oneshot),
        arg("-af"),
        format!("apad=whole_dur={len:.3},atrim=end={len:.3}"),
    ]);
    args.extend(mono_wav_output(out));
    args
}

/// A silence segment of the given length.
pub fn silence_args(len: f64, out: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        arg("-f"),
        arg("lavfi"),
        arg("-i"),
        format!("anullsrc=r={SAMPLE_RATE}:cl=mono"),
        arg("-t"),
        format!("{len:.3}"),
    ]);
    args.extend(mono_wav_output(out));
    args
}

/// Concat demuxer list body for a segment sequence.
///
/// Single quotes in paths are escaped the way the demuxer expects; the
/// renderer only ever feeds scratch-dir paths here.
pub fn concat_list(segments: &[&Path]) -> String {
    let mut out = String::new();
    for path in segments {
        let quoted = path.to_string_lossy().replace('\'', "'\\''");
        out.push_str(&format!("file '{quoted}'\n"));
    }
    out
}

/// Concatenate segments into the full-length mono stem.
pub fn concat_args(list: &Path, duration_sec: f64, out: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        arg("-f"),
        arg("concat"),
        arg("-safe"),
        arg("0"),
        arg("-i"),
        path_arg(list),
        arg("-af"),
        format!("apad=whole_dur={duration_sec:.3}"),
        arg("-t"),
        format!("{duration_sec:.3}"),
    ]);
    args.extend(mono_wav_output(out));
    args
}

// ---------------------------------------------------------------------------
// Mixing and mastering
// ---------------------------------------------------------------------------

/// Preview mix: all stems at equal weight plus dynamic range normalization.
pub fn preview_args(stems: &[&Path], out: &Path) -> Vec<String> {
    let mut args = base_args();
    for stem in stems {
        args.extend([arg("-i"), path_arg(stem)]);
    }

    let filter = format!(
        "amix=inputs={}:duration=longest:normalize=1,dynaudnorm[p]",
        stems.len()
    );
    args.extend([
        arg("-filter_complex"),
        filter,
        arg("-map"),
        arg("[p]"),
    ]);
    args.extend(stereo_wav_output(out));
    args
}

/// Mastered mix: weighted stems, -1 dBTP limiter, dynamic normalization,
/// then loudness normalization to -14 LUFS (LRA 11).
pub fn master_args(stems: &[(EventKind, &Path)], out: &Path) -> Vec<String> {
    let mut args = base_args();
    for (_, path) in stems {
        args.extend([arg("-i"), path_arg(path)]);
    }

    let mut filter = String::new();
    let mut labels = String::new();
    for (i, (kind, _)) in stems.iter().enumerate() {
        filter.push_str(&format!(
            "[{i}:a]volume={:.2}[s{i}];",
            stem_weight(*kind)
        ));
        labels.push_str(&format!("[s{i}]"));
    }
    filter.push_str(&format!(
        "{labels}amix=inputs={}:duration=longest:normalize=0,\
         alimiter=limit={LIMITER_CEILING},dynaudnorm=f=150:g=15,\
         loudnorm=I=-14:LRA=11:TP=-1[m]",
        stems.len()
    ));

    args.extend([
        arg("-filter_complex"),
        filter,
        arg("-map"),
        arg("[m]"),
    ]);
    args.extend(stereo_wav_output(out));
    args
}

/// Fold synthesized vocals into an existing master at [`VOCAL_WEIGHT`],
/// re-limiting afterwards.
pub fn mix_vocals_args(master: &Path, vocals: &Path, out: &Path) -> Vec<String> {
    let mut args = base_args();
    args.extend([
        arg("-i"),
        path_arg(master),
        arg("-i"),
        path_arg(vocals),
        arg("-filter_complex"),
        format!(
            "[1:a]volume={VOCAL_WEIGHT}[v];\
             [0:a][v]amix=inputs=2:duration=first:normalize=0,\
             alimiter=limit={LIMITER_CEILING}[m]"
        ),
        arg("-map"),
        arg("[m]"),
    ]);
    args.extend(stereo_wav_output(out));
    args
}

// ---------------------------------------------------------------------------
// Vocals
// ---------------------------------------------------------------------------

/// Vocal-like signal: a vibrato carrier at the key root (octave 3) split
/// through three formant band-passes, with a slow tremolo for syllabic
/// motion. Duration matches the track.
pub fn vocals_args(plan: &MusicPlan, out: &Path) -> Vec<String> {
    let freq = plan.root_frequency_hz(3);
    let duration = plan.duration_sec;

    let mut args = base_args();
    args.extend([
        arg("-f"),
        arg("lavfi"),
        arg("-i"),
        format!("sine=frequency={freq:.2}:duration={duration}"),
        arg("-filter_complex"),
        "[0:a]vibrato=f=5.5:d=0.4,asplit=3[c0][c1][c2];\
         [c0]bandpass=frequency=800:width_type=h:width=120[f0];\
         [c1]bandpass=frequency=1150:width_type=h:width=150[f1];\
         [c2]bandpass=frequency=2900:width_type=h:width=400[f2];\
         [f0][f1][f2]amix=inputs=3:normalize=0,tremolo=f=2.1:d=0.6[v]"
            .to_string(),
        arg("-map"),
        arg("[v]"),
    ]);
    args.extend(mono_wav_output(out));
    args
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// Requested visualizer style.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoStyle {
    /// Subtitle-overlay lyric video.
    Lyric,
    /// Spectrum visualizer.
    Spectrum,
    /// Waveform visualizer.
    Waveform,
}

impl VideoStyle {
    /// Map the request labels onto styles.
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "Lyric Video" => Some(Self::Lyric),
            "Official Music Video" => Some(Self::Spectrum),
            "Abstract Visualizer" => Some(Self::Waveform),
            _ => None,
        }
    }
}

fn h264_output(out: &Path) -> Vec<String> {
    vec![
        arg("-c:v"),
        arg("libx264"),
        arg("-profile:v"),
        arg("main"),
        arg("-pix_fmt"),
        arg("yuv420p"),
        arg("-r"),
        arg("30"),
        arg("-c:a"),
        arg("aac"),
        arg("-b:a"),
        arg("192k"),
        arg("-shortest"),
        path_arg(out),
    ]
}

/// Escape a path for use inside a filter argument (subtitles=).
fn escape_filter_path(path: &Path) -> String {
    path.to_string_lossy()
        .replace('\\', "\\\\")
        .replace(':', "\\:")
        .replace('\'', "\\'")
}

/// Render the final 1280x720 @ 30fps H.264/AAC video.
///
/// The lyric style requires captions; the visualizer styles ignore them.
pub fn video_args(
    style: VideoStyle,
    mix: &Path,
    captions: Option<&Path>,
    duration_sec: u32,
    out: &Path,
) -> Vec<String> {
    let mut args = base_args();

    match style {
        VideoStyle::Lyric => {
            args.extend([
                arg("-f"),
                arg("lavfi"),
                arg("-i"),
                format!("color=c=0x0b0b17:s=1280x720:r=30:d={duration_sec}"),
                arg("-i"),
                path_arg(mix),
            ]);
            if let Some(srt) = captions {
                args.extend([
                    arg("-vf"),
                    format!("subtitles={}", escape_filter_path(srt)),
                ]);
            }
            args.extend([arg("-map"), arg("0:v"), arg("-map"), arg("1:a")]);
        }
        VideoStyle::Spectrum => {
            args.extend([
                arg("-i"),
                path_arg(mix),
                arg("-filter_complex"),
                "[0:a]showspectrum=s=1280x720:mode=combined:color=intensity:\
                 scale=log:slide=scroll,fps=30,format=yuv420p[v]"
                    .to_string(),
                arg("-map"),
                arg("[v]"),
                arg("-map"),
                arg("0:a"),
            ]);
        }
        VideoStyle::Waveform => {
            args.extend([
                arg("-i"),
                path_arg(mix),
                arg("-filter_complex"),
                "[0:a]showwaves=s=1280x720:mode=cline:rate=30:\
                 colors=0x46b4ff|0xb4ff96,format=yuv420p[v]"
                    .to_string(),
                arg("-map"),
                arg("[v]"),
                arg("-map"),
                arg("0:a"),
            ]);
        }
    }

    args.extend(h264_output(out));
    args
}

#[cfg(test)]
mod tests {
    use super::*;
    use music_plan::{plan, PlanRequest};
    use std::path::PathBuf;

    fn test_plan() -> MusicPlan {
        plan(&PlanRequest {
            prompt: "steady groove".to_string(),
            genres: vec!["house".to_string()],
            duration_sec: 60,
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn oneshots_are_short_mono_wavs() {
        let p = test_plan();
        for kind in EventKind::ALL {
            let args = oneshot_args(kind, &p, &PathBuf::from("/tmp/x.wav"));
            assert!(args.contains(&"lavfi".to_string()), "{kind:?}");
            assert!(args.contains(&"pcm_s16le".to_string()), "{kind:?}");
            let source = &args[args.iter().position(|a| a == "-i").unwrap() + 1];
            // every source duration stays under 250 ms
            let dur: f64 = source
                .split("duration=")
                .nth(1)
                .unwrap()
                .split(':')
                .next()
                .unwrap()
                .parse()
                .unwrap();
            assert!(dur <= 0.25, "{kind:?} duration {dur}");
        }
    }

    #[test]
    fn bass_oneshot_follows_the_key_root() {
        let p = test_plan();
        let args = oneshot_args(EventKind::Bass, &p, &PathBuf::from("/tmp/b.wav"));
        let source = &args[args.iter().position(|a| a == "-i").unwrap() + 1];
        assert!(source.contains(&format!("frequency={:.2}", p.root_frequency_hz(2))));
    }

    #[test]
    fn slots_tile_the_duration() {
        let slots = plan_slots(&[0.0, 0.5, 1.0, 1.5], 2.0);
        assert_eq!(slots.len(), 4);
        let total: f64 = slots.iter().map(Slot::len).sum();
        assert!((total - 2.0).abs() < 1e-6);
        assert!(slots.iter().all(|s| matches!(s, Slot::Shot { .. })));
    }

    #[test]
    fn leading_gap_becomes_silence() {
        let slots = plan_slots(&[1.0, 1.5], 2.0);
        assert_eq!(
            slots[0],
            Slot::Silence { len: 1.0 },
        );
        let total: f64 = slots.iter().map(Slot::len).sum();
        assert!((total - 2.0).abs() < 1e-6);
    }

    #[test]
    fn empty_stem_is_all_silence() {
        let slots = plan_slots(&[], 60.0);
        assert_eq!(slots, vec![Slot::Silence { len: 60.0 }]);
    }

    #[test]
    fn concat_list_quotes_paths() {
        let a = PathBuf::from("/tmp/seg a.wav");
        let b = PathBuf::from("/tmp/it's.wav");
        let list = concat_list(&[a.as_path(), b.as_path()]);
        assert_eq!(
            list,
            "file '/tmp/seg a.wav'\nfile '/tmp/it'\\''s.wav'\n"
        );
    }

    #[test]
    fn master_applies_spec_weights_and_loudnorm() {
        let kick = PathBuf::from("/s/kick.wav");
        let snare = PathBuf::from("/s/snare.wav");
        let hat = PathBuf::from("/s/hat.wav");
        let bass = PathBuf::from("/s/bass.wav");
        let lead = PathBuf::from("/s/lead.wav");
        let stems = [
            (EventKind::Kick, kick.as_path()),
            (EventKind::Snare, snare.as_path()),
            (EventKind::Hat, hat.as_path()),
            (EventKind::Bass, bass.as_path()),
            (EventKind::Lead, lead.as_path()),
        ];

        let args = master_args(&stems, &PathBuf::from("/s/mix.wav"));
        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("[0:a]volume=0.90[s0]"));
        assert!(filter.contains("[2:a]volume=0.70[s2]"));
        assert!(filter.contains("loudnorm=I=-14:LRA=11:TP=-1"));
        assert!(filter.contains("alimiter=limit=0.891"));
        // stereo 16-bit output
        assert!(args.windows(2).any(|w| w[0] == "-ac" && w[1] == "2"));
    }

    #[test]
    fn vocal_mixdown_uses_the_fixed_weight() {
        let args = mix_vocals_args(
            &PathBuf::from("/s/mix.wav"),
            &PathBuf::from("/s/vocals.wav"),
            &PathBuf::from("/s/out.wav"),
        );
        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("volume=0.6"));
    }

    #[test]
    fn vocals_graph_matches_duration_and_root() {
        let p = test_plan();
        let args = vocals_args(&p, &PathBuf::from("/s/vocals.wav"));
        let source = &args[args.iter().position(|a| a == "-i").unwrap() + 1];
        assert!(source.contains("duration=60"));
        assert!(source.contains(&format!("frequency={:.2}", p.root_frequency_hz(3))));
        let filter = &args[args.iter().position(|a| a == "-filter_complex").unwrap() + 1];
        assert!(filter.contains("bandpass=frequency=800"));
        assert!(filter.contains("bandpass=frequency=2900"));
    }

    #[test]
    fn video_styles_map_from_request_labels() {
        assert_eq!(VideoStyle::from_label("Lyric Video"), Some(VideoStyle::Lyric));
        assert_eq!(
            VideoStyle::from_label("Official Music Video"),
            Some(VideoStyle::Spectrum)
        );
        assert_eq!(
            VideoStyle::from_label("Abstract Visualizer"),
            Some(VideoStyle::Waveform)
        );
        assert_eq!(VideoStyle::from_label("VHS"), None);
    }

    #[test]
    fn every_video_style_outputs_720p_h264() {
        let mix = PathBuf::from("/s/mix.wav");
        let srt = PathBuf::from("/s/captions.srt");
        for style in [VideoStyle::Lyric, VideoStyle::Spectrum, VideoStyle::Waveform] {
            let args = video_args(style, &mix, Some(&srt), 60, &PathBuf::from("/s/final.mp4"));
            assert!(args.contains(&"libx264".to_string()), "{style:?}");
            assert!(args.contains(&"yuv420p".to_string()), "{style:?}");
            assert!(args.contains(&"192k".to_string()), "{style:?}");
            let joined = args.join(" ");
            assert!(joined.contains("1280x720"), "{style:?}");
        }
    }

    #[test]
    fn lyric_video_overlays_escaped_captions() {
        let args = video_args(
            VideoStyle::Lyric,
            &PathBuf::from("/s/mix.wav"),
            Some(&PathBuf::from("/s/captions.srt")),
            60,
            &PathBuf::from("/s/final.mp4"),
        );
        let vf = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
        assert_eq!(vf, "subtitles=/s/captions.srt");
    }
}
