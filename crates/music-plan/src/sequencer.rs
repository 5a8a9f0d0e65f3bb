//! Event sequencing: expand a plan into a time-ordered one-shot grid.

use crate::pitch;
use crate::types::{Event, EventKind, MusicPlan};

/// 16-step drum masks for one 4/4 bar. Bit i set means step i fires.
pub struct DrumPattern {
    pub name: &'static str,
    pub kick: u16,
    pub snare: u16,
    pub hat: u16,
}

const fn steps(indices: &[u8]) -> u16 {
    let mut mask = 0u16;
    let mut i = 0;
    while i < indices.len() {
        mask |= 1 << indices[i];
        i += 1;
    }
    mask
}

/// Named drum patterns. The four-on-the-floor entry doubles as the default
/// grid: kick on every beat, snare on 2 and 4, hats on the eighths.
pub static PATTERNS: &[DrumPattern] = &[
    DrumPattern {
        name: "four-on-the-floor",
        kick: steps(&[0, 4, 8, 12]),
        snare: steps(&[4, 12]),
        hat: steps(&[0, 2, 4, 6, 8, 10, 12, 14]),
    },
    DrumPattern {
        name: "dnb-syncop",
        kick: steps(&[0, 10]),
        snare: steps(&[4, 12]),
        hat: steps(&[0, 2, 4, 6, 8, 10, 12, 14]),
    },
    DrumPattern {
        name: "boom-bap",
        kick: steps(&[0, 7, 10]),
        snare: steps(&[4, 12]),
        hat: steps(&[0, 2, 4, 6, 8, 10, 12, 14]),
    },
    DrumPattern {
        name: "808-grid",
        kick: steps(&[0, 6, 12]),
        snare: steps(&[8]),
        hat: steps(&[0, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10, 11, 12, 13, 14, 15]),
    },
];

/// Steps where the bass fires: beats 1 and 3.
const BASS_MASK: u16 = steps(&[0, 8]);

/// Steps where the lead fires: every eighth.
const LEAD_MASK: u16 = steps(&[0, 2, 4, 6, 8, 10, 12, 14]);

fn pattern_for(name: &str) -> &'static DrumPattern {
    PATTERNS
        .iter()
        .find(|p| p.name.eq_ignore_ascii_case(name))
        .unwrap_or(&PATTERNS[0])
}

/// Expand a plan into its one-shot grid.
///
/// Output is strictly ordered by `t_sec` (ties broken by stem kind) and
/// covers `plan.duration_sec` on a 4/4 sixteenth grid at `plan.bpm`. Swing
/// shifts every odd-index eighth late by `swing * eighth_length`. Pure: no
/// I/O, no randomness.
pub fn events(plan: &MusicPlan) -> Vec<Event> {
    let pattern = pattern_for(&plan.drum_pattern);

    let beat_sec = 60.0 / plan.bpm as f64;
    let sixteenth_sec = beat_sec / 4.0;
    let eighth_sec = beat_sec / 2.0;
    let bar_sec = beat_sec * 4.0;
    let duration = plan.duration_sec as f64;
    let swing_shift = plan.swing as f64 * eighth_sec;

    let bass_pitch = pitch::midi_note(plan.root_pitch_class(), 2);

    let mut out = Vec::new();
    let bars = (duration / bar_sec).ceil() as u64;

    for bar in 0..bars {
        let bar_start = bar as f64 * bar_sec;
        for step in 0u8..16 {
            let mut t = bar_start + step as f64 * sixteenth_sec;

            // Odd-index eighths (steps 2, 6, 10, 14) swing late.
            if step % 4 == 2 {
                t += swing_shift;
            }

            if t >= duration {
                continue;
            }

            let bit = 1u16 << step;
            if pattern.kick & bit != 0 {
                out.push(Event { t_sec: t, kind: EventKind::Kick, pitch: None });
            }
            if pattern.snare & bit != 0 {
                out.push(Event { t_sec: t, kind: EventKind::Snare, pitch: None });
            }
            if pattern.hat & bit != 0 {
                out.push(Event { t_sec: t, kind: EventKind::Hat, pitch: None });
            }
            if BASS_MASK & bit != 0 {
                out.push(Event {
                    t_sec: t,
                    kind: EventKind::Bass,
                    pitch: Some(bass_pitch),
                });
            }
            if LEAD_MASK & bit != 0 {
                out.push(Event { t_sec: t, kind: EventKind::Lead, pitch: None });
            }
        }
    }

    out.sort_by(|a, b| {
        a.t_sec
            .total_cmp(&b.t_sec)
            .then_with(|| kind_index(a.kind).cmp(&kind_index(b.kind)))
    });
    out
}

fn kind_index(kind: EventKind) -> u8 {
    match kind {
        EventKind::Kick => 0,
        EventKind::Snare => 1,
        EventKind::Hat => 2,
        EventKind::Bass => 3,
        EventKind::Lead => 4,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::planner::plan;
    use crate::types::PlanRequest;

    fn test_plan(bpm: u32, duration_sec: u32, drum_pattern: &str, swing: f32) -> MusicPlan {
        let mut p = plan(&PlanRequest {
            prompt: "steady groove".to_string(),
            genres: vec!["house".to_string()],
            duration_sec: 60,
            ..Default::default()
        })
        .unwrap();
        p.bpm = bpm;
        p.duration_sec = duration_sec;
        p.drum_pattern = drum_pattern.to_string();
        p.swing = swing;
        p
    }

    #[test]
    fn times_are_non_decreasing() {
        let evs = events(&test_plan(120, 60, "four-on-the-floor", 0.0));
        for pair in evs.windows(2) {
            assert!(pair[0].t_sec <= pair[1].t_sec);
        }
    }

    #[test]
    fn four_on_the_floor_counts() {
        // 60s at 120 bpm: 30 bars, 120 beats.
        let evs = events(&test_plan(120, 60, "four-on-the-floor", 0.0));
        let count = |kind| evs.iter().filter(|e| e.kind == kind).count();
        assert_eq!(count(EventKind::Kick), 120);
        assert_eq!(count(EventKind::Snare), 60);
        assert_eq!(count(EventKind::Hat), 240);
        assert_eq!(count(EventKind::Bass), 60);
        assert_eq!(count(EventKind::Lead), 240);
    }

    #[test]
    fn named_pattern_substitutes_masks() {
        let evs = events(&test_plan(120, 60, "dnb-syncop", 0.0));
        let kicks = evs.iter().filter(|e| e.kind == EventKind::Kick).count();
        // dnb kick fires twice per bar instead of four times.
        assert_eq!(kicks, 60);

        let grid = events(&test_plan(120, 60, "808-grid", 0.0));
        let hats = grid.iter().filter(|e| e.kind == EventKind::Hat).count();
        // sixteenth hats
        assert_eq!(hats, 480);
    }

    #[test]
    fn unknown_pattern_falls_back_to_default() {
        let default = events(&test_plan(120, 60, "four-on-the-floor", 0.0));
        let unknown = events(&test_plan(120, 60, "mystery-groove", 0.0));
        assert_eq!(default, unknown);
    }

    #[test]
    fn swing_delays_only_odd_eighths() {
        let straight = events(&test_plan(120, 4, "four-on-the-floor", 0.0));
        let swung = events(&test_plan(120, 4, "four-on-the-floor", 0.5));

        let eighth = 0.25; // at 120 bpm
        let hats_straight: Vec<f64> = straight
            .iter()
            .filter(|e| e.kind == EventKind::Hat)
            .map(|e| e.t_sec)
            .collect();
        let hats_swung: Vec<f64> = swung
            .iter()
            .filter(|e| e.kind == EventKind::Hat)
            .map(|e| e.t_sec)
            .collect();

        assert_eq!(hats_straight.len(), hats_swung.len());
        for (i, (a, b)) in hats_straight.iter().zip(&hats_swung).enumerate() {
            if i % 2 == 1 {
                assert!((b - a - 0.5 * eighth).abs() < 1e-9, "eighth {i}");
            } else {
                assert_eq!(a, b, "eighth {i}");
            }
        }
    }

    #[test]
    fn bass_carries_the_root_pitch() {
        let p = test_plan(120, 8, "four-on-the-floor", 0.0);
        let evs = events(&p);
        let bass: Vec<_> = evs.iter().filter(|e| e.kind == EventKind::Bass).collect();
        assert!(!bass.is_empty());
        let expected = pitch::midi_note(p.root_pitch_class(), 2);
        assert!(bass.iter().all(|e| e.pitch == Some(expected)));
    }

    #[test]
    fn no_event_at_or_past_duration() {
        let evs = events(&test_plan(97, 33, "boom-bap", 0.2));
        assert!(evs.iter().all(|e| e.t_sec < 33.0));
    }
}
