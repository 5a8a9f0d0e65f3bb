//! Pipeline progress model.
//!
//! The renderer reports at fixed anchor points; when the gateway produces
//! finer-grained progress inside a stage, it is mapped linearly into that
//! stage's band. Percentages never move backwards - the job store enforces
//! monotonicity too, this keeps the signal clean at the source.

use std::sync::Arc;

/// Callback receiving (percent 0..100, human-readable stage message).
pub type ProgressSink = Arc<dyn Fn(f32, &str) + Send + Sync>;

/// A sink that drops everything.
pub fn null_sink() -> ProgressSink {
    Arc::new(|_, _| {})
}

/// Anchor percents for the pipeline stages.
pub mod anchor {
    pub const PLAN: f32 = 5.0;
    pub const SEGMENTS: f32 = 10.0;
    pub const SEQUENCING: f32 = 25.0;
    pub const STEMS_START: f32 = 25.0;
    pub const STEMS_END: f32 = 65.0;
    pub const MIXING: f32 = 70.0;
    pub const VOCALS: f32 = 80.0;
    pub const VIDEO: f32 = 88.0;
    pub const UPLOAD: f32 = 94.0;
    pub const DONE: f32 = 100.0;
}

/// A percent band one stage owns.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageBand {
    pub lo: f32,
    pub hi: f32,
}

impl StageBand {
    pub fn new(lo: f32, hi: f32) -> Self {
        Self { lo, hi }
    }

    /// The band covering stem `index` of `count` within the stem window.
    pub fn for_stem(index: usize, count: usize) -> Self {
        let span = anchor::STEMS_END - anchor::STEMS_START;
        let width = span / count.max(1) as f32;
        let lo = anchor::STEMS_START + width * index as f32;
        Self::new(lo, lo + width)
    }

    /// Map a stage-internal fraction (0..100) into this band.
    pub fn map(&self, stage_percent: f32) -> f32 {
        let frac = (stage_percent / 100.0).clamp(0.0, 1.0);
        self.lo + (self.hi - self.lo) * frac
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn band_maps_linearly() {
        let band = StageBand::new(25.0, 65.0);
        assert_eq!(band.map(0.0), 25.0);
        assert_eq!(band.map(50.0), 45.0);
        assert_eq!(band.map(100.0), 65.0);
    }

    #[test]
    fn band_clamps_out_of_range_input() {
        let band = StageBand::new(70.0, 80.0);
        assert_eq!(band.map(-20.0), 70.0);
        assert_eq!(band.map(250.0), 80.0);
    }

    #[test]
    fn stem_bands_tile_the_window() {
        let first = StageBand::for_stem(0, 5);
        let last = StageBand::for_stem(4, 5);
        assert_eq!(first.lo, anchor::STEMS_START);
        assert_eq!(last.hi, anchor::STEMS_END);
        assert!((first.hi - StageBand::for_stem(1, 5).lo).abs() < 1e-6);
    }
}
