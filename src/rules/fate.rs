//! The Fate scheduler: an observer that watches pool usage during
//! compilation and eventually "collapses" its field parameters to fixed
//! learned values.
//!
//! While `on`, every compiled loop runs one tick (observe, adapt, collapse
//! check). Collapse freezes the current field as `static:*` learned
//! patterns and switches the scheduler off; the report then shows `static`
//! instead of `dynamic`.

use super::tile::TileManager;
use super::unified::UnifiedField;

/// Maximum number of learned (key, value) patterns.
pub const MAX_PATTERNS: usize = 256;

pub struct FateScheduler {
    /// Dynamic mode flag; cleared by `fate off` or by collapse.
    pub on: bool,
    id_counter: i32,

    // Observation values.
    usage: f64,
    gain: f64,
    prev_gain: f64,
    pattern_count: u32,

    /// The scheduler's own copy of the field parameters.
    pub field: UnifiedField,

    /// Learned patterns, update-in-place, bounded at [`MAX_PATTERNS`].
    learned: Vec<(String, f64)>,

    /// Gain delta below which the scheduler collapses.
    pub marginal_threshold: f64,
}

impl FateScheduler {
    pub fn new() -> Self {
        Self {
            on: true,
            id_counter: 0,
            usage: 0.0,
            gain: 0.0,
            prev_gain: 0.0,
            pattern_count: 0,
            field: UnifiedField::new(),
            learned: Vec::new(),
            marginal_threshold: 0.05,
        }
    }

    /// Hand out the next monotonic id (first call returns 1).
    pub fn next_id(&mut self) -> i32 {
        self.id_counter += 1;
        self.id_counter
    }

    /// Record a pattern, overwriting an existing key. Full stores discard
    /// new keys.
    pub fn learn(&mut self, key: &str, value: f64) {
        if let Some(entry) = self.learned.iter_mut().find(|(k, _)| k == key) {
            entry.1 = value;
            return;
        }
        if self.learned.len() < MAX_PATTERNS {
            self.learned.push((key.to_string(), value));
        }
    }

    /// Recall a learned value; unknown keys read as 0.
    pub fn recall(&self, key: &str) -> f64 {
        self.learned
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| *v)
            .unwrap_or(0.0)
    }

    /// Sample the tile fill ratio and count the observation.
    pub fn observe(&mut self, tile: &TileManager) {
        if !self.on {
            return;
        }
        self.usage = tile.ratio();
        self.pattern_count += 1;
    }

    /// Nudge the field parameters toward what the observations suggest.
    pub fn adapt(&mut self) {
        if !self.on {
            return;
        }
        if self.usage > 0.7 {
            self.field.set_e(self.field.e + 0.1);
        }
        if self.pattern_count > 100 {
            self.field.set_r(self.field.r + 0.05);
        }
    }

    /// True once the gain delta drops below the marginal threshold.
    pub fn should_collapse(&mut self) -> bool {
        let delta = self.gain - self.prev_gain;
        self.prev_gain = self.gain;
        delta < self.marginal_threshold
    }

    /// Freeze the field as learned `static:*` patterns and go static.
    pub fn collapse(&mut self) {
        let (i, e, r) = (self.field.i, self.field.e, self.field.r);
        self.learn("static:i", i);
        self.learn("static:e", e);
        self.learn("static:r", r);
        self.on = false;
    }

    /// One scheduler step: observe, adapt, collapse if marginal.
    pub fn tick(&mut self, tile: &TileManager) {
        if !self.on {
            return;
        }
        self.observe(tile);
        self.adapt();
        if self.should_collapse() {
            self.collapse();
        }
    }

    /// `limit N` sets the collapse threshold to 1/N.
    pub fn set_limit(&mut self, n: i64) {
        self.marginal_threshold = 1.0 / n as f64;
    }

    /// Mode string for the report.
    pub fn mode(&self) -> &'static str {
        if self.on {
            "dynamic"
        } else {
            "static"
        }
    }
}

impl Default for FateScheduler {
    fn default() -> Self {
        Self::new()
    }
}
