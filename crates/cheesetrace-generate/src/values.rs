//! Seedable, bounded value generation.
//!
//! Every stage invocation gets its own [`ValueSource`], seeded from the run
//! seed, the stage id, the date and the invocation number, so a stage's
//! output for a date does not depend on what other stages drew before it.

use rand::seq::IndexedRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use cheesetrace_core::GenerationContext;

pub struct ValueSource {
    rng: ChaCha8Rng,
}

impl ValueSource {
    pub fn from_seed(seed: u64) -> Self {
        Self {
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// `invocation` counts earlier runs of the same stage for the date, so a
    /// re-run draws fresh identifiers instead of replaying the first one.
    pub fn for_stage(
        run_seed: u64,
        stage: &str,
        ctx: &GenerationContext,
        invocation: u64,
    ) -> Self {
        let key = format!("{stage}:{}:{invocation}", ctx.date_key());
        Self::from_seed(hash_seed(run_seed, &key))
    }

    /// Uniform draw from `[min, max]`.
    pub fn uniform(&mut self, min: f64, max: f64) -> f64 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    /// Uniform draw from `[min, max]` rounded to `places` decimals, never
    /// leaving the range.
    pub fn round(&mut self, min: f64, max: f64, places: i32) -> f64 {
        let factor = 10f64.powi(places);
        let value = (self.uniform(min, max) * factor).round() / factor;
        value.clamp(min.min(max), max.max(min))
    }

    /// `center ± spread`, rounded.
    pub fn around(&mut self, center: f64, spread: f64, places: i32) -> f64 {
        self.round(center - spread, center + spread, places)
    }

    /// Uniform integer in `[min, max]`.
    pub fn int(&mut self, min: i64, max: i64) -> i64 {
        if min >= max {
            return min;
        }
        self.rng.random_range(min..=max)
    }

    pub fn pick<'a, T>(&mut self, items: &'a [T]) -> Option<&'a T> {
        items.choose(&mut self.rng)
    }

    pub fn chance(&mut self, probability: f64) -> bool {
        self.rng.random_bool(probability.clamp(0.0, 1.0))
    }

    /// Random v4 UUID text drawn from this source.
    pub fn uuid(&mut self) -> String {
        let bytes = self.rng.random::<[u8; 16]>();
        uuid::Builder::from_random_bytes(bytes).into_uuid().to_string()
    }
}

/// FNV-1a style mix of a seed and a key.
pub fn hash_seed(seed: u64, key: &str) -> u64 {
    let mut hash = seed ^ 0xcbf29ce484222325;
    for byte in key.as_bytes() {
        hash ^= *byte as u64;
        hash = hash.wrapping_mul(0x100000001b3);
    }
    hash
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn ctx(day: u32) -> GenerationContext {
        GenerationContext::new(NaiveDate::from_ymd_opt(2024, 1, day).expect("date"), day)
    }

    #[test]
    fn rounded_values_stay_in_bounds() {
        let mut values = ValueSource::from_seed(7);
        for _ in 0..10_000 {
            let ph = values.round(6.2, 6.3, 2);
            assert!((6.2..=6.3).contains(&ph), "{ph}");
            let temp = values.around(72.0, 0.5, 1);
            assert!((71.5..=72.5).contains(&temp), "{temp}");
            let count = values.int(2, 4);
            assert!((2..=4).contains(&count));
        }
    }

    #[test]
    fn degenerate_ranges_return_lower_bound() {
        let mut values = ValueSource::from_seed(1);
        assert_eq!(values.uniform(5.0, 5.0), 5.0);
        assert_eq!(values.int(3, 3), 3);
        assert!(values.pick::<u8>(&[]).is_none());
    }

    #[test]
    fn stage_streams_are_independent_and_repeatable() {
        let draw = |mut values: ValueSource| -> Vec<i64> {
            (0..8).map(|_| values.int(0, 1_000_000)).collect()
        };
        let first = draw(ValueSource::for_stage(42, "quality", &ctx(1), 0));
        assert_eq!(first, draw(ValueSource::for_stage(42, "quality", &ctx(1), 0)));
        assert_ne!(first, draw(ValueSource::for_stage(42, "quality", &ctx(2), 0)));
        assert_ne!(first, draw(ValueSource::for_stage(42, "quality", &ctx(1), 1)));
    }

    #[test]
    fn reinvocations_draw_fresh_uuids() {
        let mut first = ValueSource::for_stage(7, "manufacturing", &ctx(1), 0);
        let mut again = ValueSource::for_stage(7, "manufacturing", &ctx(1), 1);
        assert_ne!(first.uuid(), again.uuid());
    }

    #[test]
    fn uuids_are_version_four() {
        let mut values = ValueSource::from_seed(3);
        let id = values.uuid();
        let parsed = uuid::Uuid::parse_str(&id).expect("uuid");
        assert_eq!(parsed.get_version_num(), 4);
    }

    #[test]
    fn certain_and_impossible_chances() {
        let mut values = ValueSource::from_seed(9);
        assert!(values.chance(1.0));
        assert!(!values.chance(0.0));
        assert!(values.chance(2.0));
    }
}
