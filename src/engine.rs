//! The learner seam and a reference engine behind it.
//!
//! The interchange layer never learns anything itself; it hands
//! [`ExampleRecord`]s to whatever sits behind [`LearnerEngine`] and relays
//! the score. [`SgdEngine`] is the engine shipped in-crate: a single dense
//! weight vector scored by sparse dot product, with the classic constant
//! term and pairwise namespace interactions, updated by plain SGD on
//! labeled examples. It exists so sessions, demos, and tests run the full
//! path end to end; nothing in the interchange contract depends on its
//! update rule.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use crate::error::{HopperError, Result};
use crate::example::ExampleRecord;
use crate::options::EngineOptions;

/// Weight address of the constant term. Models only interchange cleanly
/// when both sides pin the constant to the same address, so this value is
/// part of the wire contract, not an engine detail.
pub const CONSTANT_INDEX: u64 = 11650396;

/// Multiplier folding two feature indices into one interaction index.
pub const QUADRATIC_CONSTANT: u64 = 27942141;

/// Dense weight budget: this engine refuses address spaces over `2^28`.
pub const MAX_ENGINE_BITS: u32 = 28;

const SNAPSHOT_VERSION: u32 = 1;
const RANDOM_WEIGHT_SEED: u64 = 0x9e3779b97f4a7c15;

// =============================================================================
// Engine Seam
// =============================================================================

/// What the interchange layer requires of a learner.
pub trait LearnerEngine {
    /// Short human-readable engine name for logs.
    fn describe(&self) -> &'static str;

    /// Configure from parsed options. Called once at session start; the
    /// engine may decline with [`HopperError::EngineRejected`].
    fn accept(&mut self, options: &EngineOptions) -> Result<()>;

    /// Score one example, updating internal state if it carries a label.
    /// Returns the prediction made before any update.
    fn learn(&mut self, example: &ExampleRecord) -> Result<f32>;

    /// Drop learned state, returning to the option-derived initial weights.
    fn reset(&mut self);
}

// =============================================================================
// SGD Reference Engine
// =============================================================================

/// Dense-weight SGD learner.
#[derive(Debug, Default)]
pub struct SgdEngine {
    weights: Vec<f32>,
    mask: u64,
    bits: u32,
    noconstant: bool,
    quadratic: Vec<(char, char)>,
    learning_rate: f32,
    initial_weight: f32,
    random_weights: bool,
}

#[derive(Serialize, Deserialize)]
struct Snapshot {
    version: u32,
    bits: u32,
    weights: Vec<f32>,
}

impl SgdEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write the model to a JSON snapshot loadable via `-i PATH`.
    pub fn save(&self, path: &str) -> std::io::Result<()> {
        let snapshot = Snapshot {
            version: SNAPSHOT_VERSION,
            bits: self.bits,
            weights: self.weights.clone(),
        };
        let json = serde_json::to_string(&snapshot)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
        std::fs::write(path, json)
    }

    /// Current weight at a masked address. Mostly useful to tests and
    /// demos poking at what training did.
    pub fn weight(&self, index: u64) -> f32 {
        self.weights[(index & self.mask) as usize]
    }

    fn init_weights(&mut self) {
        let count = 1usize << self.bits;
        if self.random_weights {
            let mut rng = ChaCha8Rng::seed_from_u64(RANDOM_WEIGHT_SEED);
            self.weights = (0..count).map(|_| rng.gen::<f32>()).collect();
        } else {
            self.weights = vec![self.initial_weight; count];
        }
    }

    fn load_snapshot(&mut self, path: &str) -> Result<()> {
        let json = std::fs::read_to_string(path)?;
        let snapshot: Snapshot = serde_json::from_str(&json)
            .map_err(|e| HopperError::EngineRejected(format!("unreadable snapshot: {}", e)))?;

        if snapshot.version != SNAPSHOT_VERSION {
            return Err(HopperError::EngineRejected(format!(
                "snapshot version {} unsupported (expected {})",
                snapshot.version, SNAPSHOT_VERSION
            )));
        }
        if snapshot.bits != self.bits {
            return Err(HopperError::EngineRejected(format!(
                "snapshot was trained with {} bits, session configured for {}",
                snapshot.bits, self.bits
            )));
        }
        // The weight count is fixed by the bit width; a file-supplied
        // length is never trusted, or a short array would panic the first
        // masked lookup.
        let expected = 1usize << snapshot.bits;
        if snapshot.weights.len() != expected {
            return Err(HopperError::EngineRejected(format!(
                "snapshot carries {} weights, expected {} for {} bits",
                snapshot.weights.len(),
                expected,
                snapshot.bits
            )));
        }
        self.weights = snapshot.weights;
        Ok(())
    }

    /// Every `(address, value)` pair the example activates: its own
    /// features, the constant term, and the configured interactions.
    fn active_features(&self, example: &ExampleRecord) -> Vec<(usize, f32)> {
        let mut active = Vec::new();

        for space in example.spaces() {
            for feature in &space.features {
                active.push(((feature.index & self.mask) as usize, feature.value));
            }
        }

        if !self.noconstant {
            active.push(((CONSTANT_INDEX & self.mask) as usize, 1.0));
        }

        for &(left, right) in &self.quadratic {
            for left_space in example.spaces().iter().filter(|s| s.name == left) {
                for right_space in example.spaces().iter().filter(|s| s.name == right) {
                    for a in &left_space.features {
                        for b in &right_space.features {
                            let index = QUADRATIC_CONSTANT
                                .wrapping_mul(a.index)
                                .wrapping_add(b.index)
                                & self.mask;
                            active.push((index as usize, a.value * b.value));
                        }
                    }
                }
            }
        }

        active
    }
}

impl LearnerEngine for SgdEngine {
    fn describe(&self) -> &'static str {
        "sgd"
    }

    fn accept(&mut self, options: &EngineOptions) -> Result<()> {
        if options.bits > MAX_ENGINE_BITS {
            return Err(HopperError::EngineRejected(format!(
                "bit precision {} exceeds this engine's dense budget of {} bits",
                options.bits, MAX_ENGINE_BITS
            )));
        }

        self.bits = options.bits;
        self.mask = (1u64 << options.bits) - 1;
        self.noconstant = options.noconstant;
        self.quadratic = options.quadratic.clone();
        self.learning_rate = options.learning_rate;
        self.initial_weight = options.initial_weight;
        self.random_weights = options.random_weights;
        self.init_weights();

        if let Some(path) = &options.initial_regressor {
            self.load_snapshot(path)?;
        }
        Ok(())
    }

    fn learn(&mut self, example: &ExampleRecord) -> Result<f32> {
        let active = self.active_features(example);
        let prediction: f32 = active
            .iter()
            .map(|&(index, value)| self.weights[index] * value)
            .sum();

        if let Some(label) = example.label() {
            let step = self.learning_rate * (label - prediction);
            for (index, value) in active {
                self.weights[index] += step * value;
            }
        }

        Ok(prediction)
    }

    fn reset(&mut self) {
        self.init_weights();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::feature::{FeatureSpace, FeatureSpaceSet};

    fn engine(config: &str) -> SgdEngine {
        let options = EngineOptions::parse(config).expect("config parses");
        let mut engine = SgdEngine::new();
        engine.accept(&options).expect("engine accepts");
        engine
    }

    fn labeled(spaces: Vec<FeatureSpace>, label: f32) -> ExampleRecord {
        let mut record = ExampleRecord::from_spaces(&FeatureSpaceSet::from(spaces));
        record.set_label(label).expect("fresh record labels");
        record
    }

    #[test]
    fn test_accept_sizes_weight_vector() {
        let engine = engine("-b 10");
        assert_eq!(engine.weights.len(), 1024);
        assert!(engine.weights.iter().all(|&w| w == 0.0));
    }

    #[test]
    fn test_initial_weight_fill() {
        let engine = engine("-b 6 --initial_weight 0.25");
        assert!(engine.weights.iter().all(|&w| w == 0.25));
    }

    #[test]
    fn test_random_weights_are_deterministic() {
        let a = engine("-b 8 --random_weights");
        let b = engine("-b 8 --random_weights");
        assert_eq!(a.weights, b.weights);
        assert!(a.weights.iter().all(|&w| (0.0..1.0).contains(&w)));
        assert!(a.weights.iter().any(|&w| w != 0.0));
    }

    #[test]
    fn test_rejects_oversized_address_space() {
        let options = EngineOptions::parse("-b 29").expect("config parses");
        let err = SgdEngine::new().accept(&options).expect_err("too wide");
        assert!(matches!(err, HopperError::EngineRejected(_)));
    }

    #[test]
    fn test_sgd_step_moves_toward_label() {
        let mut engine = engine("-b 10 --noconstant -l 0.5");
        let example = labeled(vec![FeatureSpace::with_features('a', [(3, 1.0)])], 1.0);

        // Zero weights score zero; each pass halves the remaining error.
        assert_eq!(engine.learn(&example).expect("learns"), 0.0);
        assert_eq!(engine.learn(&example).expect("learns"), 0.5);
        assert_eq!(engine.learn(&example).expect("learns"), 0.75);
        assert_eq!(engine.weight(3), 0.875);
    }

    #[test]
    fn test_constant_term_participates() {
        let mut engine = engine("-b 10 -l 0.5");
        let example = labeled(vec![FeatureSpace::with_features('a', [(3, 1.0)])], 1.0);

        assert_eq!(engine.learn(&example).expect("learns"), 0.0);
        // Feature weight and constant weight each took half the step.
        assert_eq!(engine.weight(3), 0.5);
        assert_eq!(engine.weight(CONSTANT_INDEX), 0.5);
        assert_eq!(engine.learn(&example).expect("learns"), 1.0);
    }

    #[test]
    fn test_unlabeled_example_only_predicts() {
        let mut engine = engine("-b 10 --noconstant");
        let unlabeled =
            ExampleRecord::from_spaces(&vec![FeatureSpace::with_features('a', [(3, 2.0)])].into());

        assert_eq!(engine.learn(&unlabeled).expect("scores"), 0.0);
        assert!(engine.weights.iter().all(|&w| w == 0.0), "no update without a label");
    }

    #[test]
    fn test_quadratic_interaction_index() {
        let mut engine = engine("-b 20 --noconstant -q st -l 1");
        let example = labeled(
            vec![
                FeatureSpace::with_features('s', [(2, 2.0)]),
                FeatureSpace::with_features('t', [(5, 3.0)]),
            ],
            1.0,
        );

        engine.learn(&example).expect("learns");
        let interaction = QUADRATIC_CONSTANT.wrapping_mul(2).wrapping_add(5);
        assert!(
            engine.weight(interaction) != 0.0,
            "interaction address must receive part of the update"
        );
        assert!(engine.weight(2) != 0.0);
        assert!(engine.weight(5) != 0.0);
    }

    #[test]
    fn test_reset_restores_initial_weights() {
        let mut engine = engine("-b 8 --noconstant --initial_weight 0.1");
        let example = labeled(vec![FeatureSpace::with_features('a', [(3, 1.0)])], 1.0);
        engine.learn(&example).expect("learns");
        assert!(engine.weight(3) != 0.1);

        engine.reset();
        assert!(engine.weights.iter().all(|&w| w == 0.1));
    }

    #[test]
    fn test_snapshot_round_trip() {
        let path = "/tmp/hopper_snapshot_roundtrip.json";
        let mut trained = engine("-b 8 --noconstant -l 0.5");
        let example = labeled(vec![FeatureSpace::with_features('a', [(3, 1.0)])], 1.0);
        trained.learn(&example).expect("learns");
        trained.save(path).expect("snapshot saves");

        let loaded = engine(&format!("-b 8 --noconstant -i {}", path));
        assert_eq!(loaded.weights, trained.weights);

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_snapshot_bits_mismatch() {
        let path = "/tmp/hopper_snapshot_bits.json";
        engine("-b 8").save(path).expect("snapshot saves");

        let options = EngineOptions::parse(&format!("-b 10 -i {}", path)).expect("config parses");
        let err = SgdEngine::new().accept(&options).expect_err("bit widths differ");
        assert!(matches!(err, HopperError::EngineRejected(_)));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_snapshot_wrong_weight_count() {
        let path = "/tmp/hopper_snapshot_short.json";
        std::fs::write(path, r#"{"version":1,"bits":8,"weights":[0.0,0.0,0.0]}"#)
            .expect("fixture writes");

        let options = EngineOptions::parse(&format!("-b 8 -i {}", path)).expect("config parses");
        let err = SgdEngine::new()
            .accept(&options)
            .expect_err("three weights cannot fill an 8-bit space");
        assert!(matches!(err, HopperError::EngineRejected(_)));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_snapshot_version_mismatch() {
        let path = "/tmp/hopper_snapshot_version.json";
        let weights = serde_json::to_string(&vec![0.0f32; 256]).expect("weights serialize");
        std::fs::write(path, format!(r#"{{"version":99,"bits":8,"weights":{}}}"#, weights))
            .expect("fixture writes");

        let options = EngineOptions::parse(&format!("-b 8 -i {}", path)).expect("config parses");
        let err = SgdEngine::new().accept(&options).expect_err("future version refused");
        assert!(matches!(err, HopperError::EngineRejected(_)));

        std::fs::remove_file(path).ok();
    }

    #[test]
    fn test_missing_snapshot_is_source_unavailable() {
        let options = EngineOptions::parse("-b 8 -i /tmp/hopper_no_such_snapshot.json")
            .expect("config parses");
        let err = SgdEngine::new().accept(&options).expect_err("file absent");
        assert!(matches!(err, HopperError::SourceUnavailable(_)));
    }
}
