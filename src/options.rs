//! Engine option string parsing.
//!
//! The engine is configured with a single flat option string (for example
//! `"--hash all -q st --noconstant -b 20"`). Most of that string is opaque
//! to the interchange layer and is carried through to the engine verbatim;
//! this module recognizes only the options the interchange layer itself
//! needs (bit width, hash mode, ring size, example bound) plus the handful
//! the bundled reference engine consumes.
//!
//! # Key Insight
//!
//! Unknown options are **never** an error. The option string belongs to the
//! engine, and engines evolve independently of this layer; anything not
//! recognized here lands untouched in [`EngineOptions::passthrough`].
//! Malformed values for *recognized* options, however, fail parsing with
//! [`HopperError::Config`] rather than being silently dropped.

use crate::error::{HopperError, Result};
use crate::hash::HashMode;

/// Default address-space bit width (weight vector of `2^18` entries).
pub const DEFAULT_BITS: u32 = 18;

/// Default streaming queue capacity in examples.
pub const DEFAULT_RING_SIZE: usize = 256;

/// Widest supported address space; index arithmetic stays in `u64`.
pub const MAX_BITS: u32 = 61;

/// Parsed engine configuration.
///
/// Built once by [`EngineOptions::parse`] and then shared read-only by the
/// hash context, the streaming parser, and the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct EngineOptions {
    /// Address-space bit width; weight indices are masked to `2^bits - 1`.
    pub bits: u32,
    /// Feature hashing mode.
    pub hash_mode: HashMode,
    /// Streaming queue capacity (parsed-but-unconsumed example bound).
    pub ring_size: usize,
    /// Caller-side maximum-example bound for driver loops, if any.
    pub max_examples: Option<u64>,
    /// Quadratic interaction pairs (`-q st` means cross namespaces `s`×`t`).
    pub quadratic: Vec<(char, char)>,
    /// Suppress the engine's constant term.
    pub noconstant: bool,
    /// Initial value for every weight (ignored when `random_weights`).
    pub initial_weight: f32,
    /// Initialize weights from a seeded generator instead of a constant.
    pub random_weights: bool,
    /// SGD step size for the reference engine.
    pub learning_rate: f32,
    /// Model snapshot to load at initialization.
    pub initial_regressor: Option<String>,
    /// Everything this layer did not recognize, in the order given.
    pub passthrough: Vec<String>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            bits: DEFAULT_BITS,
            hash_mode: HashMode::Strings,
            ring_size: DEFAULT_RING_SIZE,
            max_examples: None,
            quadratic: Vec::new(),
            noconstant: false,
            initial_weight: 0.0,
            random_weights: false,
            learning_rate: 0.5,
            initial_regressor: None,
            passthrough: Vec::new(),
        }
    }
}

impl EngineOptions {
    /// Parse an engine option string.
    ///
    /// # Example
    ///
    /// ```rust
    /// use hopper::options::EngineOptions;
    /// use hopper::hash::HashMode;
    ///
    /// let opts = EngineOptions::parse("--hash all -q st --noconstant -b 20").unwrap();
    /// assert_eq!(opts.hash_mode, HashMode::All);
    /// assert_eq!(opts.bits, 20);
    /// assert_eq!(opts.quadratic, vec![('s', 't')]);
    /// assert!(opts.noconstant);
    /// ```
    pub fn parse(config: &str) -> Result<Self> {
        let mut opts = Self::default();
        let mut tokens = config.split_whitespace();

        while let Some(token) = tokens.next() {
            match token {
                "-b" | "--bit_precision" => {
                    let bits: u32 = parse_value(token, tokens.next())?;
                    if bits == 0 || bits > MAX_BITS {
                        return Err(HopperError::Config(format!(
                            "bit precision {} out of range 1..={}",
                            bits, MAX_BITS
                        )));
                    }
                    opts.bits = bits;
                }
                "--hash" => {
                    opts.hash_mode = match required_value(token, tokens.next())? {
                        "all" => HashMode::All,
                        "strings" => HashMode::Strings,
                        other => {
                            return Err(HopperError::Config(format!(
                                "unknown hash mode {:?} (expected \"all\" or \"strings\")",
                                other
                            )));
                        }
                    };
                }
                "--ring_size" => {
                    let size: usize = parse_value(token, tokens.next())?;
                    if size == 0 {
                        return Err(HopperError::Config(
                            "ring size must be at least 1".to_string(),
                        ));
                    }
                    opts.ring_size = size;
                }
                "--examples" => {
                    opts.max_examples = Some(parse_value(token, tokens.next())?);
                }
                "-q" | "--quadratic" => {
                    let pair = required_value(token, tokens.next())?;
                    let mut chars = pair.chars();
                    match (chars.next(), chars.next(), chars.next()) {
                        (Some(a), Some(b), None) => opts.quadratic.push((a, b)),
                        _ => {
                            return Err(HopperError::Config(format!(
                                "quadratic pair {:?} must name exactly two namespaces",
                                pair
                            )));
                        }
                    }
                }
                "--noconstant" => opts.noconstant = true,
                "--random_weights" => opts.random_weights = true,
                "--initial_weight" => {
                    opts.initial_weight = parse_value(token, tokens.next())?;
                }
                "-l" | "--learning_rate" => {
                    opts.learning_rate = parse_value(token, tokens.next())?;
                }
                "-i" | "--initial_regressor" => {
                    opts.initial_regressor =
                        Some(required_value(token, tokens.next())?.to_string());
                }
                other => opts.passthrough.push(other.to_string()),
            }
        }

        Ok(opts)
    }

    /// Number of addressable weights (`2^bits`).
    pub fn weight_count(&self) -> u64 {
        1u64 << self.bits
    }
}

fn required_value<'a>(option: &str, value: Option<&'a str>) -> Result<&'a str> {
    value.ok_or_else(|| HopperError::Config(format!("option {} requires a value", option)))
}

fn parse_value<T: std::str::FromStr>(option: &str, value: Option<&str>) -> Result<T> {
    let raw = required_value(option, value)?;
    raw.parse().map_err(|_| {
        HopperError::Config(format!("option {} has malformed value {:?}", option, raw))
    })
}
