//! # Hopper: Feature-Space Interchange for Online Learning
//!
//! Hopper is the boundary layer between an application and an
//! online-learning engine: it hashes sparse named features into weight
//! indices, moves feature spaces across the boundary in a compact binary
//! layout, manages engine-owned example records behind opaque handles, and
//! streams training examples through a bounded pipeline.
//!
//! ## Quick Start
//!
//! ```rust
//! use hopper::Hopper;
//!
//! # fn main() -> hopper::Result<()> {
//! // One session per engine configuration.
//! let mut session = Hopper::initialize("--hash strings -b 18 -l 0.5")?;
//!
//! // Text in, handle out; the engine owns the record.
//! let example = session.read_example("1 |user age:33 region^eu |item price:9.5")?;
//! let score = session.learn(example)?;
//! assert_eq!(score, 0.0, "first prediction from zero weights");
//!
//! // Every handle is returned when its record is done.
//! session.finish_example(example)?;
//! session.finish()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Core Concepts
//!
//! - **Hashing**: deterministic token → weight-index mapping ([`hash`])
//! - **Interchange**: feature spaces as self-describing bytes ([`codec`])
//! - **Lifecycle**: generation-checked example handles ([`example`])
//! - **Streaming**: bounded prefetch from record sources ([`stream`])
//! - **Engine seam**: pluggable learner behind [`LearnerEngine`]

pub mod codec;
pub mod engine;
pub mod error;
pub mod example;
pub mod feature;
pub mod hash;
pub mod options;
pub mod stream;
pub mod text;

// Re-exports for convenience
pub use codec::IndexWidth;
pub use engine::{LearnerEngine, SgdEngine};
pub use error::{HopperError, Result};
pub use example::{ExampleHandle, ExampleRecord, ExampleStore};
pub use feature::{Feature, FeatureSpace, FeatureSpaceSet};
pub use hash::{HashContext, HashMode};
pub use options::EngineOptions;
pub use stream::{ExampleStream, LineFileSource, MemorySource, RecordSource, StreamSummary};
pub use text::{parse_text_example, ParsedExample};

use tracing::debug;

/// An engine session - the primary interface for all operations.
///
/// A session owns the engine, the hashing context derived from its
/// configuration, and every example record created through it. All methods
/// take `&mut self` or `&self`; one session is strictly sequential, and
/// two sessions never share state.
///
/// # Example
///
/// ```rust
/// use hopper::{FeatureSpace, FeatureSpaceSet, Hopper};
///
/// # fn main() -> hopper::Result<()> {
/// let mut session = Hopper::initialize("-b 18 --noconstant")?;
///
/// // Import a pre-hashed feature space built elsewhere.
/// let set = FeatureSpaceSet::from(vec![FeatureSpace::with_features('a', [(5, 1.1)])]);
/// let example = session.import_example(&set)?;
///
/// // Export copies back out; the engine keeps nothing of the caller's.
/// assert_eq!(session.export_example(example)?, set);
/// session.finish_example(example)?;
/// session.finish()?;
/// # Ok(())
/// # }
/// ```
pub struct Hopper<E: LearnerEngine = SgdEngine> {
    /// Parsed engine configuration.
    options: EngineOptions,
    /// Hashing context shared by text intake and the import path.
    ctx: HashContext,
    /// The learner behind the seam.
    engine: E,
    /// Engine-owned example records.
    store: ExampleStore,
    /// In-progress stream, if any.
    stream: Option<ExampleStream>,
    /// Examples learned over the session's lifetime.
    learned: u64,
}

impl Hopper<SgdEngine> {
    /// Start a session with the bundled SGD engine.
    ///
    /// Parses the option string, derives the hashing context, and hands
    /// the options to the engine, which may decline them.
    pub fn initialize(config: &str) -> Result<Self> {
        Self::with_engine(config, SgdEngine::new())
    }
}

impl<E: LearnerEngine> Hopper<E> {
    /// Start a session around a caller-supplied engine.
    pub fn with_engine(config: &str, mut engine: E) -> Result<Self> {
        let options = EngineOptions::parse(config)?;
        let ctx = HashContext::from_options(&options);
        engine.accept(&options)?;
        debug!(
            engine = engine.describe(),
            bits = options.bits,
            "session initialized"
        );

        Ok(Self {
            options,
            ctx,
            engine,
            store: ExampleStore::new(),
            stream: None,
            learned: 0,
        })
    }

    pub fn options(&self) -> &EngineOptions {
        &self.options
    }

    pub fn hash_context(&self) -> &HashContext {
        &self.ctx
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Number of live (not yet released) examples.
    pub fn live_examples(&self) -> usize {
        self.store.live_count()
    }

    // =========================================================================
    // Hashing
    // =========================================================================

    /// Hash a namespace name into the seed for its features.
    pub fn hash_namespace(&self, name: &str) -> u64 {
        self.ctx.hash_namespace(name)
    }

    /// Hash a feature token under a namespace seed into a weight index.
    pub fn hash_feature(&self, token: &str, seed: u64) -> u64 {
        self.ctx.hash_feature(token, seed)
    }

    // =========================================================================
    // Example Lifecycle
    // =========================================================================

    /// Parse an example line, hash its features, and take ownership of the
    /// resulting record.
    pub fn read_example(&mut self, text: &str) -> Result<ExampleHandle> {
        let parsed = parse_text_example(text)?;
        let record = ExampleRecord::from_parsed(&parsed, &self.ctx);
        Ok(self.store.insert(record))
    }

    /// Copy an externally built, pre-hashed feature-space set into an
    /// engine-owned record. The caller's set is not retained.
    ///
    /// Indices outside the configured address space are refused with
    /// [`HopperError::EngineRejected`]; nothing is masked on this path,
    /// since silently folding a foreign index would train the wrong weight.
    pub fn import_example(&mut self, set: &FeatureSpaceSet) -> Result<ExampleHandle> {
        for space in set {
            for feature in &space.features {
                if feature.index > self.ctx.mask() {
                    return Err(HopperError::EngineRejected(format!(
                        "feature index {} outside the {}-bit address space",
                        feature.index,
                        self.ctx.bits()
                    )));
                }
            }
        }
        Ok(self.store.insert(ExampleRecord::from_spaces(set)))
    }

    /// Copy an example's feature spaces back out. The returned set is the
    /// caller's to keep; dropping it releases nothing engine-side.
    pub fn export_example(&self, handle: ExampleHandle) -> Result<FeatureSpaceSet> {
        Ok(self.store.get(handle)?.spaces().clone())
    }

    /// Serialize an example's feature spaces into the interchange layout,
    /// at the index width of this session's address space.
    pub fn export_bytes(&self, handle: ExampleHandle) -> Result<Vec<u8>> {
        codec::encode(self.store.get(handle)?.spaces(), self.ctx.index_width())
    }

    /// Import an example from the interchange layout.
    pub fn import_bytes(&mut self, bytes: &[u8]) -> Result<ExampleHandle> {
        let set = codec::decode(bytes, self.ctx.index_width())?;
        self.import_example(&set)
    }

    /// Label an example after creation. Each record labels at most once;
    /// a handle whose record was already released is no longer an example
    /// at all and fails with [`HopperError::InvalidExample`].
    pub fn attach_label(&mut self, handle: ExampleHandle, label: f32) -> Result<()> {
        match self.store.get_mut(handle) {
            Ok(record) => record.set_label(label),
            Err(HopperError::AlreadyReleased) => Err(HopperError::InvalidExample),
            Err(other) => Err(other),
        }
    }

    /// Run one example through the engine; labeled records update the
    /// model, unlabeled ones only score. Returns the prediction made
    /// before any update. A record may be learned repeatedly.
    pub fn learn(&mut self, handle: ExampleHandle) -> Result<f32> {
        let record = self.store.get(handle)?;
        let score = self.engine.learn(record)?;
        self.store.get_mut(handle)?.note_learn();
        self.learned += 1;
        Ok(score)
    }

    /// Release an example's record back to the session.
    pub fn finish_example(&mut self, handle: ExampleHandle) -> Result<()> {
        self.store.release(handle)
    }

    // =========================================================================
    // Streaming
    // =========================================================================

    /// Begin streaming examples from a record source. One stream at a
    /// time; ending it makes the session streamable again.
    pub fn start_stream<S: RecordSource + Send + 'static>(&mut self, source: S) -> Result<()> {
        if self.stream.is_some() {
            return Err(HopperError::InvalidState("stream already started"));
        }
        self.stream = Some(ExampleStream::new(
            Box::new(source),
            self.options.ring_size,
        ));
        Ok(())
    }

    /// Pull the next streamed example. `Ok(None)` is the terminal answer
    /// once the source is exhausted; it repeats until [`end_stream`].
    ///
    /// [`end_stream`]: Self::end_stream
    pub fn next_stream_example(&mut self) -> Result<Option<ExampleHandle>> {
        let Some(stream) = self.stream.as_mut() else {
            return Err(HopperError::InvalidState("no stream in progress"));
        };
        stream.next(&mut self.store, &self.ctx)
    }

    /// End the stream, releasing queued examples the caller never pulled.
    pub fn end_stream(&mut self) -> Result<StreamSummary> {
        let Some(stream) = self.stream.take() else {
            return Err(HopperError::InvalidState("no stream in progress"));
        };
        let summary = stream.finish(&mut self.store)?;
        debug!(
            produced = summary.produced,
            skipped = summary.skipped,
            "stream ended"
        );
        Ok(summary)
    }

    /// Drive a whole source through the engine: pull, learn, release,
    /// repeat. Honors the `--examples` bound by stopping the pulls; the
    /// stream itself never sees the cap, and whatever it parsed ahead is
    /// released by the closing [`end_stream`](Self::end_stream).
    pub fn learn_stream<S: RecordSource + Send + 'static>(
        &mut self,
        source: S,
    ) -> Result<StreamSummary> {
        self.start_stream(source)?;
        let cap = self.options.max_examples;

        let mut consumed = 0u64;
        while cap.map_or(true, |max| consumed < max) {
            let Some(handle) = self.next_stream_example()? else {
                break;
            };
            self.learn(handle)?;
            self.finish_example(handle)?;
            consumed += 1;
        }

        self.end_stream()
    }

    // =========================================================================
    // Session End
    // =========================================================================

    /// Close the session, verifying nothing leaked.
    ///
    /// Fails with [`HopperError::InvalidState`] while examples are still
    /// live. Dropping a session instead of calling `finish` releases
    /// everything just the same; `finish` is the checked path.
    pub fn finish(self) -> Result<()> {
        if self.store.live_count() > 0 {
            return Err(HopperError::InvalidState(
                "cannot finish while examples are live",
            ));
        }
        debug!(learned = self.learned, "session finished");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_initialize() {
        let session = Hopper::initialize("--hash all -q st --noconstant -b 20")
            .expect("session starts");
        assert_eq!(session.options().bits, 20);
        assert_eq!(session.options().quadratic, vec![('s', 't')]);
        assert_eq!(session.engine().describe(), "sgd");
        assert_eq!(session.live_examples(), 0);
    }

    #[test]
    fn test_bad_config_fails_initialize() {
        assert!(matches!(
            Hopper::initialize("-b zero"),
            Err(HopperError::Config(_))
        ));
        assert!(matches!(
            Hopper::initialize("-b 29"),
            Err(HopperError::EngineRejected(_))
        ));
    }

    #[test]
    fn test_read_example_hashes_both_spaces() {
        let mut session = Hopper::initialize("--hash all -b 18").expect("session starts");
        let example = session
            .read_example("1 |s p^the_man w^the w^man |t p^un_homme w^un w^homme")
            .expect("line reads");

        let set = session.export_example(example).expect("exports");
        assert_eq!(set.len(), 2);
        assert_eq!(set.get(0).map(|s| s.name), Some('s'));
        assert_eq!(set.get(1).map(|s| s.name), Some('t'));
        for space in &set {
            assert_eq!(space.len(), 3);
            assert!(space.features.iter().all(|f| f.value == 1.0));
            assert!(space.features.iter().all(|f| f.index <= session.hash_context().mask()));
        }

        session.finish_example(example).expect("releases");
        session.finish().expect("clean finish");
    }

    #[test]
    fn test_import_export_symmetry() {
        let mut session = Hopper::initialize("-b 18").expect("session starts");
        let set = FeatureSpaceSet::from(vec![
            FeatureSpace::with_features('a', [(5, 1.1), (17, -0.5)]),
            FeatureSpace::with_features('b', [(1000, 2.0)]),
        ]);

        let example = session.import_example(&set).expect("imports");
        assert_eq!(session.export_example(example).expect("exports"), set);
        session.finish_example(example).expect("releases");
    }

    #[test]
    fn test_import_rejects_foreign_address_space() {
        let mut session = Hopper::initialize("-b 10").expect("session starts");
        let set = FeatureSpaceSet::from(vec![FeatureSpace::with_features('a', [(1024, 1.0)])]);

        let err = session.import_example(&set).expect_err("index out of range");
        assert!(matches!(err, HopperError::EngineRejected(_)));
        assert_eq!(session.live_examples(), 0, "rejected import must not allocate");
    }

    #[test]
    fn test_interchange_bytes_round_trip() {
        let mut session = Hopper::initialize("-b 18").expect("session starts");
        let set = FeatureSpaceSet::from(vec![FeatureSpace::with_features('a', [(5, 1.1)])]);

        let first = session.import_example(&set).expect("imports");
        let bytes = session.export_bytes(first).expect("serializes");
        assert_eq!(bytes.len(), 13);

        let copy = session.import_bytes(&bytes).expect("deserializes");
        assert_eq!(session.export_example(copy).expect("exports"), set);

        session.finish_example(first).expect("releases");
        session.finish_example(copy).expect("releases");
    }

    #[test]
    fn test_double_release_and_stale_handles() {
        let mut session = Hopper::initialize("-b 10").expect("session starts");
        let example = session.read_example("|s a").expect("reads");

        session.finish_example(example).expect("first release");
        assert!(matches!(
            session.finish_example(example),
            Err(HopperError::AlreadyReleased)
        ));

        // Slot reuse turns the old handle stale.
        let replacement = session.read_example("|s b").expect("reads");
        assert!(matches!(
            session.learn(example),
            Err(HopperError::InvalidExample)
        ));
        session.finish_example(replacement).expect("releases");
    }

    #[test]
    fn test_attach_label_after_release_is_invalid() {
        let mut session = Hopper::initialize("-b 10").expect("session starts");
        let set = FeatureSpaceSet::from(vec![FeatureSpace::with_features('a', [(1, 1.0)])]);
        let example = session.import_example(&set).expect("imports");
        session.finish_example(example).expect("releases");

        // The record is gone, so the handle no longer names an example.
        assert!(matches!(
            session.attach_label(example, 1.0),
            Err(HopperError::InvalidExample)
        ));
    }

    #[test]
    fn test_label_attaches_once_per_record() {
        let mut session = Hopper::initialize("-b 10").expect("session starts");

        let unlabeled = session.read_example("|s a").expect("reads");
        session.attach_label(unlabeled, 1.0).expect("first label");
        assert!(matches!(
            session.attach_label(unlabeled, 0.0),
            Err(HopperError::AlreadyLabeled)
        ));

        let labeled = session.read_example("1 |s a").expect("reads");
        assert!(matches!(
            session.attach_label(labeled, 0.0),
            Err(HopperError::AlreadyLabeled)
        ));

        session.finish_example(unlabeled).expect("releases");
        session.finish_example(labeled).expect("releases");
    }

    #[test]
    fn test_repeated_learn_converges() {
        let mut session =
            Hopper::initialize("-b 10 --noconstant -l 0.5").expect("session starts");
        let example = session.read_example("1 |s f").expect("reads");

        assert_eq!(session.learn(example).expect("learns"), 0.0);
        assert_eq!(session.learn(example).expect("learns"), 0.5);
        assert_eq!(session.learn(example).expect("learns"), 0.75);

        session.finish_example(example).expect("releases");
    }

    #[test]
    fn test_finish_refuses_live_examples() {
        let mut leaky = Hopper::initialize("-b 10").expect("session starts");
        leaky.read_example("|s a").expect("reads");
        assert!(matches!(
            leaky.finish(),
            Err(HopperError::InvalidState(_))
        ));

        let mut clean = Hopper::initialize("-b 10").expect("session starts");
        let example = clean.read_example("|s a").expect("reads");
        clean.finish_example(example).expect("releases");
        clean.finish().expect("clean finish");
    }

    #[test]
    fn test_stream_pulls_then_idempotent_end() {
        let mut session = Hopper::initialize("-b 18").expect("session starts");
        let records: Vec<String> = (0..10).map(|i| format!("1 |s f{}", i)).collect();
        session
            .start_stream(MemorySource::new(records))
            .expect("stream starts");

        let mut pulled = 0;
        while let Some(handle) = session.next_stream_example().expect("pulls") {
            session.learn(handle).expect("learns");
            session.finish_example(handle).expect("releases");
            pulled += 1;
        }
        assert_eq!(pulled, 10);

        // Exhausted stream keeps answering "done" until ended.
        assert!(session.next_stream_example().expect("pulls").is_none());
        assert!(session.next_stream_example().expect("pulls").is_none());

        let summary = session.end_stream().expect("stream ends");
        assert_eq!(summary, StreamSummary { produced: 10, skipped: 0 });

        assert!(matches!(
            session.next_stream_example(),
            Err(HopperError::InvalidState(_))
        ));
        session.finish().expect("clean finish");
    }

    #[test]
    fn test_one_stream_at_a_time() {
        let mut session = Hopper::initialize("-b 10").expect("session starts");
        session
            .start_stream(MemorySource::new(["|s a"]))
            .expect("first stream starts");
        assert!(matches!(
            session.start_stream(MemorySource::new(["|s b"])),
            Err(HopperError::InvalidState(_))
        ));

        session.end_stream().expect("stream ends");
        session
            .start_stream(MemorySource::new(["|s c"]))
            .expect("session is streamable again");
        session.end_stream().expect("stream ends");
    }

    #[test]
    fn test_session_with_live_stream_is_send() {
        fn assert_send<T: Send>(_: &T) {}

        let mut session = Hopper::initialize("-b 10").expect("session starts");
        session
            .start_stream(MemorySource::new(["|s a"]))
            .expect("stream starts");
        assert_send(&session);
        session.end_stream().expect("stream ends");
    }

    #[test]
    fn test_learn_stream_honors_example_cap() {
        let records: Vec<String> = (0..10).map(|i| format!("1 |s f{}", i)).collect();

        let mut capped = Hopper::initialize("-b 18 --examples 3").expect("session starts");
        let summary = capped
            .learn_stream(MemorySource::new(records.clone()))
            .expect("driver runs");
        assert_eq!(summary.produced, 3);
        assert_eq!(capped.live_examples(), 0, "parse-ahead must be released");
        capped.finish().expect("clean finish");

        let mut uncapped = Hopper::initialize("-b 18").expect("session starts");
        let summary = uncapped
            .learn_stream(MemorySource::new(records))
            .expect("driver runs");
        assert_eq!(summary.produced, 10);
        uncapped.finish().expect("clean finish");
    }

    #[test]
    fn test_learn_stream_skips_malformed_records() {
        let mut session = Hopper::initialize("-b 18").expect("session starts");
        let summary = session
            .learn_stream(MemorySource::new([
                "1 |s alpha",
                "not an example",
                "0 |s beta",
            ]))
            .expect("driver runs");

        assert_eq!(summary, StreamSummary { produced: 2, skipped: 1 });
        session.finish().expect("clean finish");
    }
}
