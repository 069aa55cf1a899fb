//! Sparse feature data model.
//!
//! A [`Feature`] is a hashed weight index paired with a value; a
//! [`FeatureSpace`] groups features under a single-character namespace;
//! a [`FeatureSpaceSet`] is the ordered collection a whole example carries
//! across the interchange boundary. All three are plain owned data:
//! building, copying, and comparing them never touches a store or an
//! engine.

// =============================================================================
// Feature
// =============================================================================

/// A single hashed feature.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Feature {
    /// Hashed address into the engine's weight vector.
    pub index: u64,
    /// Feature value; text parsing defaults this to `1.0`.
    pub value: f32,
}

impl Feature {
    pub fn new(index: u64, value: f32) -> Self {
        Self { index, value }
    }
}

// =============================================================================
// Feature Space
// =============================================================================

/// A namespace's worth of features, in insertion order.
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureSpace {
    /// Single-character namespace identifier. The binary interchange
    /// layout carries it as one byte, so non-ASCII names fail encoding.
    pub name: char,
    pub features: Vec<Feature>,
}

impl FeatureSpace {
    /// An empty space under the given namespace.
    pub fn new(name: char) -> Self {
        Self {
            name,
            features: Vec::new(),
        }
    }

    /// A space populated from `(index, value)` pairs.
    pub fn with_features(name: char, features: impl IntoIterator<Item = (u64, f32)>) -> Self {
        Self {
            name,
            features: features
                .into_iter()
                .map(|(index, value)| Feature::new(index, value))
                .collect(),
        }
    }

    pub fn push(&mut self, index: u64, value: f32) {
        self.features.push(Feature::new(index, value));
    }

    pub fn len(&self) -> usize {
        self.features.len()
    }

    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }
}

// =============================================================================
// Feature Space Set
// =============================================================================

/// Ordered collection of feature spaces: one example's worth of input.
///
/// Position is meaningful: encoding, import, and export all preserve set
/// order exactly, so structural equality doubles as a round-trip check.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct FeatureSpaceSet {
    spaces: Vec<FeatureSpace>,
}

impl FeatureSpaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, space: FeatureSpace) {
        self.spaces.push(space);
    }

    pub fn get(&self, position: usize) -> Option<&FeatureSpace> {
        self.spaces.get(position)
    }

    pub fn spaces(&self) -> &[FeatureSpace] {
        &self.spaces
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FeatureSpace> {
        self.spaces.iter()
    }

    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    /// Total feature count across all spaces.
    pub fn total_features(&self) -> usize {
        self.spaces.iter().map(FeatureSpace::len).sum()
    }
}

impl From<Vec<FeatureSpace>> for FeatureSpaceSet {
    fn from(spaces: Vec<FeatureSpace>) -> Self {
        Self { spaces }
    }
}

impl FromIterator<FeatureSpace> for FeatureSpaceSet {
    fn from_iter<I: IntoIterator<Item = FeatureSpace>>(iter: I) -> Self {
        Self {
            spaces: iter.into_iter().collect(),
        }
    }
}

impl<'a> IntoIterator for &'a FeatureSpaceSet {
    type Item = &'a FeatureSpace;
    type IntoIter = std::slice::Iter<'a, FeatureSpace>;

    fn into_iter(self) -> Self::IntoIter {
        self.spaces.iter()
    }
}
