use crate::topology::ClusterNode;

/// Protocol capabilities a node can advertise when it joins.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Feature {
    ExchangeFreeSwitch,
}

impl Feature {
    fn bit(self) -> u64 {
        match self {
            Feature::ExchangeFreeSwitch => 1 << 0,
        }
    }
}

/// Feature-support bitset negotiated at join time.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Hash)]
pub struct FeatureSet(u64);

impl FeatureSet {
    pub fn empty() -> Self {
        FeatureSet(0)
    }

    /// Everything this build of the protocol supports.
    pub fn current() -> Self {
        FeatureSet::empty().with(Feature::ExchangeFreeSwitch)
    }

    pub fn from_bits(bits: u64) -> Self {
        FeatureSet(bits)
    }

    pub fn bits(&self) -> u64 {
        self.0
    }

    pub fn with(self, feature: Feature) -> Self {
        FeatureSet(self.0 | feature.bit())
    }

    pub fn without(self, feature: Feature) -> Self {
        FeatureSet(self.0 & !feature.bit())
    }

    pub fn supports(&self, feature: Feature) -> bool {
        self.0 & feature.bit() != 0
    }
}

/// Returns the nodes that do not advertise `feature`. Empty means the whole set supports it.
pub fn nodes_lacking<'a, I>(nodes: I, feature: Feature) -> Vec<&'a ClusterNode>
where
    I: IntoIterator<Item = &'a ClusterNode>,
{
    nodes
        .into_iter()
        .filter(|node| !node.features().supports(feature))
        .collect()
}
