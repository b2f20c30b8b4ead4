use std::fmt;

/// Version of the cluster's partition-ownership view.
///
/// `major` moves on every membership change. `minor` moves on changes that only touch
/// affinity (late affinity assignment, baseline and activation changes) and resets to zero
/// whenever `major` moves. Versions are totally ordered by `(major, minor)`.
#[derive(Copy, Clone, Debug, Default, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct TopologyVersion {
    major: u64,
    minor: u32,
}

impl TopologyVersion {
    pub const ZERO: TopologyVersion = TopologyVersion { major: 0, minor: 0 };

    pub fn new(major: u64, minor: u32) -> Self {
        TopologyVersion { major, minor }
    }

    pub fn major(&self) -> u64 {
        self.major
    }

    pub fn minor(&self) -> u32 {
        self.minor
    }

    pub fn next_major(&self) -> Self {
        TopologyVersion {
            major: self.major + 1,
            minor: 0,
        }
    }

    pub fn next_minor(&self) -> Self {
        TopologyVersion {
            major: self.major,
            minor: self.minor + 1,
        }
    }

    pub fn bump(&self, bump: VersionBump) -> Self {
        match bump {
            VersionBump::Major => self.next_major(),
            VersionBump::Minor => self.next_minor(),
        }
    }
}

impl fmt::Display for TopologyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum VersionBump {
    Major,
    Minor,
}

/// TopologyVersionClock hands out the version of every discovery event. The discovery service
/// owns exactly one clock, so every node observes the same version for the same event.
#[derive(Debug, Default)]
pub struct TopologyVersionClock {
    current: TopologyVersion,
}

impl TopologyVersionClock {
    pub fn new() -> Self {
        TopologyVersionClock::default()
    }

    pub fn current(&self) -> TopologyVersion {
        self.current
    }

    pub fn tick(&mut self, bump: VersionBump) -> TopologyVersion {
        self.current = self.current.bump(bump);
        self.current
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_is_major_then_minor() {
        let v1_0 = TopologyVersion::new(1, 0);
        let v1_3 = TopologyVersion::new(1, 3);
        let v2_0 = TopologyVersion::new(2, 0);

        assert!(v1_0 < v1_3);
        assert!(v1_3 < v2_0);
        assert!(TopologyVersion::ZERO < v1_0);
        assert_eq!(v1_3.next_major(), v2_0);
        assert_eq!(v1_0.next_minor().next_minor(), TopologyVersion::new(1, 2));
    }

    #[test]
    fn clock_is_monotonic() {
        let mut clock = TopologyVersionClock::new();
        let mut observed = vec![clock.current()];
        for bump in [
            VersionBump::Major,
            VersionBump::Minor,
            VersionBump::Minor,
            VersionBump::Major,
            VersionBump::Minor,
        ]
        .iter()
        {
            observed.push(clock.tick(*bump));
        }

        assert!(observed.windows(2).all(|w| w[0] < w[1]));
        assert_eq!(clock.current(), TopologyVersion::new(2, 1));
    }

    #[test]
    fn display() {
        assert_eq!(TopologyVersion::new(4, 1).to_string(), "4.1");
    }
}
