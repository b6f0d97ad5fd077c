use std::collections::BTreeMap;

use strum::IntoEnumIterator;

use super::Capability;

/// Which capabilities the SDK has declared ready for streaming.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct FeatureReadiness {
    ready: BTreeMap<Capability, bool>,
}

impl Default for FeatureReadiness {
    fn default() -> Self {
        Self {
            ready: Capability::iter()
                .map(|capability| (capability, false))
                .collect(),
        }
    }
}

impl FeatureReadiness {
    /// Marks one capability ready. Returns `true` if it was not ready before.
    pub(crate) fn mark_ready(&mut self, capability: Capability) -> bool {
        let previous = self.ready.insert(capability, true);
        previous != Some(true)
    }

    /// Returns whether a capability may be streamed.
    #[must_use]
    pub fn is_ready(&self, capability: Capability) -> bool {
        self.ready.get(&capability).copied().unwrap_or(false)
    }

    /// Resets every capability to not ready.
    pub(crate) fn clear(&mut self) {
        for ready in self.ready.values_mut() {
            *ready = false;
        }
    }

    /// Returns the capabilities currently ready, in declaration order.
    pub fn ready_capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.ready
            .iter()
            .filter(|(_, ready)| **ready)
            .map(|(capability, _)| *capability)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    use super::*;

    #[test]
    fn starts_with_nothing_ready() {
        let readiness = FeatureReadiness::default();
        for capability in Capability::iter() {
            assert!(!readiness.is_ready(capability));
        }
        assert_eq!(0, readiness.ready_capabilities().count());
    }

    #[rstest]
    #[case(Capability::Hr)]
    #[case(Capability::Ppi)]
    fn mark_ready_is_idempotent(#[case] capability: Capability) {
        let mut readiness = FeatureReadiness::default();

        assert!(readiness.mark_ready(capability));
        assert!(!readiness.mark_ready(capability));
        assert!(readiness.is_ready(capability));
        assert_eq!(vec![capability], readiness.ready_capabilities().collect::<Vec<_>>());
    }

    #[test]
    fn clear_resets_every_flag() {
        let mut readiness = FeatureReadiness::default();
        readiness.mark_ready(Capability::Ecg);
        readiness.mark_ready(Capability::Acc);

        readiness.clear();

        assert_eq!(FeatureReadiness::default(), readiness);
    }
}
