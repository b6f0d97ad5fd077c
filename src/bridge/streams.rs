use std::collections::BTreeMap;

use tokio_util::sync::{CancellationToken, DropGuard};

use super::Capability;

/// Scoped ownership of one running stream subscription.
///
/// Dropping the handle cancels the task driving the subscription.
#[derive(Debug)]
struct StreamHandle {
    device_id: String,
    generation: u64,
    _cancel_on_drop: DropGuard,
}

/// A freshly acquired subscription slot.
#[derive(Debug)]
pub(crate) struct StreamLease {
    pub(crate) generation: u64,
    pub(crate) cancel: CancellationToken,
}

/// At most one live subscription per capability.
#[derive(Debug, Default)]
pub struct StreamSessions {
    active: BTreeMap<Capability, StreamHandle>,
    next_generation: u64,
}

impl StreamSessions {
    /// Returns whether a subscription is held for the capability.
    #[must_use]
    pub fn is_active(&self, capability: Capability) -> bool {
        self.active.contains_key(&capability)
    }

    /// Returns every capability with a held subscription.
    pub fn active_capabilities(&self) -> impl Iterator<Item = Capability> + '_ {
        self.active.keys().copied()
    }

    /// Claims the capability's slot. Returns `None` when a subscription is already held.
    pub(crate) fn acquire(
        &mut self,
        capability: Capability,
        device_id: &str,
        parent: &CancellationToken,
    ) -> Option<StreamLease> {
        if self.is_active(capability) {
            return None;
        }

        self.next_generation += 1;
        let generation = self.next_generation;
        let cancel = parent.child_token();
        self.active.insert(
            capability,
            StreamHandle {
                device_id: device_id.to_string(),
                generation,
                _cancel_on_drop: cancel.clone().drop_guard(),
            },
        );

        Some(StreamLease { generation, cancel })
    }

    /// Releases the capability's subscription. Returns `true` if one was held.
    pub(crate) fn release(&mut self, capability: Capability) -> bool {
        self.active.remove(&capability).is_some()
    }

    /// Releases the subscription only if it is still the one started as `generation`.
    pub(crate) fn release_if_current(&mut self, capability: Capability, generation: u64) -> bool {
        let is_current = self
            .active
            .get(&capability)
            .is_some_and(|handle| handle.generation == generation);
        if is_current {
            self.active.remove(&capability);
        }
        is_current
    }

    /// Releases every subscription bound to one device and returns their capabilities.
    pub(crate) fn release_device(&mut self, device_id: &str) -> Vec<Capability> {
        let released: Vec<Capability> = self
            .active
            .iter()
            .filter(|(_, handle)| handle.device_id == device_id)
            .map(|(capability, _)| *capability)
            .collect();
        for capability in &released {
            self.active.remove(capability);
        }
        released
    }

    /// Releases every subscription.
    pub(crate) fn release_all(&mut self) {
        self.active.clear();
    }
}
