// ── In-flight write exclusion ──
//
// One keyed registry backs both exclusions the system needs: two
// concurrent executes on the same (target, property), and an external
// command landing on a property a sweep unit currently owns. Claims are
// RAII guards, so a panicking or cancelled holder releases its key.

use std::sync::Arc;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use crate::error::CoreError;
use crate::model::CommandKey;

/// Registry of (target, property) keys with a write cycle in flight.
#[derive(Debug, Default)]
pub struct InFlightRegistry {
    keys: DashMap<CommandKey, ()>,
}

impl InFlightRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim a key, failing fast if it is already owned.
    pub fn try_claim(self: &Arc<Self>, key: CommandKey) -> Result<InFlightClaim, CoreError> {
        match self.keys.entry(key.clone()) {
            Entry::Occupied(_) => Err(CoreError::Busy {
                key: key.to_string(),
            }),
            Entry::Vacant(slot) => {
                slot.insert(());
                Ok(InFlightClaim {
                    registry: Arc::clone(self),
                    key,
                })
            }
        }
    }

    /// Whether a key is currently claimed.
    pub fn is_claimed(&self, key: &CommandKey) -> bool {
        self.keys.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// RAII claim on one key. Dropping releases it.
#[derive(Debug)]
pub struct InFlightClaim {
    registry: Arc<InFlightRegistry>,
    key: CommandKey,
}

impl InFlightClaim {
    pub fn key(&self) -> &CommandKey {
        &self.key
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.registry.keys.remove(&self.key);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{PropertyKey, TargetId};

    fn key(zone: u8) -> CommandKey {
        CommandKey::new(TargetId::from("spa-1"), PropertyKey::LightSetting { zone })
    }

    #[test]
    fn second_claim_on_same_key_is_busy() {
        let registry = Arc::new(InFlightRegistry::new());
        let _claim = registry.try_claim(key(1)).unwrap();

        let err = registry.try_claim(key(1)).unwrap_err();
        assert!(matches!(err, CoreError::Busy { .. }));
    }

    #[test]
    fn different_keys_do_not_conflict() {
        let registry = Arc::new(InFlightRegistry::new());
        let _a = registry.try_claim(key(1)).unwrap();
        let _b = registry.try_claim(key(2)).unwrap();
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn drop_releases_the_key() {
        let registry = Arc::new(InFlightRegistry::new());
        {
            let _claim = registry.try_claim(key(1)).unwrap();
            assert!(registry.is_claimed(&key(1)));
        }
        assert!(!registry.is_claimed(&key(1)));
        // Reclaimable after release.
        assert!(registry.try_claim(key(1)).is_ok());
    }
}
