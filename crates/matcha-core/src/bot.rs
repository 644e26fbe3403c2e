//! The bot identity the simulator is currently logged in as.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotIdentity {
    pub id: String,
    pub name: String,
}

impl BotIdentity {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Shared, swappable handle to the active bot.
///
/// Codecs read it at render time, so re-assigning it changes the `self`
/// identity of every event rendered afterwards.
#[derive(Debug, Clone, Default)]
pub struct ActiveBot {
    inner: Arc<RwLock<Option<BotIdentity>>>,
}

impl ActiveBot {
    pub fn new(identity: Option<BotIdentity>) -> Self {
        Self {
            inner: Arc::new(RwLock::new(identity)),
        }
    }

    /// Replaces the identity, returning the previous one.
    pub fn assign(&self, identity: Option<BotIdentity>) -> Option<BotIdentity> {
        std::mem::replace(&mut *self.inner.write(), identity)
    }

    pub fn get(&self) -> Option<BotIdentity> {
        self.inner.read().clone()
    }

    /// The bot id, or an empty string when no bot is assigned.
    pub fn id(&self) -> String {
        self.inner
            .read()
            .as_ref()
            .map(|b| b.id.clone())
            .unwrap_or_default()
    }

    pub fn is_assigned(&self) -> bool {
        self.inner.read().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_assign_is_shared() {
        let bot = ActiveBot::default();
        let view = bot.clone();
        assert_eq!(view.id(), "");
        assert!(bot.assign(Some(BotIdentity::new("10000", "matcha"))).is_none());
        assert_eq!(view.id(), "10000");
        assert!(view.is_assigned());
    }
}
