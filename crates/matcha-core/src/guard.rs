//! Permission checks and per-entity serialization of membership mutations.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use crate::error::StoreResult;
use crate::store::{Role, Store};

/// The simulator operator. Passes every permission check.
pub const SYSTEM_OPERATOR: &str = "0";

/// Whether `user_id` holds at least `required` in `group_id`.
pub async fn role_check(
    store: &dyn Store,
    required: Role,
    group_id: &str,
    user_id: &str,
) -> StoreResult<bool> {
    if user_id == SYSTEM_OPERATOR {
        return Ok(true);
    }
    Ok(store
        .member(group_id, user_id)
        .await?
        .is_some_and(|m| m.role >= required))
}

/// Whether `operator_id` may act on `target_id`: it must hold `required` and
/// strictly outrank the target. Owners are never a valid target.
pub async fn can_manage(
    store: &dyn Store,
    required: Role,
    group_id: &str,
    operator_id: &str,
    target_id: &str,
) -> StoreResult<bool> {
    let target_role = store.member(group_id, target_id).await?.map(|m| m.role);
    if target_role == Some(Role::Owner) {
        return Ok(operator_id == SYSTEM_OPERATOR);
    }
    if operator_id == SYSTEM_OPERATOR {
        return Ok(true);
    }
    let Some(operator) = store.member(group_id, operator_id).await? else {
        return Ok(false);
    };
    Ok(operator.role >= required && target_role.is_none_or(|t| operator.role > t))
}

/// Keyed async locks for `(group, user)` pairs.
#[derive(Default)]
pub struct EntityLocks {
    locks: Mutex<HashMap<(String, String), Arc<AsyncMutex<()>>>>,
}

impl EntityLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits for exclusive access to `(group_id, user_id)`.
    ///
    /// Use an empty `user_id` for group-wide state.
    pub async fn lock(&self, group_id: &str, user_id: &str) -> OwnedMutexGuard<()> {
        let slot = {
            let mut locks = self.locks.lock();
            locks.retain(|_, m| Arc::strong_count(m) > 1);
            locks
                .entry((group_id.to_owned(), user_id.to_owned()))
                .or_default()
                .clone()
        };
        slot.lock_owned().await
    }

    #[cfg(test)]
    fn tracked(&self) -> usize {
        self.locks.lock().len()
    }
}
