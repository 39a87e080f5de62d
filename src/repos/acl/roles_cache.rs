//! RolesCache is a module that caches received from db information about user and his role
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::models::{Role, UserId};

/// Role of every active user seen since start. Suspended users are never cached.
#[derive(Default, Clone)]
pub struct RolesCacheImpl {
    roles_cache: Arc<Mutex<HashMap<UserId, Role>>>,
}

impl RolesCacheImpl {
    pub fn get(&self, user_id: UserId) -> Option<Role> {
        self.roles_cache.lock().ok().and_then(|hash_map| hash_map.get(&user_id).cloned())
    }

    pub fn clear(&self) {
        if let Ok(mut hash_map) = self.roles_cache.lock() {
            hash_map.clear();
        }
    }

    pub fn remove(&self, user_id: UserId) {
        if let Ok(mut hash_map) = self.roles_cache.lock() {
            hash_map.remove(&user_id);
        }
    }

    pub fn contains(&self, user_id: UserId) -> bool {
        self.roles_cache
            .lock()
            .map(|hash_map| hash_map.contains_key(&user_id))
            .unwrap_or(false)
    }

    pub fn add_role(&self, user_id: UserId, role: Role) {
        if let Ok(mut hash_map) = self.roles_cache.lock() {
            hash_map.insert(user_id, role);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_is_shared_between_clones() {
        let cache = RolesCacheImpl::default();
        let clone = cache.clone();
        let user_id = UserId::generate();

        assert_eq!(cache.get(user_id), None);
        clone.add_role(user_id, Role::Producer);
        assert!(cache.contains(user_id));
        assert_eq!(cache.get(user_id), Some(Role::Producer));

        cache.remove(user_id);
        assert!(!clone.contains(user_id));

        clone.add_role(user_id, Role::Admin);
        clone.clear();
        assert_eq!(cache.get(user_id), None);
    }
}
