//! Repos is a module responsible for interacting with access control lists

#[macro_use]
pub mod macros;
pub mod roles_cache;

pub use self::roles_cache::RolesCacheImpl;

use std::collections::HashMap;
use std::rc::Rc;

use failure::Error as FailureError;

use crate::models::authorization::*;
use crate::models::UserId;

/// Access control list for objects of type `T`
pub trait Acl<T> {
    /// Tells if `resource` may be accessed with `action`.
    /// `obj` is the object being accessed, if there is one.
    fn allows(
        &self,
        resource: Resource,
        action: Action,
        scope_checker: &dyn CheckScope<T>,
        obj: Option<&T>,
    ) -> Result<bool, FailureError>;
}

/// Implemented by repos to tell if an object belongs to a user
pub trait CheckScope<T> {
    fn is_in_scope(&self, user_id: UserId, scope: &Scope, obj: Option<&T>) -> bool;
}

pub fn check<T>(
    acl: &dyn Acl<T>,
    resource: Resource,
    action: Action,
    scope_checker: &dyn CheckScope<T>,
    obj: Option<&T>,
) -> Result<(), FailureError> {
    acl.allows(resource, action, scope_checker, obj).and_then(|allowed| {
        if allowed {
            Ok(())
        } else {
            Err(format_err!("Denied request to do {} on {}", action, resource))
        }
    })
}

/// ApplicationAcl contains main logic for manipulation with resources
#[derive(Clone)]
pub struct ApplicationAcl {
    acls: Rc<HashMap<Role, Vec<Permission>>>,
    role: Role,
    user_id: UserId,
}

impl ApplicationAcl {
    pub fn new(role: Role, user_id: UserId) -> Self {
        let mut hash = HashMap::new();
        hash.insert(
            Role::Admin,
            vec![
                permission!(Resource::Users),
                permission!(Resource::Products),
                permission!(Resource::Orders),
                permission!(Resource::Commissions),
                permission!(Resource::CartItems),
                permission!(Resource::Combos),
                permission!(Resource::OrderBumps),
                permission!(Resource::Apps),
                permission!(Resource::Gamification),
            ],
        );
        hash.insert(
            Role::Producer,
            vec![
                permission!(Resource::Users, Action::All, Scope::Owned),
                permission!(Resource::Products, Action::Read),
                permission!(Resource::Products, Action::Write, Scope::Owned),
                permission!(Resource::Orders, Action::All, Scope::Owned),
                permission!(Resource::Commissions, Action::Read, Scope::Owned),
                permission!(Resource::CartItems, Action::All, Scope::Owned),
                permission!(Resource::Combos, Action::Read),
                permission!(Resource::Combos, Action::Write, Scope::Owned),
                permission!(Resource::OrderBumps, Action::Read),
                permission!(Resource::OrderBumps, Action::Write, Scope::Owned),
                permission!(Resource::Apps, Action::Read),
                permission!(Resource::Apps, Action::Write, Scope::Owned),
                permission!(Resource::Gamification, Action::Read),
            ],
        );
        hash.insert(
            Role::Buyer,
            vec![
                permission!(Resource::Users, Action::All, Scope::Owned),
                permission!(Resource::Products, Action::Read),
                permission!(Resource::Orders, Action::All, Scope::Owned),
                permission!(Resource::CartItems, Action::All, Scope::Owned),
                permission!(Resource::Combos, Action::Read),
                permission!(Resource::OrderBumps, Action::Read),
                permission!(Resource::Apps, Action::Read),
                permission!(Resource::Gamification, Action::Read),
            ],
        );
        ApplicationAcl {
            acls: Rc::new(hash),
            role,
            user_id,
        }
    }
}

impl<T> Acl<T> for ApplicationAcl {
    fn allows(
        &self,
        resource: Resource,
        action: Action,
        scope_checker: &dyn CheckScope<T>,
        obj: Option<&T>,
    ) -> Result<bool, FailureError> {
        let empty: Vec<Permission> = Vec::new();
        let user_id = self.user_id;
        let acls = self
            .acls
            .get(&self.role)
            .unwrap_or(&empty)
            .iter()
            .filter(|permission| (permission.resource == resource) && ((permission.action == action) || (permission.action == Action::All)))
            .filter(|permission| scope_checker.is_in_scope(user_id, &permission.scope, obj));

        Ok(acls.count() > 0)
    }
}

/// Allows everything, used by the service itself (webhooks, reconciliation, registration)
#[derive(Clone, Default)]
pub struct SystemAcl;

impl<T> Acl<T> for SystemAcl {
    fn allows(
        &self,
        _resource: Resource,
        _action: Action,
        _scope_checker: &dyn CheckScope<T>,
        _obj: Option<&T>,
    ) -> Result<bool, FailureError> {
        Ok(true)
    }
}

/// Anonymous visitors may only read the public catalog
#[derive(Clone, Default)]
pub struct UnauthorizedAcl;

impl<T> Acl<T> for UnauthorizedAcl {
    fn allows(
        &self,
        resource: Resource,
        action: Action,
        _scope_checker: &dyn CheckScope<T>,
        _obj: Option<&T>,
    ) -> Result<bool, FailureError> {
        if action != Action::Read {
            return Ok(false);
        }
        match resource {
            Resource::Products | Resource::Combos | Resource::OrderBumps | Resource::Apps | Resource::Gamification => Ok(true),
            _ => Ok(false),
        }
    }
}
