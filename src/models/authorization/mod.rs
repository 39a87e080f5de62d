//! Models for working with autorization (acl - access control list)

pub mod action;
pub mod permission;
pub mod resource;
pub mod role;
pub mod scope;

pub use self::action::Action;
pub use self::permission::Permission;
pub use self::resource::Resource;
pub use self::role::{ParseRoleError, Role};
pub use self::scope::Scope;
