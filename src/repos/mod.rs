//! Repos is a module responsible for interacting with postgres db

#[macro_use]
pub mod acl;
pub mod apps;
pub mod cart;
pub mod combos;
pub mod commissions;
pub mod error;
pub mod gamification;
pub mod order_bumps;
pub mod orders;
pub mod products;
pub mod repo_factory;
pub mod types;
pub mod users;

pub use self::acl::*;
pub use self::apps::*;
pub use self::cart::*;
pub use self::combos::*;
pub use self::commissions::*;
pub use self::error::*;
pub use self::gamification::*;
pub use self::order_bumps::*;
pub use self::orders::*;
pub use self::products::*;
pub use self::repo_factory::*;
pub use self::types::*;
pub use self::users::*;
