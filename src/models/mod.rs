//! Models contains all structures that are used in different
//! modules of the app

pub mod amount;
pub mod app;
pub mod auth;
pub mod authorization;
pub mod cart;
pub mod combo;
pub mod commission;
pub mod dashboard;
pub mod gamification;
pub mod order;
pub mod order_bump;
pub mod pagination;
pub mod product;
pub mod user;

pub use self::amount::*;
pub use self::app::*;
pub use self::auth::*;
pub use self::authorization::*;
pub use self::cart::*;
pub use self::combo::*;
pub use self::commission::*;
pub use self::dashboard::*;
pub use self::gamification::*;
pub use self::order::*;
pub use self::order_bump::*;
pub use self::pagination::*;
pub use self::product::*;
pub use self::user::*;
