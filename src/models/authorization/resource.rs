//! Enum for resources available in ACLs
use std::fmt;

#[derive(Clone, Copy, PartialEq, Eq, Debug, Hash)]
pub enum Resource {
    Users,
    Products,
    Orders,
    Commissions,
    CartItems,
    Combos,
    OrderBumps,
    Apps,
    Gamification,
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Resource::Users => write!(f, "users"),
            Resource::Products => write!(f, "products"),
            Resource::Orders => write!(f, "orders"),
            Resource::Commissions => write!(f, "commissions"),
            Resource::CartItems => write!(f, "cart items"),
            Resource::Combos => write!(f, "combos"),
            Resource::OrderBumps => write!(f, "order bumps"),
            Resource::Apps => write!(f, "apps"),
            Resource::Gamification => write!(f, "gamification"),
        }
    }
}
