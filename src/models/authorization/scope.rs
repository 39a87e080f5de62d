//! Enum for scopes available in ACLs

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Scope {
    /// Resource with any id
    All,

    /// Resource with id of the owner equal to the id of the current user.
    /// For orders both the buyer and the producer are owners.
    Owned,
}
