//! Monitored item categories

use std::fmt;

/// Category of a monitored item
///
/// Pools and delegations live in separate tables but share the same shape,
/// so every item operation takes the kind instead of being duplicated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    Pool,
    Delegation,
}

impl ItemKind {
    pub const ALL: [ItemKind; 2] = [ItemKind::Pool, ItemKind::Delegation];

    pub(crate) fn table(&self) -> &'static str {
        match self {
            ItemKind::Pool => "pools",
            ItemKind::Delegation => "delegations",
        }
    }

    pub(crate) fn id_column(&self) -> &'static str {
        match self {
            ItemKind::Pool => "pool_id",
            ItemKind::Delegation => "delegation_id",
        }
    }

    /// Singular, lowercase name used in user-facing text
    pub fn name(&self) -> &'static str {
        match self {
            ItemKind::Pool => "pool",
            ItemKind::Delegation => "delegation",
        }
    }

    /// Plural, lowercase name used in user-facing text
    pub fn plural(&self) -> &'static str {
        match self {
            ItemKind::Pool => "pools",
            ItemKind::Delegation => "delegations",
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
