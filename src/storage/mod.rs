mod repository;

pub use repository::*;

/// A numbered schema change with its rollback script.
#[derive(Debug, Clone, Copy)]
pub struct Migration {
    pub version: i64,
    pub name: &'static str,
    pub up: &'static str,
    pub down: &'static str,
}

/// All schema migrations, in the order they are applied.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "initial",
        up: include_str!("migrations/001_initial.sql"),
        down: include_str!("migrations/001_initial.down.sql"),
    },
    Migration {
        version: 2,
        name: "order_api_status",
        up: include_str!("migrations/002_order_api_status.sql"),
        down: include_str!("migrations/002_order_api_status.down.sql"),
    },
    Migration {
        version: 3,
        name: "elite_tier",
        up: include_str!("migrations/003_elite_tier.sql"),
        down: include_str!("migrations/003_elite_tier.down.sql"),
    },
];
