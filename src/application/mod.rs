// Application layer - use cases and orchestration.
// Every wallet mutation goes through VendService so that balance changes and
// ledger entries are always written together.

pub mod dashboard;
pub mod error;
pub mod service;
pub mod topup;

pub use dashboard::*;
pub use error::*;
pub use service::*;
pub use topup::*;
