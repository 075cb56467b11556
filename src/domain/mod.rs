mod account;
mod cart;
mod entry;
mod ledger;
mod money;
mod order;
mod product;
mod topup;

pub use account::*;
pub use cart::*;
pub use entry::*;
pub use ledger::*;
pub use money::*;
pub use order::*;
pub use product::*;
pub use topup::*;
