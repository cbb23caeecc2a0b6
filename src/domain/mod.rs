mod arithmetic;
mod ledger;
mod money;
mod operation;
mod record;
mod user;

pub use arithmetic::*;
pub use ledger::*;
pub use money::*;
pub use operation::*;
pub use record::*;
pub use user::*;
