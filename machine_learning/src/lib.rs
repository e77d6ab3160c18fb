pub mod arch;
pub mod initialization;
pub mod optimization;
pub mod schedule;
mod test;

pub use arch::{ModelId, Sequential};
pub use optimization::{Sgd, SgdState};
pub use schedule::LrSchedule;
