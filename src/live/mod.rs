// =============================================================================
// Live chart pipeline: epochs, the shared view, the refresh timer and the
// session that drives them.
// =============================================================================

pub mod epoch;
pub mod scheduler;
pub mod session;
pub mod view;

pub use epoch::Epoch;
pub use scheduler::SchedulerState;
pub use session::{ChartSession, SelectionChange};
pub use view::{ChartSnapshot, ChartView, Selection};
