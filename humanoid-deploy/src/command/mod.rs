//! Operator command handling: locomotion modes, per-mode limits, the command
//! shaper and the command state shared with the input thread.

pub mod mode;
pub mod shaper;
pub mod shared;

pub use mode::{Mode, ModeLimitTable, ModeLimits};
pub use shaper::{CommandShaper, RawAxes};
pub use shared::{CommandState, SharedCommand};
