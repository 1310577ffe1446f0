// ── Capability sweep ──
//
// Drives the command executor across the whole zone × mode × level
// space to discover which combinations this spa actually honors.

mod engine;
mod plan;
mod report;

pub use engine::{SweepEngine, SweepSettings, SweepStore};
pub use plan::{DEFAULT_LEVELS, SweepPlan, SweepUnit};
pub use report::{ModeSupport, SweepReport, UnitRecord, ZoneCapabilities};
