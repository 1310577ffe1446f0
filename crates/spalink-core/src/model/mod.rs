// ── Domain model ──
//
// Typed views of the spa the rest of the crate reasons about.
// Wire shapes from `spalink-api` are converted here once, at the
// gateway boundary, so no other module touches cloud JSON.

mod ids;
mod light;
mod property;
mod pump;
mod snapshot;

pub use ids::TargetId;
pub use light::{ColorRgb, LightMode, LightSetting, Volatility};
pub use property::{CommandKey, PropertyKey, PropertyValue};
pub use pump::{HeatMode, PumpState, SwitchState};
pub use snapshot::{
    ComponentKind, DeviceSnapshot, HeaterSnapshot, LightSnapshot, PumpSnapshot,
};
