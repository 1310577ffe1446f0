// ── Command intake ──
//
// Parses write-topic publishes into typed commands. Payloads are
// forgiving: bare scalars ("on", "50", "PURPLE"), JSON objects, hex or
// decimal colors all work, matching what automation frontends actually
// send.

use std::str::FromStr;

use serde_json::Value;

use spalink_core::Command;
use spalink_core::model::{ColorRgb, HeatMode, LightMode, TargetId};

/// A parsed intake: which spa, what to do.
#[derive(Debug, Clone, PartialEq)]
pub struct IntakeCommand {
    pub target: TargetId,
    pub command: Command,
}

/// Parse a publish on a `<...>/set` topic into a command.
///
/// Returns `None` for topics outside the scheme or payloads that don't
/// parse; the caller logs and drops those rather than failing the
/// whole intake loop.
pub fn parse_command(base: &str, topic: &str, payload: &str) -> Option<IntakeCommand> {
    let rest = topic.strip_prefix(base)?.strip_prefix('/')?;
    let parts: Vec<&str> = rest.split('/').collect();
    if parts.last().copied() != Some("set") {
        return None;
    }

    let target = TargetId::from(*parts.first()?);
    let command = match parts.get(1..parts.len() - 1)? {
        ["heater", "target_temperature"] => Command::SetTargetTemperature {
            celsius: parse_number(payload)?,
        },
        ["heater", "mode"] => Command::SetHeatMode {
            mode: HeatMode::from_str(&scalar_string(payload)?.to_uppercase()).ok()?,
        },
        ["pumps", pump_id, "state"] => Command::SetPumpState {
            pump_id: (*pump_id).to_owned(),
            on: parse_switch(payload)?,
        },
        ["lights", zone_id, "state"] => {
            let zone = parse_zone(zone_id)?;
            if parse_switch(payload)? {
                Command::SetLightMode {
                    zone,
                    mode: LightMode::White,
                    intensity: None,
                }
            } else {
                Command::SetLightMode {
                    zone,
                    mode: LightMode::Off,
                    intensity: None,
                }
            }
        }
        ["lights", zone_id, "mode"] => {
            let zone = parse_zone(zone_id)?;
            let object: Option<Value> = serde_json::from_str(payload).ok();
            let (mode_str, intensity) = match &object {
                Some(Value::Object(map)) => (
                    map.get("mode")?.as_str()?.to_owned(),
                    map.get("intensity")
                        .and_then(Value::as_u64)
                        .and_then(|i| u8::try_from(i).ok()),
                ),
                _ => (payload.trim().to_uppercase(), None),
            };
            Command::SetLightMode {
                zone,
                mode: LightMode::from_str(&mode_str).ok()?,
                intensity,
            }
        }
        ["lights", zone_id, "brightness"] => {
            let rounded = parse_number(payload)?.clamp(0.0, 100.0).round();
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let percent = rounded as u8;
            Command::SetLightBrightness {
                zone: parse_zone(zone_id)?,
                percent,
            }
        }
        ["lights", zone_id, "color"] => Command::SetLightColor {
            zone: parse_zone(zone_id)?,
            color: parse_rgb(payload)?,
        },
        ["sweep"] => match payload.trim().to_lowercase().as_str() {
            "start" | "resume" => Command::StartSweep { resume: true },
            "start_fresh" | "fresh" => Command::StartSweep { resume: false },
            "stop" => Command::StopSweep,
            _ => return None,
        },
        _ => return None,
    };

    Some(IntakeCommand { target, command })
}

// ── Payload parsing helpers ─────────────────────────────────────────

/// "zone_1" -> 1, or a bare "1".
fn parse_zone(zone_id: &str) -> Option<u8> {
    zone_id
        .strip_prefix("zone_")
        .unwrap_or(zone_id)
        .parse()
        .ok()
}

fn parse_switch(payload: &str) -> Option<bool> {
    match payload.trim().to_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => {
            // {"state": "on"}
            let value: Value = serde_json::from_str(payload).ok()?;
            parse_switch(value.get("state")?.as_str()?)
        }
    }
}

/// Extract a bare scalar string from a forgiving payload: a bare token,
/// a JSON string, or a JSON object's `{"mode": ...}` / `{"value": ...}`.
fn scalar_string(payload: &str) -> Option<String> {
    let trimmed = payload.trim();
    if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
        if let Some(s) = value.as_str() {
            return Some(s.to_owned());
        }
        if let Some(s) = value
            .get("mode")
            .or_else(|| value.get("value"))
            .and_then(Value::as_str)
        {
            return Some(s.to_owned());
        }
    }
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_owned())
}

fn parse_number(payload: &str) -> Option<f64> {
    if let Ok(n) = payload.trim().parse() {
        return Some(n);
    }
    let value: Value = serde_json::from_str(payload).ok()?;
    value
        .as_f64()
        .or_else(|| value.get("value")?.as_f64())
        .or_else(|| value.get("temperature")?.as_f64())
}

/// Parse a color in any of the accepted shapes:
/// `#ff0000`, `ff0000`, `255,0,0`, `255 0 0`,
/// `{"red":255,"green":0,"blue":0}`, `{"r":255,"g":0,"b":0}`.
pub fn parse_rgb(payload: &str) -> Option<ColorRgb> {
    let payload = payload.trim();

    if payload.starts_with('{') {
        let value: Value = serde_json::from_str(payload).ok()?;
        let channel = |long: &str, short: &str| -> Option<u8> {
            value
                .get(long)
                .or_else(|| value.get(short))
                .and_then(Value::as_u64)
                .map(|v| u8::try_from(v.min(255)).unwrap_or(255))
        };
        return Some(ColorRgb::new(
            channel("red", "r")?,
            channel("green", "g")?,
            channel("blue", "b")?,
        ));
    }

    let hex = payload.strip_prefix('#').unwrap_or(payload);
    if hex.len() == 6 && hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Some(ColorRgb::new(
            u8::from_str_radix(&hex[0..2], 16).ok()?,
            u8::from_str_radix(&hex[2..4], 16).ok()?,
            u8::from_str_radix(&hex[4..6], 16).ok()?,
        ));
    }

    let parts: Vec<&str> = payload
        .split([',', ' '])
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() == 3 {
        return Some(ColorRgb::new(
            parts[0].trim().parse().ok()?,
            parts[1].trim().parse().ok()?,
            parts[2].trim().parse().ok()?,
        ));
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn parse(topic: &str, payload: &str) -> Option<IntakeCommand> {
        parse_command("spalink", topic, payload)
    }

    #[test]
    fn pump_state_from_scalar() {
        let intake = parse("spalink/spa-1/pumps/P1/state/set", "on").unwrap();
        assert_eq!(intake.target, TargetId::from("spa-1"));
        assert_eq!(
            intake.command,
            Command::SetPumpState {
                pump_id: "P1".into(),
                on: true,
            }
        );
    }

    #[test]
    fn light_mode_from_scalar_and_json() {
        let scalar = parse("spalink/spa-1/lights/zone_2/mode/set", "color_wheel").unwrap();
        assert_eq!(
            scalar.command,
            Command::SetLightMode {
                zone: 2,
                mode: LightMode::ColorWheel,
                intensity: None,
            }
        );

        let json = parse(
            "spalink/spa-1/lights/zone_2/mode/set",
            r#"{"mode": "RED", "intensity": 75}"#,
        )
        .unwrap();
        assert_eq!(
            json.command,
            Command::SetLightMode {
                zone: 2,
                mode: LightMode::Red,
                intensity: Some(75),
            }
        );
    }

    #[test]
    fn temperature_accepts_scalar_and_object() {
        assert_eq!(
            parse("spalink/spa-1/heater/target_temperature/set", "38.5")
                .unwrap()
                .command,
            Command::SetTargetTemperature { celsius: 38.5 }
        );
        assert_eq!(
            parse(
                "spalink/spa-1/heater/target_temperature/set",
                r#"{"temperature": 37.0}"#
            )
            .unwrap()
            .command,
            Command::SetTargetTemperature { celsius: 37.0 }
        );
    }

    #[test]
    fn color_formats() {
        let red = ColorRgb::new(255, 0, 0);
        assert_eq!(parse_rgb("#ff0000"), Some(red));
        assert_eq!(parse_rgb("ff0000"), Some(red));
        assert_eq!(parse_rgb("255,0,0"), Some(red));
        assert_eq!(parse_rgb("255 0 0"), Some(red));
        assert_eq!(parse_rgb(r#"{"red":255,"green":0,"blue":0}"#), Some(red));
        assert_eq!(parse_rgb(r#"{"r":255,"g":0,"b":0}"#), Some(red));
        assert_eq!(parse_rgb("not-a-color"), None);
    }

    #[test]
    fn sweep_control_payloads() {
        assert_eq!(
            parse("spalink/spa-1/sweep/set", "start").unwrap().command,
            Command::StartSweep { resume: true }
        );
        assert_eq!(
            parse("spalink/spa-1/sweep/set", "start_fresh").unwrap().command,
            Command::StartSweep { resume: false }
        );
        assert_eq!(
            parse("spalink/spa-1/sweep/set", "stop").unwrap().command,
            Command::StopSweep
        );
    }

    #[test]
    fn junk_topics_and_payloads_are_dropped() {
        assert!(parse("spalink/spa-1/pumps/P1/state", "on").is_none()); // read topic
        assert!(parse("other/spa-1/pumps/P1/state/set", "on").is_none()); // wrong base
        assert!(parse("spalink/spa-1/lights/zone_1/mode/set", "DISCO").is_none());
        assert!(parse("spalink/spa-1/sweep/set", "dance").is_none());
    }
}
