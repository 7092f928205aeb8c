use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector2 {
    pub x: f32,
    pub y: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// Pitch/yaw/roll triple in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rotator {
    pub pitch: f32,
    pub yaw: f32,
    pub roll: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PropertyKind {
    Bool,
    Int,
    Float,
    Byte,
    String,
    Vector2,
    Vector3,
    Rotation,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PropertyValue {
    Bool(bool),
    Int(i32),
    Float(f32),
    Byte(u8),
    String(String),
    Vector2(Vector2),
    Vector3(Vector3),
    Rotation(Rotator),
}

impl PropertyValue {
    pub fn kind(&self) -> PropertyKind {
        match self {
            PropertyValue::Bool(_) => PropertyKind::Bool,
            PropertyValue::Int(_) => PropertyKind::Int,
            PropertyValue::Float(_) => PropertyKind::Float,
            PropertyValue::Byte(_) => PropertyKind::Byte,
            PropertyValue::String(_) => PropertyKind::String,
            PropertyValue::Vector2(_) => PropertyKind::Vector2,
            PropertyValue::Vector3(_) => PropertyKind::Vector3,
            PropertyValue::Rotation(_) => PropertyKind::Rotation,
        }
    }

    /// Text form stored in the persistent document.
    pub fn to_text(&self) -> String {
        match self {
            PropertyValue::Bool(value) => {
                if *value {
                    "True".to_string()
                } else {
                    "False".to_string()
                }
            }
            PropertyValue::Int(value) => value.to_string(),
            PropertyValue::Float(value) => value.to_string(),
            PropertyValue::Byte(value) => value.to_string(),
            PropertyValue::String(value) => value.clone(),
            PropertyValue::Vector2(v) => format!("X={} Y={}", v.x, v.y),
            PropertyValue::Vector3(v) => format!("X={} Y={} Z={}", v.x, v.y, v.z),
            PropertyValue::Rotation(r) => format!("P={} Y={} R={}", r.pitch, r.yaw, r.roll),
        }
    }

    pub fn parse_as(kind: PropertyKind, text: &str) -> Option<Self> {
        let trimmed = text.trim();
        match kind {
            PropertyKind::Bool => match trimmed.to_ascii_lowercase().as_str() {
                "true" | "1" => Some(PropertyValue::Bool(true)),
                "false" | "0" => Some(PropertyValue::Bool(false)),
                _ => None,
            },
            PropertyKind::Int => trimmed.parse::<i32>().ok().map(PropertyValue::Int),
            PropertyKind::Float => trimmed.parse::<f32>().ok().map(PropertyValue::Float),
            PropertyKind::Byte => trimmed.parse::<u8>().ok().map(PropertyValue::Byte),
            PropertyKind::String => Some(PropertyValue::String(text.to_string())),
            PropertyKind::Vector2 => {
                let [x, y] = parse_labeled_components(trimmed, ["X", "Y"])?;
                Some(PropertyValue::Vector2(Vector2 { x, y }))
            }
            PropertyKind::Vector3 => {
                let [x, y, z] = parse_labeled_components(trimmed, ["X", "Y", "Z"])?;
                Some(PropertyValue::Vector3(Vector3 { x, y, z }))
            }
            PropertyKind::Rotation => {
                let [pitch, yaw, roll] = parse_labeled_components(trimmed, ["P", "Y", "R"])?;
                Some(PropertyValue::Rotation(Rotator { pitch, yaw, roll }))
            }
        }
    }

    /// Equality used for change detection. Floats compare by value, except
    /// that NaN is considered equal to NaN so it does not re-fire every poll.
    pub fn same_as(&self, other: &PropertyValue) -> bool {
        match (self, other) {
            (PropertyValue::Bool(a), PropertyValue::Bool(b)) => a == b,
            (PropertyValue::Int(a), PropertyValue::Int(b)) => a == b,
            (PropertyValue::Float(a), PropertyValue::Float(b)) => same_f32(*a, *b),
            (PropertyValue::Byte(a), PropertyValue::Byte(b)) => a == b,
            (PropertyValue::String(a), PropertyValue::String(b)) => a == b,
            (PropertyValue::Vector2(a), PropertyValue::Vector2(b)) => {
                same_f32(a.x, b.x) && same_f32(a.y, b.y)
            }
            (PropertyValue::Vector3(a), PropertyValue::Vector3(b)) => {
                same_f32(a.x, b.x) && same_f32(a.y, b.y) && same_f32(a.z, b.z)
            }
            (PropertyValue::Rotation(a), PropertyValue::Rotation(b)) => {
                same_f32(a.pitch, b.pitch) && same_f32(a.yaw, b.yaw) && same_f32(a.roll, b.roll)
            }
            _ => false,
        }
    }
}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_text())
    }
}

fn same_f32(a: f32, b: f32) -> bool {
    a == b || (a.is_nan() && b.is_nan())
}

fn parse_labeled_components<const N: usize>(text: &str, labels: [&str; N]) -> Option<[f32; N]> {
    let mut out = [0.0f32; N];
    let mut seen = [false; N];
    for token in text.split_whitespace() {
        let (label, raw) = token.split_once('=')?;
        let slot = labels
            .iter()
            .position(|candidate| candidate.eq_ignore_ascii_case(label))?;
        if seen[slot] {
            return None;
        }
        out[slot] = raw.trim_end_matches(',').parse::<f32>().ok()?;
        seen[slot] = true;
    }
    if seen.iter().all(|flag| *flag) {
        Some(out)
    } else {
        None
    }
}
