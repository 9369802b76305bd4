//! Human-readable rendering of attribute values.
//!
//! Stored values are always in the field's base unit (kg, m, m², m³, min).
//! For display, the largest scale whose factor does not exceed the magnitude
//! is picked and the value is rounded half away from zero to two decimals.

use crate::AttributeField;
use std::fmt;

type Scale = (f64, &'static str);

const MASS: &[Scale] = &[(0.001, "g"), (1.0, "kg"), (1000.0, "t")];
const LENGTH: &[Scale] = &[(0.001, "mm"), (1.0, "m"), (1000.0, "km")];
const AREA: &[Scale] = &[(1e-6, "mm²"), (0.01, "dm²"), (1.0, "m²"), (10_000.0, "ha")];
const VOLUME: &[Scale] = &[(1e-9, "mm³"), (1e-6, "cm³"), (0.001, "dm³"), (1.0, "m³")];
const DURATION: &[Scale] = &[(1.0 / 60.0, "sec"), (1.0, "min"), (60.0, "hrs")];

/// A value scaled into a display unit.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Humanized {
    pub value: f64,
    pub unit: &'static str,
}

impl fmt::Display for Humanized {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.unit.is_empty() {
            write!(f, "{:.2}", self.value)
        } else {
            write!(f, "{:.2} {}", self.value, self.unit)
        }
    }
}

fn scales(field: AttributeField) -> Option<&'static [Scale]> {
    match field {
        AttributeField::Mass => Some(MASS),
        AttributeField::Length => Some(LENGTH),
        AttributeField::Area => Some(AREA),
        AttributeField::Volume => Some(VOLUME),
        AttributeField::Duration => Some(DURATION),
        AttributeField::Cost | AttributeField::Other => None,
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Scale `value` (in the field's base unit) for display.
///
/// Magnitudes below the smallest scale use the smallest scale. The sign is
/// kept; the scale is chosen on the absolute value.
#[must_use]
pub fn humanize(field: AttributeField, value: f64) -> Humanized {
    let Some(table) = scales(field) else {
        return Humanized {
            value: round2(value),
            unit: field.base_unit(),
        };
    };

    let magnitude = value.abs();
    let mut chosen = table[0];
    for &scale in table {
        if magnitude >= scale.0 {
            chosen = scale;
        } else {
            break;
        }
    }

    Humanized {
        value: round2(value / chosen.0),
        unit: chosen.1,
    }
}
