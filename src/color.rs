use std::collections::{BTreeMap, BTreeSet};

use eframe::egui::Color32;
use palette::{Hsl, IntoColor, Srgb};

use mcs_tools::Value;

fn hsl_to_color32(hue: f32, saturation: f32, lightness: f32) -> Color32 {
    let rgb: Srgb = Hsl::new(hue, saturation, lightness).into_color();
    Color32::from_rgb(
        (rgb.red * 255.0) as u8,
        (rgb.green * 255.0) as u8,
        (rgb.blue * 255.0) as u8,
    )
}

// ---------------------------------------------------------------------------
// Color palette generator
// ---------------------------------------------------------------------------

/// Generates `n` visually distinct colours using evenly spaced hues.
pub fn generate_palette(n: usize) -> Vec<Color32> {
    (0..n)
        .map(|i| hsl_to_color32((i as f32 / n as f32) * 360.0, 0.75, 0.55))
        .collect()
}

// ---------------------------------------------------------------------------
// Categorical map: column value → Color32
// ---------------------------------------------------------------------------

/// Maps unique values of a chosen column (e.g. orbit number) to distinct colours.
#[derive(Debug, Clone)]
pub struct ColorMap {
    mapping: BTreeMap<Value, Color32>,
    default_color: Color32,
}

impl ColorMap {
    pub fn new(unique_values: &BTreeSet<Value>) -> Self {
        let palette = generate_palette(unique_values.len());
        let mapping = unique_values.iter().cloned().zip(palette).collect();
        ColorMap {
            mapping,
            default_color: Color32::GRAY,
        }
    }

    pub fn color_for(&self, value: &Value) -> Color32 {
        self.mapping
            .get(value)
            .copied()
            .unwrap_or(self.default_color)
    }
}

// ---------------------------------------------------------------------------
// Sequential scale: radiance → Color32
// ---------------------------------------------------------------------------

/// Blue (low) to red (high) colour scale over `[min, max]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ColorScale {
    pub min: f64,
    pub max: f64,
}

impl ColorScale {
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Position of `value` in the scale, clamped to `[0, 1]`.
    pub fn fraction(&self, value: f64) -> f64 {
        let span = self.max - self.min;
        if span.abs() < f64::EPSILON {
            return 0.5;
        }
        ((value - self.min) / span).clamp(0.0, 1.0)
    }

    pub fn color_for(&self, value: Option<f64>) -> Color32 {
        match value {
            Some(v) if v.is_finite() => {
                let hue = 240.0 * (1.0 - self.fraction(v)) as f32;
                hsl_to_color32(hue, 0.85, 0.5)
            }
            _ => Color32::TRANSPARENT,
        }
    }

    /// `n` evenly spaced (value, colour) stops for a colour bar.
    pub fn stops(&self, n: usize) -> Vec<(f64, Color32)> {
        let last = n.saturating_sub(1).max(1) as f64;
        (0..n)
            .map(|i| {
                let v = self.min + (self.max - self.min) * i as f64 / last;
                (v, self.color_for(Some(v)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn palette_is_distinct() {
        let p = generate_palette(5);
        assert_eq!(p.len(), 5);
        assert_ne!(p[0], p[1]);
        assert!(generate_palette(0).is_empty());
    }

    #[test]
    fn unknown_values_get_default() {
        let values: BTreeSet<Value> = [Value::Int(1), Value::Int(2)].into_iter().collect();
        let map = ColorMap::new(&values);
        assert_eq!(map.color_for(&Value::Int(3)), Color32::GRAY);
        assert_ne!(map.color_for(&Value::Int(1)), map.color_for(&Value::Int(2)));
    }

    #[test]
    fn scale_clamps_and_blanks_missing() {
        let scale = ColorScale::new(0.0, 10.0);
        assert_eq!(scale.fraction(-5.0), 0.0);
        assert_eq!(scale.fraction(20.0), 1.0);
        assert_eq!(scale.color_for(None), Color32::TRANSPARENT);
        assert_eq!(scale.color_for(Some(0.0)), scale.stops(3)[0].1);
        assert_eq!(ColorScale::new(1.0, 1.0).fraction(1.0), 0.5);
    }
}
