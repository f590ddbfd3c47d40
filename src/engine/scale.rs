const SIMILARITY_EXPONENT: f32 = 1.8;
const WEIGHT_EXPONENT: f32 = 2.2;

const RADIUS_RANGE: (f32, f32) = (3.0, 15.0);
const FILL_OPACITY_RANGE: (f32, f32) = (0.35, 1.0);
const EDGE_OPACITY_RANGE: (f32, f32) = (0.08, 0.38);
const EDGE_WIDTH_RANGE: (f32, f32) = (0.3, 2.5);
const LINK_STRENGTH_RANGE: (f32, f32) = (0.05, 0.40);
const LINK_DISTANCE_RANGE: (f32, f32) = (120.0, 300.0);

/// Clamped power scale onto `[0, 1]`.
///
/// The curve is applied to the domain bounds and the input alike (sign is
/// preserved), then interpolated linearly between the transformed bounds. A
/// collapsed domain is widened by one unit on each side and mapped linearly,
/// so its only value lands exactly on 0.5.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PowScale {
    low: f32,
    high: f32,
    exponent: f32,
    collapsed: bool,
}

fn signed_pow(value: f32, exponent: f32) -> f32 {
    value.signum() * value.abs().powf(exponent)
}

impl PowScale {
    pub fn from_values(values: impl IntoIterator<Item = f32>, exponent: f32) -> Self {
        let mut low = f32::INFINITY;
        let mut high = f32::NEG_INFINITY;
        for value in values.into_iter().filter(|value| value.is_finite()) {
            low = low.min(value);
            high = high.max(value);
        }

        if !low.is_finite() || !high.is_finite() {
            return Self {
                low: 0.0,
                high: 1.0,
                exponent,
                collapsed: false,
            };
        }

        if low == high {
            return Self {
                low: low - 1.0,
                high: high + 1.0,
                exponent,
                collapsed: true,
            };
        }

        Self {
            low,
            high,
            exponent,
            collapsed: false,
        }
    }

    pub fn domain(&self) -> (f32, f32) {
        (self.low, self.high)
    }

    pub fn normalize(&self, value: f32) -> f32 {
        let value = if value.is_finite() { value } else { 0.0 };

        let t = if self.collapsed {
            (value - self.low) / (self.high - self.low)
        } else {
            let low = signed_pow(self.low, self.exponent);
            let high = signed_pow(self.high, self.exponent);
            let span = high - low;
            if span.abs() <= f32::EPSILON || !span.is_finite() {
                0.5
            } else {
                (signed_pow(value, self.exponent) - low) / span
            }
        };

        if t.is_finite() { t.clamp(0.0, 1.0) } else { 0.5 }
    }
}

fn lerp(range: (f32, f32), t: f32) -> f32 {
    range.0 + (range.1 - range.0) * t
}

/// Visual and physical mappings derived from the currently visible data.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ScaleSet {
    pub similarity: PowScale,
    pub weight: PowScale,
}

impl ScaleSet {
    pub fn from_visible(
        similarities: impl IntoIterator<Item = f32>,
        weights: impl IntoIterator<Item = f32>,
    ) -> Self {
        Self {
            similarity: PowScale::from_values(similarities, SIMILARITY_EXPONENT),
            weight: PowScale::from_values(weights, WEIGHT_EXPONENT),
        }
    }

    pub fn radius_of(&self, similarity: f32) -> f32 {
        lerp(RADIUS_RANGE, self.similarity.normalize(similarity))
    }

    pub fn fill_opacity_of(&self, similarity: f32) -> f32 {
        lerp(FILL_OPACITY_RANGE, self.similarity.normalize(similarity))
    }

    pub fn edge_opacity_of(&self, weight: f32) -> f32 {
        lerp(EDGE_OPACITY_RANGE, self.weight.normalize(weight))
    }

    pub fn edge_width_of(&self, weight: f32) -> f32 {
        lerp(EDGE_WIDTH_RANGE, self.weight.normalize(weight))
    }

    pub fn link_strength_of(&self, weight: f32) -> f32 {
        lerp(LINK_STRENGTH_RANGE, self.weight.normalize(weight))
    }

    /// Weak links are stretched further apart.
    pub fn link_distance_of(&self, weight: f32) -> f32 {
        lerp(LINK_DISTANCE_RANGE, 1.0 - self.weight.normalize(weight))
    }
}
