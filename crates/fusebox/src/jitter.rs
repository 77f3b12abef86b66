// Copyright (c) Microsoft Corporation.

/// Uniform jitter applied to cache refresh deadlines.
///
/// Many processes sharing a cached key would otherwise all see its refresh
/// deadline pass at the same instant and stampede the dependency together.
/// Each observer instead shifts the deadline by an offset drawn uniformly
/// from `[-spread, +spread]` seconds, spreading the refresh attempts out.
///
/// Tests pin the draw to a fixed fraction so freshness decisions become
/// deterministic.
#[derive(Debug, Clone, Default)]
pub(crate) struct JitterSource {
    #[cfg(test)]
    pinned: Option<f64>,
}

impl JitterSource {
    /// Draws a deadline offset in `[-spread, +spread]` seconds.
    pub fn offset(&self, spread: f64) -> f64 {
        (self.draw() * 2.0 - 1.0) * spread
    }

    /// The underlying draw in `[0, 1)`. Jitter has no security requirements,
    /// so a lightweight non-cryptographic generator is sufficient.
    fn draw(&self) -> f64 {
        #[cfg(test)]
        if let Some(fraction) = self.pinned {
            return fraction;
        }

        fastrand::f64()
    }

    /// A source whose every draw is the given fraction of the unit interval:
    /// `0.0` yields `-spread`, `0.5` yields zero, `1.0` yields `+spread`.
    #[cfg(test)]
    pub fn pinned(fraction: f64) -> Self {
        Self {
            pinned: Some(fraction),
        }
    }
}
