//! Exponentially weighted score trend

use serde::{Deserialize, Serialize};

/// Direction of the smoothed score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendDirection {
    Improving,
    Flat,
    Declining,
}

/// EWMA over per-round `overall` scores. Reporting only; convergence is
/// decided on raw scores.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoreTrend {
    alpha: f32,
    /// Smoothed value after each observation
    pub values: Vec<f32>,
}

impl ScoreTrend {
    pub fn new(alpha: f32) -> Self {
        Self {
            alpha: alpha.clamp(f32::EPSILON, 1.0),
            values: Vec::new(),
        }
    }

    /// Fold in one observation and return the new smoothed value
    pub fn observe(&mut self, score: f32) -> f32 {
        let next = match self.values.last() {
            Some(prev) => self.alpha * score + (1.0 - self.alpha) * prev,
            None => score,
        };
        self.values.push(next);
        next
    }

    pub fn current(&self) -> Option<f32> {
        self.values.last().copied()
    }

    /// Compare the last two smoothed values against `tolerance`
    pub fn direction(&self, tolerance: f32) -> TrendDirection {
        match self.values.as_slice() {
            [.., prev, last] if last - prev > tolerance => TrendDirection::Improving,
            [.., prev, last] if prev - last > tolerance => TrendDirection::Declining,
            _ => TrendDirection::Flat,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_value_is_taken_as_is() {
        let mut trend = ScoreTrend::new(0.5);
        assert_eq!(trend.observe(0.6), 0.6);
        assert_eq!(trend.direction(0.01), TrendDirection::Flat);
    }

    #[test]
    fn test_smoothing() {
        let mut trend = ScoreTrend::new(0.5);
        trend.observe(0.4);
        assert!((trend.observe(0.8) - 0.6).abs() < 1e-6);
        assert_eq!(trend.direction(0.01), TrendDirection::Improving);
        assert!((trend.observe(0.2) - 0.4).abs() < 1e-6);
        assert_eq!(trend.direction(0.01), TrendDirection::Declining);
        assert_eq!(trend.values.len(), 3);
    }

    #[test]
    fn test_alpha_one_tracks_raw_scores() {
        let mut trend = ScoreTrend::new(1.0);
        trend.observe(0.3);
        assert_eq!(trend.observe(0.9), 0.9);
        assert_eq!(trend.current(), Some(0.9));
    }
}
