use serde::{Deserialize, Serialize};

use crate::{
    core::clock::DecimalHour,
    error::PlanError,
    prelude::*,
    quantity::rate::PencePerKilowattHour,
};

/// One half-hour price quotation.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct PricePoint {
    pub time: DecimalHour,
    pub price: PencePerKilowattHour,
}

/// The cheapest contiguous charging window found in a price series.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PriceWindow {
    pub start: DecimalHour,
    pub end: DecimalHour,

    /// Number of half-hour slots covered, always even and at least 2.
    pub span: usize,

    pub weighted_price: PencePerKilowattHour,
}

/// What to optimise for: how long to charge and between which bounds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WindowRequest {
    /// Desired charge duration in decimal hours, clamped to 1-6 and rounded
    /// up to the next whole hour.
    pub duration: f64,

    /// Earliest start of the charging window.
    pub start_at: DecimalHour,

    /// Latest end of the charging window.
    pub end_by: DecimalHour,

    /// Per-slot weights for the average; missing slots weigh zero, `None`
    /// weighs every slot 1.0.
    pub weighting: Option<Vec<f64>>,
}

impl Default for WindowRequest {
    fn default() -> Self {
        Self {
            duration: 3.0,
            start_at: DecimalHour(23.0),
            end_by: DecimalHour(8.0),
            weighting: None,
        }
    }
}

/// Scan every candidate start slot within the bounds and pick the one with
/// the lowest weighted average price. Ties go to the earliest start.
///
/// The series must be ordered, half-hourly and gap-free; slot indices are
/// anchored on the first price point's timestamp. A linear scan is fine here,
/// a day of half-hour slots is bounded at 48.
pub fn cheapest_window(
    prices: &[PricePoint],
    request: &WindowRequest,
) -> Result<PriceWindow, PlanError> {
    // Round up to a whole hour so the window always covers complete slot pairs.
    let duration = request.duration.clamp(1.0, 6.0).ceil();
    let span = (duration * 2.0) as usize;

    let anchor = prices
        .first()
        .ok_or(PlanError::InsufficientPriceData { needed: span, available: 0 })?
        .time;
    let start_index = ((request.start_at - anchor).rounded_to_minute().0 * 2.0) as usize;
    let end_index =
        ((request.end_by - anchor - DecimalHour(duration)).rounded_to_minute().0 * 2.0) as usize;
    let end_index = end_index.max(start_index);

    let needed = end_index + span;
    if prices.len() < needed {
        return Err(PlanError::InsufficientPriceData { needed, available: prices.len() });
    }

    let mut weights: Vec<f64> = match &request.weighting {
        None => vec![1.0; span],
        Some(weighting) => {
            weighting.iter().copied().chain(std::iter::repeat(0.0)).take(span).collect()
        }
    };
    let mut weight_sum: f64 = weights.iter().sum();
    if weight_sum <= 0.0 {
        // An all-zero weighting would make every average NaN.
        warn!("degenerate slot weighting, falling back to a uniform one");
        weights = vec![1.0; span];
        weight_sum = span as f64;
    }

    let mut best: Option<(usize, f64)> = None;
    for index in start_index..=end_index {
        let average = prices[index..index + span]
            .iter()
            .zip(&weights)
            .map(|(point, weight)| point.price.0 * weight)
            .sum::<f64>()
            / weight_sum;
        let average = (average * 100.0).round() / 100.0;
        if best.is_none_or(|(_, lowest)| average < lowest) {
            best = Some((index, average));
        }
    }
    let (index, weighted) = best.expect("the candidate range is never empty");

    let start = prices[index].time;
    Ok(PriceWindow {
        start,
        end: (start + DecimalHour(duration)).rounded_to_minute(),
        span,
        weighted_price: PencePerKilowattHour(weighted),
    })
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;

    /// Half-hourly series starting at 23:00.
    fn series(prices: &[f64]) -> Vec<PricePoint> {
        prices
            .iter()
            .enumerate()
            .map(|(index, price)| PricePoint {
                time: (DecimalHour(23.0) + DecimalHour(index as f64 / 2.0)).normalized(),
                price: PencePerKilowattHour(*price),
            })
            .collect()
    }

    /// Six expensive slots at 23:00-02:00, six cheap ones at 02:00-05:00.
    #[test]
    fn picks_the_cheap_block() {
        let mut prices = vec![10.0; 48];
        for price in &mut prices[6..12] {
            *price = 5.0;
        }
        let window = cheapest_window(&series(&prices), &WindowRequest::default()).unwrap();
        assert_relative_eq!(window.start.0, 2.0);
        assert_relative_eq!(window.end.0, 5.0);
        assert_eq!(window.span, 6);
        assert_relative_eq!(window.weighted_price.0, 5.0);
    }

    /// Verify that ties resolve to the earliest start.
    #[test]
    fn ties_go_to_the_earliest_start() {
        let window = cheapest_window(&series(&[7.0; 48]), &WindowRequest::default()).unwrap();
        assert_relative_eq!(window.start.0, 23.0);
        assert_relative_eq!(window.weighted_price.0, 7.0);
    }

    #[test]
    fn weighted_average_prefers_front_loaded_slots() {
        // Cheap early slots matter more with a front-loaded weighting.
        let mut prices = vec![10.0; 48];
        prices[0] = 1.0;
        prices[1] = 1.0;
        let request = WindowRequest {
            weighting: Some(vec![1.0, 0.9, 0.8, 0.7, 0.6, 0.5]),
            ..WindowRequest::default()
        };
        let window = cheapest_window(&series(&prices), &request).unwrap();
        assert_relative_eq!(window.start.0, 23.0);
    }

    /// Verify that an all-zero weighting does not poison the averages with
    /// NaN: it behaves like no weighting at all.
    #[test]
    fn zero_weighting_falls_back_to_uniform() {
        let mut prices = vec![10.0; 48];
        for price in &mut prices[6..12] {
            *price = 5.0;
        }
        let request =
            WindowRequest { weighting: Some(vec![0.0; 6]), ..WindowRequest::default() };
        let window = cheapest_window(&series(&prices), &request).unwrap();
        assert!(window.weighted_price.0.is_finite());
        assert_relative_eq!(window.start.0, 2.0);
        assert_relative_eq!(window.weighted_price.0, 5.0);
    }

    #[test]
    fn duration_is_clamped_and_rounded_up() {
        let prices = series(&[10.0; 48]);
        let request = WindowRequest { duration: 1.2, ..WindowRequest::default() };
        assert_eq!(cheapest_window(&prices, &request).unwrap().span, 4);
        let request = WindowRequest { duration: 9.0, ..WindowRequest::default() };
        assert_eq!(cheapest_window(&prices, &request).unwrap().span, 12);
        let request = WindowRequest { duration: 0.1, ..WindowRequest::default() };
        assert_eq!(cheapest_window(&prices, &request).unwrap().span, 2);
    }

    #[test]
    fn short_series_is_rejected() {
        let prices = series(&[10.0; 12]);
        let error = cheapest_window(&prices, &WindowRequest::default()).unwrap_err();
        assert!(matches!(
            error,
            PlanError::InsufficientPriceData { needed: 18, available: 12 }
        ));
    }
}
