//! `BurnRateCalculator` (spec.md §4.7): rolling cost/token velocity,
//! trend, and per-model attribution, recomputed once per tick.

use crate::store::SessionStore;
use std::sync::Mutex;

/// Rolling window over which the hourly rate is extrapolated, in seconds.
pub const DEFAULT_WINDOW_SECS: f64 = 300.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trend {
    Up,
    Down,
    Flat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdColor {
    Green,
    Yellow,
    Red,
}

#[derive(Debug, Clone)]
pub struct ModelRate {
    pub model: String,
    pub cost: f64,
    pub hourly_rate: f64,
}

#[derive(Debug, Clone)]
pub struct BurnRateSnapshot {
    pub total_cost: f64,
    pub hourly_rate: f64,
    pub trend: Trend,
    pub token_velocity_per_min: f64,
    pub daily_projection: f64,
    pub monthly_projection: f64,
    pub per_model: Vec<ModelRate>,
}

impl BurnRateSnapshot {
    fn zero(total_cost: f64) -> Self {
        Self {
            total_cost,
            hourly_rate: 0.0,
            trend: Trend::Flat,
            token_velocity_per_min: 0.0,
            daily_projection: 0.0,
            monthly_projection: 0.0,
            per_model: Vec::new(),
        }
    }
}

struct State {
    cost_samples: Vec<(f64, f64)>,
    token_samples: Vec<(f64, f64)>,
    prev_cost: f64,
    prev_tokens: f64,
    initialised: bool,
}

pub struct BurnRateCalculator {
    window_secs: f64,
    state: Mutex<State>,
}

impl BurnRateCalculator {
    #[must_use]
    pub fn new(window_secs: f64) -> Self {
        Self {
            window_secs,
            state: Mutex::new(State {
                cost_samples: Vec::new(),
                token_samples: Vec::new(),
                prev_cost: 0.0,
                prev_tokens: 0.0,
                initialised: false,
            }),
        }
    }

    /// Recompute the snapshot against the store's current aggregates, using
    /// `now` (seconds since epoch) as the sample timestamp.
    pub async fn compute(&self, store: &SessionStore, now: f64) -> BurnRateSnapshot {
        let sessions = store.list_sessions().await;
        let total_cost = store.get_aggregated_cost().await;
        let total_tokens: f64 = sessions.iter().map(|s| s.total_tokens as f64).sum();

        let mut state = self.state.lock().expect("burn rate mutex poisoned");

        if !state.initialised {
            state.prev_cost = total_cost;
            state.prev_tokens = total_tokens;
            state.cost_samples.push((now, total_cost));
            state.token_samples.push((now, total_tokens));
            state.initialised = true;
            return BurnRateSnapshot::zero(total_cost);
        }

        // Counter-reset rule (spec.md §4.7 step 3): a cumulative counter that
        // decreased since the last tick is handled by `rate_over_window`'s
        // `max(latest - start, latest)`, which treats the prior value as 0.
        state.prev_cost = total_cost;
        state.prev_tokens = total_tokens;
        state.cost_samples.push((now, total_cost));
        state.token_samples.push((now, total_tokens));

        let prune_before = now - 2.0 * self.window_secs;
        state.cost_samples.retain(|(t, _)| *t >= prune_before);
        state.token_samples.retain(|(t, _)| *t >= prune_before);

        let current_rate = rate_over_window(&state.cost_samples, now, self.window_secs);
        let prior_rate = rate_over_window(&state.cost_samples, now - self.window_secs, self.window_secs);
        let trend = classify_trend(current_rate, prior_rate);

        let token_rate_per_hour = rate_over_window(&state.token_samples, now, self.window_secs);
        let token_velocity_per_min = token_rate_per_hour / 60.0;

        let mut per_model_cost: std::collections::HashMap<String, f64> = std::collections::HashMap::new();
        for session in &sessions {
            if let Some(model) = &session.process_metadata.model {
                *per_model_cost.entry(model.clone()).or_insert(0.0) += session.total_cost;
            }
        }
        let mut per_model: Vec<ModelRate> = per_model_cost
            .into_iter()
            .map(|(model, cost)| {
                let hourly_rate = if total_cost > 0.0 { (cost / total_cost) * current_rate } else { 0.0 };
                ModelRate { model, cost, hourly_rate }
            })
            .collect();
        per_model.sort_by(|a, b| b.cost.partial_cmp(&a.cost).unwrap_or(std::cmp::Ordering::Equal));

        BurnRateSnapshot {
            total_cost,
            hourly_rate: current_rate,
            trend,
            token_velocity_per_min,
            daily_projection: current_rate * 24.0,
            monthly_projection: current_rate * 720.0,
            per_model,
        }
    }
}

/// Hourly-normalised rate over `(end_time - window, end_time]`, per spec.md
/// §4.7 step 5: baseline is the latest sample at or before the window start,
/// falling back to the earliest sample within the window; latest is the
/// newest sample at or before `end_time`.
fn rate_over_window(samples: &[(f64, f64)], end_time: f64, window: f64) -> f64 {
    let window_start = end_time - window;

    let baseline = samples
        .iter()
        .filter(|(t, _)| *t <= window_start)
        .max_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        .or_else(|| {
            samples
                .iter()
                .filter(|(t, _)| *t >= window_start && *t <= end_time)
                .min_by(|a, b| a.0.partial_cmp(&b.0).unwrap())
        });

    let latest =
        samples.iter().filter(|(t, _)| *t <= end_time).max_by(|a, b| a.0.partial_cmp(&b.0).unwrap());

    let (Some(&(start_time, start_value)), Some(&(latest_time, latest_value))) = (baseline, latest) else {
        return 0.0;
    };

    if (start_time - latest_time).abs() < f64::EPSILON {
        return 0.0;
    }
    let elapsed_hours = (latest_time - start_time) / 3600.0;
    if elapsed_hours <= 0.0 {
        return 0.0;
    }

    (latest_value - start_value).max(latest_value) / elapsed_hours
}

fn classify_trend(current_rate: f64, prior_rate: f64) -> Trend {
    let diff = current_rate - prior_rate;
    if diff > 1e-3 {
        Trend::Up
    } else if diff < -1e-3 {
        Trend::Down
    } else {
        Trend::Flat
    }
}

/// Pure classification used by the UI to color a rate (spec.md §4.7's
/// "Threshold classification").
#[must_use]
pub fn classify_threshold(rate: f64, green_below: f64, yellow_below: f64) -> ThresholdColor {
    if rate < green_below {
        ThresholdColor::Green
    } else if rate < yellow_below {
        ThresholdColor::Yellow
    } else {
        ThresholdColor::Red
    }
}
