use std::f64::consts::PI;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "parallel")]
use rayon::prelude::*;
use tracing::debug;

use super::contributions::{ContributionLimitTable, NoContributionLimits};
use super::engine::fi_year_along;
use super::error::ProjectionError;
use super::rates::RateResolver;
use super::types::{Household, MonteCarloConfig, MonteCarloSummary, Scenario};

/// Standard normal draws by Box–Muller, keeping the second variate for the next call.
struct NormalSampler<'r, R: Rng + ?Sized> {
    rng: &'r mut R,
    cached: Option<f64>,
}

impl<'r, R: Rng + ?Sized> NormalSampler<'r, R> {
    fn new(rng: &'r mut R) -> Self {
        Self { rng, cached: None }
    }

    fn standard_normal(&mut self) -> f64 {
        if let Some(z) = self.cached.take() {
            return z;
        }

        let u1 = self.rng.random::<f64>().max(1e-12);
        let u2 = self.rng.random::<f64>();
        let r = (-2.0 * u1.ln()).sqrt();
        let theta = 2.0 * PI * u2;

        self.cached = Some(r * theta.sin());
        r * theta.cos()
    }
}

/// Annual simple returns whose expectation is `mean`.
pub fn sample_return_path<R: Rng + ?Sized>(
    rng: &mut R,
    mean: f64,
    volatility: f64,
    horizon: usize,
) -> Vec<f64> {
    if volatility <= 0.0 {
        return vec![mean; horizon];
    }
    let log_mean = (1.0 + mean).ln() - 0.5 * volatility * volatility;
    let mut normals = NormalSampler::new(rng);
    (0..horizon)
        .map(|_| (log_mean + volatility * normals.standard_normal()).exp() - 1.0)
        .collect()
}

/// Linear interpolation between order statistics of an ascending slice.
pub fn percentile(sorted: &[f64], p: f64) -> f64 {
    let n = sorted.len();
    if n == 0 {
        return 0.0;
    }
    if n == 1 {
        return sorted[0];
    }

    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;

    if lower == upper {
        sorted[lower]
    } else {
        let w = rank - lower as f64;
        sorted[lower] * (1.0 - w) + sorted[upper] * w
    }
}

fn check_config(config: &MonteCarloConfig) -> Result<(), ProjectionError> {
    if !config.volatility.is_finite() || config.volatility < 0.0 {
        return Err(ProjectionError::MonteCarlo(
            "volatility must be a finite value >= 0".to_string(),
        ));
    }
    Ok(())
}

fn summarize(fi_years: Vec<Option<i32>>, sentinel_year: i32) -> MonteCarloSummary {
    let paths = fi_years.len() as u32;
    let reached_fi = fi_years.iter().filter(|y| y.is_some()).count() as u32;
    let mut years: Vec<f64> = fi_years
        .into_iter()
        .map(|y| y.unwrap_or(sentinel_year) as f64)
        .collect();
    if years.is_empty() {
        years.push(sentinel_year as f64);
    }
    years.sort_by(|a, b| a.total_cmp(b));

    MonteCarloSummary {
        paths,
        reached_fi,
        fi_year_25: percentile(&years, 25.0),
        fi_year_50: percentile(&years, 50.0),
        fi_year_75: percentile(&years, 75.0),
        sentinel_year,
    }
}

/// A sampled path for `scenario`. The first-year stress return, when set,
/// replaces the first draw so it applies on every path.
fn scenario_path<R: Rng + ?Sized>(
    rng: &mut R,
    scenario: &Scenario,
    mean: f64,
    volatility: f64,
) -> Vec<f64> {
    let mut path = sample_return_path(rng, mean, volatility, scenario.simulated_years() as usize);
    if let (Some(stress), Some(first)) = (scenario.stress_test_first_year_return, path.first_mut())
    {
        *first = stress;
    }
    path
}

/// Runs every path sequentially on one injected generator.
pub fn run_monte_carlo_with_rng<R: Rng + ?Sized>(
    household: &Household,
    scenario: &Scenario,
    config: &MonteCarloConfig,
    rng: &mut R,
) -> Result<MonteCarloSummary, ProjectionError> {
    check_config(config)?;
    let mean = RateResolver::new(scenario).base_rate();

    let fi_years = (0..config.paths)
        .map(|_| {
            let path = scenario_path(rng, scenario, mean, config.volatility);
            fi_year_along(household, scenario, &NoContributionLimits, &path)
        })
        .collect();
    Ok(summarize(fi_years, scenario.horizon_end(household.start_year)))
}

fn derive_seed(base_seed: u64, path: u32) -> u64 {
    splitmix64(base_seed ^ ((path as u64) << 32) ^ path as u64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

fn fi_year_for_path(
    household: &Household,
    scenario: &Scenario,
    limits: &dyn ContributionLimitTable,
    config: &MonteCarloConfig,
    mean: f64,
    path: u32,
) -> Option<i32> {
    let mut rng = StdRng::seed_from_u64(derive_seed(config.seed, path));
    let returns = scenario_path(&mut rng, scenario, mean, config.volatility);
    fi_year_along(household, scenario, limits, &returns)
}

/// Runs `config.paths` independent paths, each with its own seeded generator,
/// so results do not depend on how paths are scheduled.
pub fn run_monte_carlo(
    household: &Household,
    scenario: &Scenario,
    config: &MonteCarloConfig,
) -> Result<MonteCarloSummary, ProjectionError> {
    run_monte_carlo_with_limits(household, scenario, &NoContributionLimits, config)
}

pub fn run_monte_carlo_with_limits(
    household: &Household,
    scenario: &Scenario,
    limits: &dyn ContributionLimitTable,
    config: &MonteCarloConfig,
) -> Result<MonteCarloSummary, ProjectionError> {
    check_config(config)?;
    let mean = RateResolver::new(scenario).base_rate();

    #[cfg(feature = "parallel")]
    let fi_years: Vec<Option<i32>> = (0..config.paths)
        .into_par_iter()
        .map(|path| fi_year_for_path(household, scenario, limits, config, mean, path))
        .collect();

    #[cfg(not(feature = "parallel"))]
    let fi_years: Vec<Option<i32>> = (0..config.paths)
        .map(|path| fi_year_for_path(household, scenario, limits, config, mean, path))
        .collect();

    let summary = summarize(fi_years, scenario.horizon_end(household.start_year));
    debug!(
        paths = summary.paths,
        reached_fi = summary.reached_fi,
        median = summary.fi_year_50,
        "monte carlo batch complete"
    );
    Ok(summary)
}
