mod contributions;
mod engine;
mod error;
mod income;
mod issues;
mod ledger;
mod milestones;
mod monte_carlo;
mod rates;
mod types;
mod validate;
mod withdrawal;

pub use contributions::{
    ContributionInputs, ContributionLimitTable, ContributionPlan, LimitBucket,
    NoContributionLimits, StaticContributionLimits, active_month_fraction, active_months,
    aggregate_contributions, resolved_amount,
};
pub use engine::{
    ProjectionContext, ProjectionState, RECONCILIATION_TOLERANCE, project, project_checked,
    project_with, project_with_rates, step_year,
};
pub use error::ProjectionError;
pub use income::{
    PayrollTotals, SalaryGrowth, TakeHome, TaxMode, VestOutcome, WageIncome, resolve_take_home,
    vest_for_year, wage_income,
};
pub use issues::{Issue, IssueCode, Severity, has_errors};
pub use ledger::Ledger;
pub use milestones::{
    MilestoneTracker, RetirementPlan, coast_fi_reached, coast_target_year, fi_number,
    shortfall_check,
};
pub use monte_carlo::{
    percentile, run_monte_carlo, run_monte_carlo_with_limits, run_monte_carlo_with_rng,
    sample_return_path,
};
pub use rates::{RateResolver, accumulation_growth, real_return, withdrawal_growth};
pub use types::*;
pub use validate::validate;
pub use withdrawal::{
    HSA_ACCESS_AGE, TAX_DEFERRED_ACCESS_AGE, WithdrawalPlan, WithdrawalRates,
    allocate_withdrawals, is_accessible, order_accounts,
};
