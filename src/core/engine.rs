use std::collections::BTreeMap;

use tracing::{debug, info, warn};

use super::contributions::{
    ContributionInputs, ContributionLimitTable, NoContributionLimits, aggregate_contributions,
};
use super::error::ProjectionError;
use super::income::{
    PayrollTotals, SalaryGrowth, TaxMode, resolve_take_home, vest_for_year, wage_income,
};
use super::issues::{Issue, IssueCode, has_errors};
use super::ledger::Ledger;
use super::milestones::{
    MilestoneTracker, RetirementPlan, coast_target_year, fi_number, shortfall_check,
};
use super::rates::{RateResolver, accumulation_growth, withdrawal_growth};
use super::types::{
    Account, AccountType, CashflowBreakdown, ContributionAdjustments, EventKind, Household,
    ModelingMode, Phase, ProjectionResult, SalaryGrowthMode, Scenario, YearRow,
};
use super::validate::validate;
use super::withdrawal::{WithdrawalRates, allocate_withdrawals, order_accounts};

/// Largest reconciliation delta accepted without an error.
pub const RECONCILIATION_TOLERANCE: f64 = 0.01;

const ZERO_TAX_RATE_FLOOR: f64 = 0.001;
const REPORTING_EPS: f64 = 0.005;

/// Everything resolved once per run before the first year is stepped.
pub struct ProjectionContext<'a> {
    household: &'a Household,
    scenario: &'a Scenario,
    limits: &'a dyn ContributionLimitTable,
    rates: RateResolver<'a>,
    tax_mode: TaxMode,
    salary_growth: SalaryGrowth,
    withdrawal_rates: WithdrawalRates,
    plan: RetirementPlan,
    base_household_wages: f64,
    oldest_birth_year: Option<i32>,
    surplus_account: Option<&'a Account>,
    deficit_account: Option<&'a Account>,
    warnings: Vec<Issue>,
    assumptions: Vec<String>,
}

impl<'a> ProjectionContext<'a> {
    pub fn new(
        household: &'a Household,
        scenario: &'a Scenario,
        limits: &'a dyn ContributionLimitTable,
        path: Option<&'a [f64]>,
    ) -> Self {
        let mut warnings = Vec::new();
        let mut assumptions = Vec::new();

        assumptions.push(match scenario.modeling_mode {
            ModelingMode::Real => "amounts are in today's dollars (real returns)".to_string(),
            ModelingMode::Nominal => "amounts are in nominal dollars".to_string(),
        });

        let tax_mode = TaxMode::resolve(&scenario.tax, &mut assumptions);
        let salary_growth = SalaryGrowth::resolve(scenario);
        assumptions.push(match salary_growth {
            SalaryGrowth::Override(rate) => {
                format!("every salary grows at {:.2}% a year", rate * 100.0)
            }
            SalaryGrowth::PerPerson {
                mode: SalaryGrowthMode::Nominal,
                ..
            } => "salaries grow at each person's stated rate".to_string(),
            SalaryGrowth::PerPerson {
                mode: SalaryGrowthMode::Real,
                ..
            } => "salaries without a real growth rate keep pace with inflation".to_string(),
        });

        let tax_deferred = match (scenario.tax.retirement_tax_rate, tax_mode.effective_rate()) {
            (Some(rate), _) => rate,
            (None, Some(rate)) => {
                assumptions.push(format!(
                    "tax-deferred withdrawals taxed at the salary effective rate of {:.2}%",
                    rate * 100.0
                ));
                rate
            }
            (None, None) => {
                assumptions.push("tax-deferred withdrawals are untaxed".to_string());
                0.0
            }
        };
        let withdrawal_rates = WithdrawalRates {
            tax_deferred,
            taxable: scenario
                .tax
                .gross_up_taxable
                .then_some(scenario.tax.taxable_withdrawal_rate),
        };

        let plan = RetirementPlan::resolve(household, scenario, &mut warnings, &mut assumptions);

        let rates = match path {
            Some(path) => {
                let fixed_yield = household.accounts.iter().any(|a| {
                    matches!(a.account_type, AccountType::MoneyMarket { fixed_yield: Some(_) })
                });
                if fixed_yield {
                    assumptions.push(
                        "money-market fixed yields are replaced by the supplied return path"
                            .to_string(),
                    );
                }
                RateResolver::with_path(scenario, path)
            }
            None => RateResolver::new(scenario),
        };

        let base_household_wages = household
            .people
            .iter()
            .map(|p| wage_income(&p.income, salary_growth, 0).total())
            .sum();

        let surplus_account = scenario
            .surplus_account_id
            .as_deref()
            .and_then(|id| household.account(id));
        let deficit_account = surplus_account
            .or_else(|| {
                household
                    .accounts
                    .iter()
                    .find(|a| a.account_type.is_cash_like())
            })
            .or_else(|| {
                household
                    .accounts
                    .iter()
                    .find(|a| a.account_type == AccountType::Taxable)
            });

        let last_year = scenario.horizon_end(household.start_year) - 1;
        for grant in household
            .equity_grants
            .iter()
            .filter(|g| scenario.grant_enabled(g))
        {
            if grant
                .vesting
                .iter()
                .any(|(year, shares)| *year > last_year && *shares > 0.0)
            {
                warnings.push(Issue::warning(
                    IssueCode::EquityVestPastHorizon,
                    format!("grant {} vests after {last_year}, beyond the projection", grant.id),
                ));
            }
        }

        Self {
            household,
            scenario,
            limits,
            rates,
            tax_mode,
            salary_growth,
            withdrawal_rates,
            plan,
            base_household_wages,
            oldest_birth_year: household.oldest_birth_year(),
            surplus_account,
            deficit_account,
            warnings,
            assumptions,
        }
    }

    fn account_ids(&self) -> impl Iterator<Item = &'a str> + use<'a> {
        self.household.accounts.iter().map(|a| a.id.as_str())
    }

    fn counts_toward_fi(&self, id: &str) -> bool {
        self.household
            .account(id)
            .is_some_and(|a| a.counts_toward_fi)
    }

    fn invested(&self, balances: &Ledger) -> f64 {
        balances.total_where(|id| self.counts_toward_fi(id))
    }
}

/// Balances carried from one simulated year to the next.
#[derive(Clone, Debug, PartialEq)]
pub struct ProjectionState {
    pub year_index: usize,
    pub year: i32,
    pub balances: Ledger,
}

impl ProjectionState {
    pub fn opening(household: &Household) -> Self {
        Self {
            year_index: 0,
            year: household.start_year,
            balances: household
                .accounts
                .iter()
                .map(|a| (a.id.clone(), a.starting_balance))
                .collect(),
        }
    }
}

#[derive(Default)]
struct EventOutcome {
    free_inflows: f64,
    unassigned_outflows: f64,
    account_deposits: f64,
    account_debits: f64,
}

#[derive(Default)]
struct YearFlows {
    gross_income: f64,
    equity_income: f64,
    salary_taxes: f64,
    equity_withholding: f64,
    withdrawal_taxes: f64,
    living_spend: f64,
    payroll_deductions: f64,
    contributions: Ledger,
    employer: Ledger,
    withdrawals: Ledger,
    shortfall: f64,
    adjustments: ContributionAdjustments,
}

fn apply_events(
    ctx: &ProjectionContext<'_>,
    year: i32,
    balances: &mut Ledger,
    flows: &mut Ledger,
    issues: &mut Vec<Issue>,
) -> EventOutcome {
    let mut out = EventOutcome::default();
    for event in ctx.household.events.iter().filter(|e| e.year == year) {
        let amount = event.amount.max(0.0);
        let account = event
            .account_id
            .as_deref()
            .and_then(|id| ctx.household.account(id));
        match (event.kind, account) {
            (EventKind::Inflow, Some(account)) => {
                balances.add(&account.id, amount);
                flows.add(&account.id, amount);
                out.account_deposits += amount;
            }
            (EventKind::Inflow, None) => out.free_inflows += amount,
            (EventKind::Outflow, Some(account)) => {
                let debit = amount.min(balances.get(&account.id).max(0.0));
                if debit < amount {
                    issues.push(
                        Issue::warning(
                            IssueCode::EventOverdraft,
                            format!(
                                "event '{}' asked for {amount:.2} from {} but only {debit:.2} was available",
                                event.name, account.id
                            ),
                        )
                        .in_year(year),
                    );
                }
                balances.add(&account.id, -debit);
                flows.add(&account.id, -debit);
                out.account_debits += debit;
            }
            (EventKind::Outflow, None) => out.unassigned_outflows += amount,
        }
    }
    out
}

fn accumulate(
    ctx: &ProjectionContext<'_>,
    state: &ProjectionState,
    begin: &Ledger,
    events: &EventOutcome,
    issues: &mut Vec<Issue>,
) -> YearFlows {
    let household = ctx.household;
    let year = state.year;
    let mut flows = YearFlows::default();

    let wages_by_person: BTreeMap<String, f64> = household
        .people
        .iter()
        .map(|p| {
            let wages = wage_income(&p.income, ctx.salary_growth, state.year_index).total();
            (p.id.clone(), wages)
        })
        .collect();
    let household_wages: f64 = wages_by_person.values().sum();

    let mut vesting = Ledger::new();
    let mut unfunded_vest = 0.0;
    for grant in household
        .equity_grants
        .iter()
        .filter(|g| ctx.scenario.grant_enabled(g))
    {
        let Some(vest) = vest_for_year(grant, year) else {
            continue;
        };
        flows.equity_income += vest.value;
        flows.equity_withholding += vest.withholding;
        let destination = grant
            .destination_account_id
            .as_deref()
            .filter(|id| household.account(id).is_some());
        match destination {
            Some(id) => vesting.add(id, vest.net_proceeds),
            None => {
                unfunded_vest += vest.net_proceeds;
                issues.push(
                    Issue::warning(
                        IssueCode::UnfundedEquityVest,
                        format!(
                            "grant {} vested {:.2} net with no destination account; kept as cash",
                            grant.id, vest.net_proceeds
                        ),
                    )
                    .in_year(year),
                );
            }
        }
    }

    let plan = aggregate_contributions(
        &ContributionInputs {
            household,
            year,
            wages_by_person: &wages_by_person,
            household_wages,
            opening_balances: begin,
            vesting_deposits: &vesting,
            include_employer: ctx.scenario.include_employer_match,
        },
        ctx.limits,
    );

    let deductions: f64 = household
        .people
        .iter()
        .map(|p| p.payroll.deductions.max(0.0))
        .sum();
    let wage_growth_factor = if ctx.base_household_wages > 0.0 {
        household_wages / ctx.base_household_wages
    } else {
        1.0
    };
    let take_home = resolve_take_home(
        ctx.tax_mode,
        PayrollTotals {
            wages: household_wages,
            pre_tax_payroll: plan.pre_tax_payroll,
            employee_payroll: plan.employee_payroll.total(),
            deductions,
            wage_growth_factor,
        },
    );
    if take_home.salary_tax < -REPORTING_EPS {
        issues.push(
            Issue::warning(
                IssueCode::NegativeImpliedTax,
                format!(
                    "configured take-home implies {:.2} of salary tax",
                    take_home.salary_tax
                ),
            )
            .in_year(year),
        );
    }

    flows.gross_income = household_wages + flows.equity_income;
    flows.salary_taxes = take_home.salary_tax;
    flows.payroll_deductions = deductions;
    flows.employer = plan.employer.clone();
    flows.contributions = plan.by_account();
    flows.adjustments = plan.adjustments();

    let cash = take_home.net_to_checking + unfunded_vest + events.free_inflows
        - events.unassigned_outflows;
    let leftover = cash - plan.from_take_home();
    let target = household
        .annual_spending
        .map(|s| s.max(0.0))
        .unwrap_or(leftover.max(0.0));
    let residual = leftover - target;
    let mut living = target;

    if residual > 0.0 {
        // The goal account never takes surplus past its emergency-fund target.
        let mut routed = 0.0;
        if let Some(account) = ctx.surplus_account {
            routed = residual.min(plan.goal_headroom(household, begin, &account.id));
            if routed > 0.0 {
                flows.contributions.add(&account.id, routed);
            }
        }
        let unrouted = residual - routed;
        living += unrouted;
        if unrouted > RECONCILIATION_TOLERANCE {
            issues.push(
                Issue::warning(
                    IssueCode::UnresolvedSurplus,
                    format!("{unrouted:.2} of cash had no destination and was counted as spending"),
                )
                .in_year(year),
            );
        }
    } else if residual < 0.0 {
        let mut unfunded = -residual;
        if let Some(account) = ctx.deficit_account {
            let id = account.id.as_str();
            // Savings headed for this account this year are not available to cover the gap.
            let available = (begin.get(id)
                + plan.employee_payroll.get(id)
                + plan.employer.get(id)
                + plan.vesting.get(id))
            .max(0.0);
            let draw = unfunded.min(available);
            if draw > 0.0 {
                flows.contributions.add(id, -draw);
                unfunded -= draw;
            }
        }
        if unfunded > 0.0 {
            let cut = unfunded.min(living);
            living -= cut;
            let mut rest = unfunded - cut;
            for (id, amount) in plan.recurring.iter().chain(plan.out_of_pocket.iter()) {
                if rest <= 0.0 {
                    break;
                }
                let trimmed = amount.min(rest);
                flows.contributions.add(id, -trimmed);
                rest -= trimmed;
            }
            if unfunded > REPORTING_EPS {
                issues.push(
                    Issue::warning(
                        IssueCode::CashflowDeficit,
                        format!("{unfunded:.2} of planned spending and savings could not be funded"),
                    )
                    .in_year(year),
                );
            }
        }
    }

    flows.living_spend = living;
    flows
}

fn withdraw(
    ctx: &ProjectionContext<'_>,
    state: &ProjectionState,
    begin: &Ledger,
    events: &EventOutcome,
    issues: &mut Vec<Issue>,
) -> YearFlows {
    let household = ctx.household;
    let scenario = ctx.scenario;
    let year = state.year;
    let mut flows = YearFlows::default();

    for grant in household
        .equity_grants
        .iter()
        .filter(|g| scenario.grant_enabled(g))
    {
        if vest_for_year(grant, year).is_some() {
            issues.push(
                Issue::warning(
                    IssueCode::EquityVestAfterRetirement,
                    format!("grant {} vests after retirement and is forfeited", grant.id),
                )
                .in_year(year),
            );
        }
    }

    let spend = scenario.annual_retirement_spend.max(0.0);
    let need = spend - events.free_inflows + events.unassigned_outflows;
    if need <= 0.0 {
        let excess = -need;
        flows.living_spend = spend + excess;
        if excess > RECONCILIATION_TOLERANCE {
            issues.push(
                Issue::warning(
                    IssueCode::UnresolvedSurplus,
                    format!("{excess:.2} of event cash exceeded the year's spending need"),
                )
                .in_year(year),
            );
        }
        return flows;
    }

    let ordered = order_accounts(
        &household.accounts,
        begin,
        &scenario.bucket_order,
        scenario.within_bucket,
        year,
        ctx.oldest_birth_year,
    );
    let plan = allocate_withdrawals(&ordered, begin, need, ctx.withdrawal_rates);

    if plan.tax_deferred_gross > 0.0 && ctx.withdrawal_rates.tax_deferred < ZERO_TAX_RATE_FLOOR {
        issues.push(
            Issue::error(
                IssueCode::ZeroTaxDeferredRate,
                format!(
                    "{:.2} drawn from tax-deferred accounts with an effectively zero tax rate",
                    plan.tax_deferred_gross
                ),
            )
            .in_year(year),
        );
    }
    if plan.shortfall > REPORTING_EPS {
        issues.push(
            Issue::warning(
                IssueCode::WithdrawalShortfall,
                format!(
                    "accessible accounts covered all but {:.2} of spending",
                    plan.shortfall
                ),
            )
            .in_year(year),
        );
    }

    flows.living_spend = spend - plan.shortfall;
    flows.withdrawal_taxes = plan.taxes;
    flows.shortfall = plan.shortfall;
    flows.withdrawals = plan.withdrawals;
    flows
}

/// Advances one year. The input state is left untouched; the returned row is final.
pub fn step_year(
    ctx: &ProjectionContext<'_>,
    state: &ProjectionState,
    phase: Phase,
) -> (YearRow, ProjectionState) {
    let year = state.year;
    let zero = Ledger::zeroed(ctx.account_ids());
    let mut issues = Vec::new();

    let mut begin = zero.merged(&state.balances);
    let mut event_flows = zero.clone();
    let events = apply_events(ctx, year, &mut begin, &mut event_flows, &mut issues);

    let flows = match phase {
        Phase::Accumulation => accumulate(ctx, state, &begin, &events, &mut issues),
        Phase::Withdrawal => withdraw(ctx, state, &begin, &events, &mut issues),
    };
    let contributions = zero.merged(&flows.contributions);
    let employer_contributions = zero.merged(&flows.employer);
    let withdrawals = zero.merged(&flows.withdrawals);

    let mut growth = zero.clone();
    let mut ending = zero.clone();
    for account in &ctx.household.accounts {
        let id = account.id.as_str();
        let rate = ctx.rates.rate_for(account.account_type, state.year_index);
        let opening = begin.get(id);
        let earned = match phase {
            Phase::Accumulation => accumulation_growth(rate, opening, contributions.get(id)),
            Phase::Withdrawal => withdrawal_growth(rate, opening, withdrawals.get(id)),
        };
        growth.set(id, earned);
        ending.set(id, opening + contributions.get(id) - withdrawals.get(id) + earned);
    }

    let event_spending = events.unassigned_outflows + events.account_debits;
    let taxes = flows.salary_taxes + flows.equity_withholding + flows.withdrawal_taxes;
    let reconciliation = CashflowBreakdown {
        income: flows.gross_income,
        employer_contributions: employer_contributions.total(),
        other_inflows: events.free_inflows + events.account_debits + events.account_deposits,
        withdrawals: withdrawals.total(),
        spending: flows.living_spend + event_spending,
        contributions: contributions.total(),
        taxes,
        deductions: flows.payroll_deductions,
        event_deposits: events.account_deposits,
        delta: 0.0,
    }
    .reconciled();

    if reconciliation.delta.abs() > RECONCILIATION_TOLERANCE {
        warn!(year, delta = reconciliation.delta, "cashflow does not reconcile");
        issues.push(
            Issue::error(
                IssueCode::ReconciliationMismatch,
                format!(
                    "sources and uses differ by {:.2}",
                    reconciliation.delta
                ),
            )
            .in_year(year)
            .with_breakdown(reconciliation),
        );
    }

    let net_worth = ending.total();
    let invested_assets = ctx.invested(&ending);
    debug!(year, ?phase, net_worth, invested_assets, "projected year");

    let row = YearRow {
        year,
        phase,
        gross_income: flows.gross_income,
        equity_income: flows.equity_income,
        salary_taxes: flows.salary_taxes,
        equity_withholding: flows.equity_withholding,
        withdrawal_taxes: flows.withdrawal_taxes,
        taxes,
        spending: reconciliation.spending,
        payroll_deductions: flows.payroll_deductions,
        begin_balances: begin,
        event_flows,
        contributions,
        employer_contributions,
        growth,
        withdrawals,
        ending_balances: ending.clone(),
        net_worth,
        invested_assets,
        withdrawal_shortfall: flows.shortfall,
        contribution_adjustments: flows.adjustments,
        reconciliation,
        issues,
    };
    let next = ProjectionState {
        year_index: state.year_index + 1,
        year: year + 1,
        balances: ending,
    };
    (row, next)
}

fn simulate(ctx: &ProjectionContext<'_>) -> ProjectionResult {
    let household = ctx.household;
    let scenario = ctx.scenario;
    let fi = fi_number(
        scenario.annual_retirement_spend,
        scenario.safe_withdrawal_rate,
    );
    let mut tracker = MilestoneTracker::new(
        ctx.plan,
        fi,
        ctx.rates.base_rate(),
        coast_target_year(household, scenario),
    );

    let mut state = ProjectionState::opening(household);
    let mut previous_invested = ctx.invested(&state.balances);
    let mut previous_phase = None;
    let mut shortfall = None;
    let mut rows = Vec::with_capacity(scenario.simulated_years() as usize);

    for _ in 0..scenario.simulated_years() {
        let year = state.year;
        let phase = tracker.phase_for(year);
        if phase == Phase::Withdrawal && previous_phase == Some(Phase::Accumulation) {
            info!(year, "switching to withdrawal phase");
        }
        // A fixed retirement at or before the start year is checked on the first row.
        if phase == Phase::Withdrawal
            && previous_phase != Some(Phase::Withdrawal)
            && tracker.has_fixed_retirement()
        {
            shortfall = shortfall_check(
                year,
                previous_invested,
                scenario.safe_withdrawal_rate,
                scenario.annual_retirement_spend,
            );
        }

        let (row, next) = step_year(ctx, &state, phase);
        if tracker.observe(year, row.invested_assets) {
            info!(year, invested = row.invested_assets, fi_number = fi, "reached FI");
        }
        previous_invested = row.invested_assets;
        previous_phase = Some(phase);
        rows.push(row);
        state = next;
    }

    let retirement_year = match ctx.plan {
        RetirementPlan::AtYear(year) => Some(year),
        RetirementPlan::OnFi => tracker.fi_year().map(|year| year + 1),
    };

    let (saved, earned) = rows
        .iter()
        .filter(|r| r.phase == Phase::Accumulation)
        .fold((0.0, 0.0), |(saved, earned), r| {
            (
                saved + r.contributions.total(),
                earned + r.gross_income + r.employer_contributions.total(),
            )
        });
    let savings_rate = (earned > 0.0).then(|| saved / earned);

    let mut errors = Vec::new();
    let mut warnings = ctx.warnings.clone();
    for issue in rows.iter().flat_map(|r| r.issues.iter()) {
        if issue.is_error() {
            errors.push(issue.clone());
        } else {
            warnings.push(issue.clone());
        }
    }

    ProjectionResult {
        rows,
        fi_number: fi,
        fi_year: tracker.fi_year(),
        coast_fi_year: tracker.coast_fi_year(),
        retirement_year,
        shortfall,
        savings_rate,
        errors,
        warnings,
        assumptions: ctx.assumptions.clone(),
    }
}

fn with_validation(mut result: ProjectionResult, issues: Vec<Issue>) -> ProjectionResult {
    let (mut errors, mut warnings): (Vec<Issue>, Vec<Issue>) =
        issues.into_iter().partition(Issue::is_error);
    errors.append(&mut result.errors);
    warnings.append(&mut result.warnings);
    result.errors = errors;
    result.warnings = warnings;
    result
}

/// Full deterministic projection. Validation issues are attached to the result
/// rather than stopping the run.
pub fn project(household: &Household, scenario: &Scenario) -> ProjectionResult {
    project_with(household, scenario, &NoContributionLimits, None)
}

pub fn project_with(
    household: &Household,
    scenario: &Scenario,
    limits: &dyn ContributionLimitTable,
    rates: Option<&[f64]>,
) -> ProjectionResult {
    let issues = validate(household, scenario);
    let ctx = ProjectionContext::new(household, scenario, limits, rates);
    with_validation(simulate(&ctx), issues)
}

/// Projection with an explicit return for each simulated year.
pub fn project_with_rates(
    household: &Household,
    scenario: &Scenario,
    rates: &[f64],
) -> ProjectionResult {
    project_with(household, scenario, &NoContributionLimits, Some(rates))
}

/// Like [`project`], but refuses input carrying blocking validation issues.
pub fn project_checked(
    household: &Household,
    scenario: &Scenario,
) -> Result<ProjectionResult, ProjectionError> {
    let issues = validate(household, scenario);
    if has_errors(&issues) {
        return Err(ProjectionError::Validation(issues));
    }
    let ctx = ProjectionContext::new(household, scenario, &NoContributionLimits, None);
    Ok(with_validation(simulate(&ctx), issues))
}

/// FI year reached along one return path; skips validation.
pub(crate) fn fi_year_along(
    household: &Household,
    scenario: &Scenario,
    limits: &dyn ContributionLimitTable,
    rates: &[f64],
) -> Option<i32> {
    let ctx = ProjectionContext::new(household, scenario, limits, Some(rates));
    simulate(&ctx).fi_year
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::contributions::{LimitBucket, StaticContributionLimits};
    use crate::core::types::{
        Contribution, EmergencyFundGoal, EquityGrant, OneTimeEvent, Person, PricePath,
        RetirementTrigger,
    };
    use proptest::prelude::{prop_assert, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn single_account(balance: f64) -> Household {
        let mut h = Household::new("solo", 2025);
        h.accounts
            .push(Account::new("brokerage", AccountType::Taxable, balance));
        h
    }

    fn earner_household() -> Household {
        let mut h = Household::new("family", 2025);
        let mut alex = Person::new("alex", Some(1990));
        alex.income.base_salary = 150_000.0;
        alex.income.growth_rate = 0.03;
        alex.payroll.contributions = vec![
            Contribution::percent("k401", 0.10),
            Contribution::percent("k401", 0.04).from_employer(),
        ];
        alex.payroll.deductions = 3_000.0;
        h.people.push(alex);

        let mut k401 = Account::new("k401", AccountType::Traditional401k, 80_000.0);
        k401.owner_id = Some("alex".to_string());
        h.accounts.push(k401);
        h.accounts
            .push(Account::new("brokerage", AccountType::Taxable, 40_000.0));
        h.accounts.push(Account::new("cash", AccountType::Cash, 20_000.0));
        h.recurring_savings = vec![Contribution::monthly("brokerage", 1_000.0)];
        h.annual_spending = Some(50_000.0);
        h
    }

    fn earner_scenario() -> Scenario {
        let mut s = Scenario::new(0.07, 0.03, 0.04, 60_000.0);
        s.tax.effective_rate = Some(0.22);
        s.surplus_account_id = Some("brokerage".to_string());
        s.horizon_years = 30;
        s
    }

    fn assert_row_identities(result: &ProjectionResult) {
        for row in &result.rows {
            assert_approx(row.net_worth, row.ending_balances.total());
            for (id, ending) in row.ending_balances.iter() {
                let expected = row.begin_balances.get(id) + row.contributions.get(id)
                    - row.withdrawals.get(id)
                    + row.growth.get(id);
                assert_approx_tol(ending, expected, 0.01);
            }
            assert!(
                row.reconciliation.delta.abs() <= RECONCILIATION_TOLERANCE,
                "year {} delta {}",
                row.year,
                row.reconciliation.delta
            );
        }
    }

    #[test]
    fn real_mode_growth_matches_hand_calculation() {
        // 159,291 at (1.07 / 1.03) - 1 per year with nothing added.
        let h = single_account(159_291.0);
        let s = Scenario::new(0.07, 0.03, 0.03, 96_000.0);
        let result = project(&h, &s);

        assert_approx(result.fi_number, 3_200_000.0);
        assert_approx_tol(result.rows[0].ending_balances.get("brokerage"), 165_477.06, 0.01);
        assert_approx_tol(result.rows[4].ending_balances.get("brokerage"), 192_719.0, 1.0);
        assert_eq!(result.rows.len(), 50);
        assert_eq!(result.fi_year, None);
        assert!(result.errors.is_empty());
        assert_row_identities(&result);
    }

    #[test]
    fn retired_household_grosses_up_pre_tax_withdrawals() {
        let mut h = Household::new("retired", 2025);
        h.people.push(Person::new("pat", Some(1950)));
        h.accounts.push(Account::new(
            "k401",
            AccountType::Traditional401k,
            3_500_000.0,
        ));
        let mut s = Scenario::new(0.07, 0.03, 0.04, 96_000.0);
        s.retirement_year = Some(2025);
        s.tax.retirement_tax_rate = Some(0.20);

        let result = project(&h, &s);
        let first = &result.rows[0];
        assert_eq!(first.phase, Phase::Withdrawal);
        assert_approx(first.withdrawals.get("k401"), 120_000.0);
        assert_approx(first.withdrawal_taxes, 24_000.0);
        assert_approx(first.spending, 96_000.0);
        let rate = RateResolver::new(&s).base_rate();
        assert_approx(first.growth.get("k401"), rate * 3_380_000.0);
        assert_eq!(result.shortfall, None);
        assert_eq!(result.retirement_year, Some(2025));
        assert_row_identities(&result);
    }

    #[test]
    fn vest_proceeds_land_as_contribution_to_destination() {
        let mut h = single_account(0.0);
        h.people.push(Person::new("alex", Some(1990)));
        h.equity_grants.push(EquityGrant {
            id: "rsu".to_string(),
            owner_id: "alex".to_string(),
            vesting: BTreeMap::from([(2026, 125.0)]),
            price: PricePath::Fixed { price: 500.0 },
            withholding_rate: 0.20,
            destination_account_id: Some("brokerage".to_string()),
            enabled: true,
        });
        let s = Scenario::new(0.07, 0.03, 0.04, 40_000.0);

        let result = project(&h, &s);
        let vest_year = &result.rows[1];
        assert_eq!(vest_year.year, 2026);
        assert_approx(vest_year.equity_income, 62_500.0);
        assert_approx(vest_year.equity_withholding, 12_500.0);
        assert_approx(vest_year.contributions.get("brokerage"), 50_000.0);
        assert_approx(vest_year.taxes, 12_500.0);
        assert_row_identities(&result);
    }

    #[test]
    fn disabled_grant_override_skips_vesting() {
        let mut h = single_account(0.0);
        h.people.push(Person::new("alex", None));
        h.equity_grants.push(EquityGrant {
            id: "rsu".to_string(),
            owner_id: "alex".to_string(),
            vesting: BTreeMap::from([(2025, 10.0)]),
            price: PricePath::Fixed { price: 100.0 },
            withholding_rate: 0.3,
            destination_account_id: None,
            enabled: true,
        });
        let mut s = Scenario::new(0.07, 0.03, 0.04, 40_000.0);

        let with_grant = project(&h, &s);
        assert_approx(with_grant.rows[0].equity_income, 1_000.0);
        assert!(
            with_grant
                .warnings
                .iter()
                .any(|w| w.code == IssueCode::UnfundedEquityVest)
        );

        s.equity_overrides.insert("rsu".to_string(), false);
        let without = project(&h, &s);
        assert_approx(without.rows[0].equity_income, 0.0);
    }

    #[test]
    fn earners_reconcile_every_year() {
        let result = project(&earner_household(), &earner_scenario());
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_row_identities(&result);

        let first = &result.rows[0];
        assert_approx(first.gross_income, 150_000.0);
        assert_approx(first.employer_contributions.get("k401"), 6_000.0);
        // (150k - 15k pre-tax - 3k deductions) * 22%
        assert_approx(first.salary_taxes, 132_000.0 * 0.22);
        // Take-home 150k - 15k - 3k - 29,040 = 102,960; 12k saved, 50k spent.
        assert_approx(first.contributions.get("brokerage"), 12_000.0 + 40_960.0);
        assert_approx(first.spending, 50_000.0);
        assert!(result.savings_rate.is_some_and(|r| r > 0.0 && r < 1.0));
    }

    #[test]
    fn deficit_draws_cash_then_cuts_spending() {
        let mut h = earner_household();
        h.annual_spending = Some(160_000.0);
        let mut s = earner_scenario();
        s.surplus_account_id = None;
        s.horizon_years = 3;

        let result = project(&h, &s);
        let first = &result.rows[0];
        // Cash shortfall is 160k + 12k - 102,960 = 69,040; only 20k sits in cash.
        assert_approx(first.contributions.get("cash"), -20_000.0);
        assert_approx(first.spending, 160_000.0 - 49_040.0);
        assert!(first.issues.iter().any(|i| i.code == IssueCode::CashflowDeficit));
        assert_row_identities(&result);
    }

    #[test]
    fn spending_surplus_without_destination_is_flagged() {
        let h = earner_household();
        let mut s = earner_scenario();
        s.surplus_account_id = None;
        s.horizon_years = 1;

        let result = project(&h, &s);
        assert_approx(result.rows[0].spending, 50_000.0 + 40_960.0);
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.code == IssueCode::UnresolvedSurplus)
        );
        assert_row_identities(&result);
    }

    #[test]
    fn contribution_limits_return_capped_payroll_to_take_home() {
        let h = earner_household();
        let mut s = earner_scenario();
        s.horizon_years = 1;
        let limits = StaticContributionLimits::new().with(LimitBucket::Employee401k, 10_000.0);

        let result = project_with(&h, &s, &limits, None);
        let first = &result.rows[0];
        assert_approx(first.contributions.get("k401"), 10_000.0 + 6_000.0);
        assert_approx(first.salary_taxes, (150_000.0 - 10_000.0 - 3_000.0) * 0.22);
        assert_row_identities(&result);
    }

    #[test]
    fn event_outflow_is_clamped_at_zero() {
        let mut h = single_account(4_000.0);
        h.events.push(OneTimeEvent {
            name: "roof".to_string(),
            year: 2025,
            amount: 10_000.0,
            kind: EventKind::Outflow,
            account_id: Some("brokerage".to_string()),
        });
        let s = Scenario::new(0.07, 0.03, 0.04, 40_000.0);

        let result = project(&h, &s);
        let first = &result.rows[0];
        assert_approx(first.begin_balances.get("brokerage"), 0.0);
        assert_approx(first.event_flows.get("brokerage"), -4_000.0);
        assert_approx(first.spending, 4_000.0);
        assert!(first.issues.iter().any(|i| i.code == IssueCode::EventOverdraft));
        assert_row_identities(&result);
    }

    #[test]
    fn fi_trigger_retires_the_year_after_fi() {
        let h = single_account(3_100_000.0);
        let mut s = Scenario::new(0.07, 0.03, 0.03, 96_000.0);
        s.retirement_trigger = RetirementTrigger::Fi;
        s.horizon_years = 5;

        let result = project(&h, &s);
        assert_eq!(result.fi_year, Some(2025));
        assert_eq!(result.retirement_year, Some(2026));
        assert_eq!(result.rows[0].phase, Phase::Accumulation);
        assert_eq!(result.rows[1].phase, Phase::Withdrawal);
        assert_approx(result.rows[1].withdrawals.get("brokerage"), 96_000.0);
        assert_row_identities(&result);
    }

    #[test]
    fn age_trigger_records_one_time_shortfall() {
        let mut h = single_account(1_000_000.0);
        h.people.push(Person::new("alex", Some(1970)));
        let mut s = Scenario::new(0.07, 0.03, 0.04, 60_000.0);
        s.retirement_trigger = RetirementTrigger::Age;
        s.target_retirement_age = Some(56);
        s.horizon_years = 3;

        let result = project(&h, &s);
        assert_eq!(result.rows[0].phase, Phase::Accumulation);
        assert_eq!(result.rows[1].phase, Phase::Withdrawal);
        let shortfall = result.shortfall.expect("shortfall at retirement");
        assert_eq!(shortfall.year, 2026);
        assert_approx(shortfall.invested_assets, result.rows[0].invested_assets);
        assert!(shortfall.gap > 0.0);
    }

    #[test]
    fn fixed_retirement_before_start_checks_shortfall_on_first_row() {
        let mut h = single_account(100_000.0);
        h.people.push(Person::new("pat", Some(1950)));
        let mut s = Scenario::new(0.07, 0.03, 0.04, 60_000.0);
        s.retirement_trigger = RetirementTrigger::Age;
        s.target_retirement_age = Some(65);
        s.horizon_years = 3;

        let result = project(&h, &s);
        assert_eq!(result.rows[0].phase, Phase::Withdrawal);
        assert_eq!(result.retirement_year, Some(2015));
        let shortfall = result.shortfall.expect("shortfall on the first row");
        assert_eq!(shortfall.year, 2025);
        assert_approx(shortfall.invested_assets, 100_000.0);
        assert_approx(shortfall.sustainable_spend, 4_000.0);
        assert_approx(shortfall.gap, 56_000.0);
    }

    #[test]
    fn surplus_into_emergency_fund_stops_at_target() {
        let mut h = Household::new("efund", 2025);
        let mut alex = Person::new("alex", Some(1990));
        alex.income.base_salary = 100_000.0;
        h.people.push(alex);
        h.accounts.push(Account::new("efund", AccountType::Cash, 18_000.0));
        h.emergency_fund = Some(EmergencyFundGoal {
            account_id: "efund".to_string(),
            target: 20_000.0,
        });
        h.annual_spending = Some(40_000.0);
        let mut s = Scenario::new(0.07, 0.03, 0.04, 60_000.0);
        s.tax.effective_rate = Some(0.20);
        s.surplus_account_id = Some("efund".to_string());
        s.horizon_years = 2;

        let result = project(&h, &s);
        let first = &result.rows[0];
        // Take-home 80k less 40k spend leaves 40k; only 2k fits under the target.
        assert_approx(first.contributions.get("efund"), 2_000.0);
        assert_approx(first.spending, 78_000.0);
        assert!(first.issues.iter().any(|i| i.code == IssueCode::UnresolvedSurplus));
        assert_approx(result.rows[1].contributions.get("efund"), 0.0);
        assert!(result.errors.is_empty(), "{:?}", result.errors);
        assert_row_identities(&result);
    }

    #[test]
    fn invested_assets_skip_accounts_outside_fi() {
        let mut h = single_account(100_000.0);
        let mut house = Account::new("house_fund", AccountType::Cash, 50_000.0);
        house.counts_toward_fi = false;
        h.accounts.push(house);
        let s = Scenario::new(0.07, 0.03, 0.04, 40_000.0);

        let result = project(&h, &s);
        for row in &result.rows {
            assert_approx(row.net_worth, row.ending_balances.total());
            assert_approx(row.invested_assets, row.ending_balances.get("brokerage"));
            assert!(row.invested_assets < row.net_worth);
        }
    }

    #[test]
    fn untaxed_pre_tax_withdrawals_are_a_model_error() {
        let mut h = Household::new("retired", 2025);
        h.people.push(Person::new("pat", Some(1950)));
        h.accounts.push(Account::new(
            "k401",
            AccountType::Traditional401k,
            1_000_000.0,
        ));
        let mut s = Scenario::new(0.07, 0.03, 0.04, 40_000.0);
        s.retirement_year = Some(2025);
        s.horizon_years = 2;

        let result = project(&h, &s);
        assert_approx(result.rows[0].withdrawals.get("k401"), 40_000.0);
        assert!(
            result
                .errors
                .iter()
                .any(|e| e.code == IssueCode::ZeroTaxDeferredRate && e.year == Some(2025))
        );
        assert_eq!(result.rows.len(), 2);
    }

    #[test]
    fn grants_vesting_after_retirement_or_horizon_are_flagged() {
        let mut h = single_account(500_000.0);
        h.people.push(Person::new("alex", Some(1960)));
        h.equity_grants.push(EquityGrant {
            id: "rsu".to_string(),
            owner_id: "alex".to_string(),
            vesting: BTreeMap::from([(2026, 10.0), (2040, 10.0)]),
            price: PricePath::Fixed { price: 100.0 },
            withholding_rate: 0.3,
            destination_account_id: Some("brokerage".to_string()),
            enabled: true,
        });
        let mut s = Scenario::new(0.07, 0.03, 0.04, 20_000.0);
        s.retirement_year = Some(2026);
        s.horizon_years = 3;

        let result = project(&h, &s);
        assert_approx(result.rows[1].equity_income, 0.0);
        assert!(
            result.rows[1]
                .issues
                .iter()
                .any(|i| i.code == IssueCode::EquityVestAfterRetirement)
        );
        assert!(
            result
                .warnings
                .iter()
                .any(|w| w.code == IssueCode::EquityVestPastHorizon)
        );
    }

    #[test]
    fn take_home_above_salary_warns_of_negative_tax() {
        let mut h = single_account(0.0);
        let mut alex = Person::new("alex", Some(1990));
        alex.income.base_salary = 100_000.0;
        h.people.push(alex);
        h.annual_spending = Some(150_000.0);
        let mut s = Scenario::new(0.07, 0.03, 0.04, 40_000.0);
        s.tax.net_to_checking_override = Some(150_000.0);
        s.horizon_years = 1;

        let result = project(&h, &s);
        let first = &result.rows[0];
        assert_approx(first.salary_taxes, -50_000.0);
        assert!(first.issues.iter().any(|i| i.code == IssueCode::NegativeImpliedTax));
        assert_row_identities(&result);
    }

    #[test]
    fn coast_fi_is_the_first_year_growth_alone_reaches_the_target() {
        // 1M compounding ~3.88% to 2045 is well past the 1.5M FI number.
        let h = single_account(1_000_000.0);
        let mut s = Scenario::new(0.07, 0.03, 0.04, 60_000.0);
        s.retirement_year = Some(2045);

        let result = project(&h, &s);
        assert_eq!(result.coast_fi_year, Some(2025));
        assert!(result.fi_year.is_some_and(|y| y > 2025));

        s.retirement_year = None;
        assert_eq!(project(&h, &s).coast_fi_year, None);
    }

    #[test]
    fn skipped_contributions_are_reported_on_the_row() {
        let h = earner_household();
        let mut s = earner_scenario();
        s.horizon_years = 1;
        s.include_employer_match = false;
        let limits = StaticContributionLimits::new().with(LimitBucket::Employee401k, 10_000.0);

        let result = project_with(&h, &s, &limits, None);
        let adjustments = result.rows[0].contribution_adjustments;
        assert_approx(adjustments.employer_excluded, 6_000.0);
        assert_approx(adjustments.capped_at_limit, 5_000.0);
        assert_approx(adjustments.emergency_fund_clamped, 0.0);
    }

    #[test]
    fn step_year_leaves_input_state_untouched() {
        let h = single_account(1_000.0);
        let s = Scenario::new(0.05, 0.0, 0.04, 40_000.0);
        let ctx = ProjectionContext::new(&h, &s, &NoContributionLimits, None);
        let state = ProjectionState::opening(&h);
        let before = state.clone();

        let (row, next) = step_year(&ctx, &state, Phase::Accumulation);
        assert_eq!(state, before);
        assert_eq!(next.year_index, 1);
        assert_eq!(next.year, 2026);
        assert_approx(next.balances.get("brokerage"), 1_050.0);
        assert_eq!(row.ending_balances, next.balances);
    }

    #[test]
    fn projection_is_deterministic() {
        let h = earner_household();
        let s = earner_scenario();
        assert_eq!(project(&h, &s), project(&h, &s));
    }

    #[test]
    fn checked_projection_rejects_dangling_references() {
        let mut h = earner_household();
        h.recurring_savings.push(Contribution::annual("nowhere", 1_000.0));
        let err = project_checked(&h, &earner_scenario()).expect_err("dangling ref");
        assert!(
            err.issues()
                .iter()
                .any(|i| i.code == IssueCode::DanglingAccountRef)
        );
    }

    #[test]
    fn injected_rates_replace_the_base_rate() {
        let h = single_account(100_000.0);
        let s = Scenario::new(0.07, 0.03, 0.04, 40_000.0);
        let result = project_with_rates(&h, &s, &[0.10, -0.10]);
        assert_approx(result.rows[0].ending_balances.get("brokerage"), 110_000.0);
        assert_approx(result.rows[1].ending_balances.get("brokerage"), 99_000.0);

        let mut with_yield = h.clone();
        with_yield.accounts.push(Account::new(
            "mm",
            AccountType::MoneyMarket {
                fixed_yield: Some(0.05),
            },
            1_000.0,
        ));
        let result = project_with_rates(&with_yield, &s, &[0.10, -0.10]);
        assert_approx(result.rows[0].ending_balances.get("mm"), 1_100.0);
        assert!(result.assumptions.iter().any(|a| a.contains("money-market")));
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(32))]

        #[test]
        fn prop_rows_balance_and_fi_year_is_first_crossing(
            salary in 0u32..300_000,
            pct_bp in 0u32..2_000,
            tax_bp in 0u32..4_000,
            spend in 0u32..150_000,
            recurring in 0u32..3_000,
            start in 0u32..2_000_000,
            pre_tax in 0u32..1_000_000
        ) {
            let mut h = Household::new("p", 2025);
            let mut alex = Person::new("alex", Some(1975));
            alex.income.base_salary = salary as f64;
            alex.income.growth_rate = 0.02;
            alex.payroll.contributions = vec![Contribution::percent("k401", pct_bp as f64 / 10_000.0)];
            h.people.push(alex);
            h.accounts.push(Account::new("brokerage", AccountType::Taxable, start as f64));
            h.accounts.push(Account::new("k401", AccountType::Traditional401k, pre_tax as f64));
            h.accounts.push(Account::new("cash", AccountType::Cash, 10_000.0));
            h.recurring_savings = vec![Contribution::monthly("brokerage", recurring as f64)];
            h.annual_spending = Some(spend as f64);

            let mut s = Scenario::new(0.07, 0.03, 0.04, 60_000.0);
            s.tax.effective_rate = Some(tax_bp as f64 / 10_000.0);
            s.retirement_trigger = RetirementTrigger::Fi;
            s.horizon_years = 25;

            let result = project(&h, &s);
            for row in &result.rows {
                prop_assert!((row.net_worth - row.ending_balances.total()).abs() <= EPS);
                prop_assert!((row.invested_assets - row.ending_balances.total()).abs() <= EPS);
                prop_assert!(row.reconciliation.delta.abs() <= RECONCILIATION_TOLERANCE);
                for (id, ending) in row.ending_balances.iter() {
                    let expected = row.begin_balances.get(id) + row.contributions.get(id)
                        - row.withdrawals.get(id) + row.growth.get(id);
                    prop_assert!((ending - expected).abs() <= 0.01);
                }
            }
            prop_assert!(!result.errors.iter().any(|e| e.code == IssueCode::ReconciliationMismatch));

            if let Some(fi_year) = result.fi_year {
                for row in &result.rows {
                    if row.year < fi_year {
                        prop_assert!(row.invested_assets < result.fi_number);
                    } else if row.year == fi_year {
                        prop_assert!(row.invested_assets >= result.fi_number);
                    }
                }
            }
        }
    }
}
