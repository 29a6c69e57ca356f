use std::collections::{BTreeMap, HashMap};

use super::ledger::Ledger;
use super::types::{
    AccountType, Contribution, ContributionAdjustments, ContributionAmount, ContributorRole,
    Household,
};

/// Contribution limit pools; a pool is shared by all of one owner's accounts in it.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub enum LimitBucket {
    Employee401k,
    Total401k,
    Ira,
    Hsa,
}

/// Annual contribution limits, looked up by pool and calendar year.
pub trait ContributionLimitTable: Send + Sync {
    fn annual_limit(&self, bucket: LimitBucket, year: i32) -> Option<f64>;
}

#[derive(Copy, Clone, Debug, Default)]
pub struct NoContributionLimits;

impl ContributionLimitTable for NoContributionLimits {
    fn annual_limit(&self, _bucket: LimitBucket, _year: i32) -> Option<f64> {
        None
    }
}

/// The same limit every year.
#[derive(Clone, Debug, Default)]
pub struct StaticContributionLimits {
    limits: HashMap<LimitBucket, f64>,
}

impl StaticContributionLimits {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, bucket: LimitBucket, amount: f64) -> Self {
        self.limits.insert(bucket, amount);
        self
    }
}

impl ContributionLimitTable for StaticContributionLimits {
    fn annual_limit(&self, bucket: LimitBucket, _year: i32) -> Option<f64> {
        self.limits.get(&bucket).copied()
    }
}

/// (employee pool, pool shared with employer money)
fn limit_pools(account_type: AccountType) -> Option<(LimitBucket, LimitBucket)> {
    match account_type {
        AccountType::Traditional401k | AccountType::Roth401k => {
            Some((LimitBucket::Employee401k, LimitBucket::Total401k))
        }
        AccountType::TraditionalIra | AccountType::RothIra => {
            Some((LimitBucket::Ira, LimitBucket::Ira))
        }
        AccountType::Hsa => Some((LimitBucket::Hsa, LimitBucket::Hsa)),
        _ => None,
    }
}

pub fn active_months(contribution: &Contribution, year: i32) -> u32 {
    let first = match contribution.start_year {
        Some(start) if start > year => return 0,
        Some(start) if start == year => contribution.start_month.unwrap_or(1).clamp(1, 12),
        _ => 1,
    };
    let last = match contribution.end_year {
        Some(end) if end < year => return 0,
        Some(end) if end == year => contribution.end_month.unwrap_or(12).clamp(1, 12),
        _ => 12,
    };
    if last < first { 0 } else { last - first + 1 }
}

pub fn active_month_fraction(contribution: &Contribution, year: i32) -> f64 {
    active_months(contribution, year) as f64 / 12.0
}

/// Annual amount a contribution resolves to in `year`, prorated for partial years.
pub fn resolved_amount(contribution: &Contribution, year: i32, income_base: f64) -> f64 {
    let months = active_months(contribution, year);
    if months == 0 {
        return 0.0;
    }
    let fraction = months as f64 / 12.0;
    let amount = match contribution.amount() {
        Some(ContributionAmount::Annual(annual)) => annual * fraction,
        Some(ContributionAmount::Monthly(monthly)) => monthly * months as f64,
        Some(ContributionAmount::PercentOfIncome(pct)) => pct * income_base * fraction,
        None => 0.0,
    };
    amount.max(0.0)
}

pub struct ContributionInputs<'a> {
    pub household: &'a Household,
    pub year: i32,
    pub wages_by_person: &'a BTreeMap<String, f64>,
    pub household_wages: f64,
    pub opening_balances: &'a Ledger,
    pub vesting_deposits: &'a Ledger,
    pub include_employer: bool,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ContributionPlan {
    pub employee_payroll: Ledger,
    pub employer: Ledger,
    pub out_of_pocket: Ledger,
    pub recurring: Ledger,
    pub vesting: Ledger,
    /// Employee payroll landing in pre-tax accounts.
    pub pre_tax_payroll: f64,
    pub employer_excluded: f64,
    pub capped_off: f64,
    pub emergency_fund_clamped: f64,
}

impl ContributionPlan {
    pub fn by_account(&self) -> Ledger {
        self.employee_payroll
            .merged(&self.employer)
            .merged(&self.out_of_pocket)
            .merged(&self.recurring)
            .merged(&self.vesting)
    }

    /// Savings paid out of take-home cash.
    pub fn from_take_home(&self) -> f64 {
        self.out_of_pocket.total() + self.recurring.total()
    }

    /// Room left under the emergency-fund target in `id` once this plan is
    /// deposited. Unbounded for any account other than the goal account.
    pub fn goal_headroom(&self, household: &Household, opening: &Ledger, id: &str) -> f64 {
        match household.emergency_fund.as_ref() {
            Some(goal) if goal.account_id == id => {
                (goal.target - opening.get(id) - self.by_account().get(id)).max(0.0)
            }
            _ => f64::INFINITY,
        }
    }

    pub fn adjustments(&self) -> ContributionAdjustments {
        ContributionAdjustments {
            employer_excluded: self.employer_excluded,
            capped_at_limit: self.capped_off,
            emergency_fund_clamped: self.emergency_fund_clamped,
        }
    }
}

/// Merges every contribution source for one year, then applies the
/// emergency-fund headroom clamp and the external limit table.
pub fn aggregate_contributions(
    inputs: &ContributionInputs<'_>,
    limits: &dyn ContributionLimitTable,
) -> ContributionPlan {
    let household = inputs.household;
    let mut plan = ContributionPlan {
        vesting: inputs.vesting_deposits.clone(),
        ..ContributionPlan::default()
    };

    for person in &household.people {
        let wages = inputs
            .wages_by_person
            .get(&person.id)
            .copied()
            .unwrap_or(0.0);
        for contribution in &person.payroll.contributions {
            if household.account(&contribution.account_id).is_none() {
                continue;
            }
            let amount = resolved_amount(contribution, inputs.year, wages);
            if amount <= 0.0 {
                continue;
            }
            match contribution.role {
                ContributorRole::Employee => {
                    plan.employee_payroll.add(&contribution.account_id, amount)
                }
                ContributorRole::Employer if inputs.include_employer => {
                    plan.employer.add(&contribution.account_id, amount)
                }
                ContributorRole::Employer => plan.employer_excluded += amount,
            }
        }
    }

    for (list, ledger) in [
        (&household.out_of_pocket_contributions, &mut plan.out_of_pocket),
        (&household.recurring_savings, &mut plan.recurring),
    ] {
        for contribution in list {
            if household.account(&contribution.account_id).is_none() {
                continue;
            }
            let amount = resolved_amount(contribution, inputs.year, inputs.household_wages);
            if amount > 0.0 {
                ledger.add(&contribution.account_id, amount);
            }
        }
    }

    clamp_to_emergency_fund(inputs, &mut plan);
    apply_limits(inputs, limits, &mut plan);

    plan.pre_tax_payroll = plan.employee_payroll.total_where(|id| {
        household
            .account(id)
            .is_some_and(|a| a.account_type.is_pre_tax())
    });
    plan
}

fn clamp_to_emergency_fund(inputs: &ContributionInputs<'_>, plan: &mut ContributionPlan) {
    let Some(goal) = inputs.household.emergency_fund.as_ref() else {
        return;
    };
    let id = goal.account_id.as_str();
    let already = inputs.opening_balances.get(id)
        + plan.employee_payroll.get(id)
        + plan.employer.get(id)
        + plan.vesting.get(id);
    let mut headroom = (goal.target - already).max(0.0);

    // Recurring savings give way before out-of-pocket contributions.
    for ledger in [&mut plan.recurring, &mut plan.out_of_pocket] {
        let requested = ledger.get(id);
        if requested <= 0.0 {
            continue;
        }
        let allowed = requested.min(headroom);
        headroom -= allowed;
        plan.emergency_fund_clamped += requested - allowed;
        ledger.set(id, allowed);
    }
}

fn apply_limits(
    inputs: &ContributionInputs<'_>,
    limits: &dyn ContributionLimitTable,
    plan: &mut ContributionPlan,
) {
    let mut remaining: HashMap<(String, LimitBucket), Option<f64>> = HashMap::new();
    let mut take = |owner: &str, bucket: LimitBucket, want: f64| -> f64 {
        let slot = remaining
            .entry((owner.to_string(), bucket))
            .or_insert_with(|| limits.annual_limit(bucket, inputs.year));
        match slot {
            None => want,
            Some(left) => {
                let granted = want.min(*left).max(0.0);
                *left -= granted;
                granted
            }
        }
    };

    for account in &inputs.household.accounts {
        let Some((employee_pool, shared_pool)) = limit_pools(account.account_type) else {
            continue;
        };
        let owner = account.owner_id.as_deref().unwrap_or("");
        let id = account.id.as_str();

        let payroll = plan.employee_payroll.get(id);
        let out_of_pocket = plan.out_of_pocket.get(id);
        let recurring = plan.recurring.get(id);
        let employee_wanted = payroll + out_of_pocket + recurring;

        let mut employee_allowed = take(owner, employee_pool, employee_wanted);
        if shared_pool != employee_pool {
            let shared = take(owner, shared_pool, employee_allowed);
            employee_allowed = shared;
        }

        // Payroll keeps first claim on the limit.
        let mut left = employee_allowed;
        for (ledger, requested) in [
            (&mut plan.employee_payroll, payroll),
            (&mut plan.out_of_pocket, out_of_pocket),
            (&mut plan.recurring, recurring),
        ] {
            if requested <= 0.0 {
                continue;
            }
            let kept = requested.min(left);
            left -= kept;
            ledger.set(id, kept);
        }
        plan.capped_off += employee_wanted - employee_allowed;

        let employer_wanted = plan.employer.get(id);
        if employer_wanted > 0.0 {
            let employer_allowed = take(owner, shared_pool, employer_wanted);
            plan.employer.set(id, employer_allowed);
            plan.capped_off += employer_wanted - employer_allowed;
        }
    }
}
