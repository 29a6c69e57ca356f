use std::collections::HashSet;

use super::issues::{Issue, IssueCode};
use super::types::{
    AccountType, Contribution, ContributionAmount, ContributorRole, EventKind, Household,
    MAX_HORIZON_YEARS, Scenario,
};

pub const MAX_SAFE_WITHDRAWAL_RATE: f64 = 0.10;
pub const RATE_BOUND: f64 = 0.5;
pub const AGGRESSIVE_NOMINAL_RETURN: f64 = 0.10;

/// Checks referential integrity and numeric ranges. Error-severity issues
/// mean the projection should not be trusted.
pub fn validate(household: &Household, scenario: &Scenario) -> Vec<Issue> {
    let mut issues = Vec::new();
    check_accounts(household, &mut issues);
    check_contributions(household, &mut issues);
    check_events(household, &mut issues);
    check_equity(household, &mut issues);
    check_scenario(household, scenario, &mut issues);
    issues
}

fn check_accounts(household: &Household, issues: &mut Vec<Issue>) {
    let mut seen = HashSet::new();
    for account in &household.accounts {
        if !seen.insert(account.id.as_str()) {
            issues.push(Issue::error(
                IssueCode::DuplicateAccountId,
                format!("account id '{}' is used more than once", account.id),
            ));
        }
        if account.starting_balance < 0.0 {
            issues.push(Issue::error(
                IssueCode::NegativeBalance,
                format!("account '{}' starts with a negative balance", account.id),
            ));
        }
        if let Some(owner) = account.owner_id.as_deref() {
            if household.person(owner).is_none() {
                issues.push(Issue::error(
                    IssueCode::DanglingPersonRef,
                    format!("account '{}' is owned by unknown person '{owner}'", account.id),
                ));
            }
        }
        if let AccountType::MoneyMarket {
            fixed_yield: Some(rate),
        } = account.account_type
        {
            check_rate(&format!("yield on '{}'", account.id), rate, issues);
        }
    }
}

fn check_contribution(
    household: &Household,
    contribution: &Contribution,
    source: &str,
    issues: &mut Vec<Issue>,
) {
    if household.account(&contribution.account_id).is_none() {
        issues.push(Issue::error(
            IssueCode::DanglingAccountRef,
            format!(
                "{source} contribution targets unknown account '{}'",
                contribution.account_id
            ),
        ));
    }
    let valid = contribution.amount().is_some_and(|amount| match amount {
        ContributionAmount::Annual(v)
        | ContributionAmount::Monthly(v)
        | ContributionAmount::PercentOfIncome(v) => v >= 0.0 && v.is_finite(),
    });
    if !valid {
        issues.push(Issue::error(
            IssueCode::InvalidContributionAmount,
            format!(
                "{source} contribution to '{}' needs exactly one non-negative amount",
                contribution.account_id
            ),
        ));
    }
}

fn check_contributions(household: &Household, issues: &mut Vec<Issue>) {
    for person in &household.people {
        for contribution in &person.payroll.contributions {
            check_contribution(
                household,
                contribution,
                &format!("payroll ({})", person.id),
                issues,
            );
        }
        check_rate(
            &format!("salary growth for '{}'", person.id),
            person.income.growth_rate,
            issues,
        );
    }
    for contribution in &household.out_of_pocket_contributions {
        check_contribution(household, contribution, "out-of-pocket", issues);
    }
    for contribution in &household.recurring_savings {
        check_contribution(household, contribution, "recurring", issues);
    }
    if let Some(goal) = &household.emergency_fund {
        if household.account(&goal.account_id).is_none() {
            issues.push(Issue::error(
                IssueCode::DanglingAccountRef,
                format!("emergency fund targets unknown account '{}'", goal.account_id),
            ));
        }
    }
}

fn check_events(household: &Household, issues: &mut Vec<Issue>) {
    for event in &household.events {
        match event.account_id.as_deref() {
            Some(id) if household.account(id).is_none() => issues.push(
                Issue::error(
                    IssueCode::DanglingAccountRef,
                    format!("event '{}' references unknown account '{id}'", event.name),
                )
                .in_year(event.year),
            ),
            None if event.kind == EventKind::Outflow => issues.push(
                Issue::error(
                    IssueCode::EventOutflowWithoutAccount,
                    format!("outflow event '{}' has no account to draw from", event.name),
                )
                .in_year(event.year),
            ),
            _ => {}
        }
    }
}

fn check_equity(household: &Household, issues: &mut Vec<Issue>) {
    for grant in &household.equity_grants {
        if household.person(&grant.owner_id).is_none() {
            issues.push(Issue::error(
                IssueCode::DanglingPersonRef,
                format!("grant '{}' is owned by unknown person '{}'", grant.id, grant.owner_id),
            ));
        }
        if let Some(id) = grant.destination_account_id.as_deref() {
            if household.account(id).is_none() {
                issues.push(Issue::error(
                    IssueCode::DanglingAccountRef,
                    format!("grant '{}' deposits into unknown account '{id}'", grant.id),
                ));
            }
        }
        if !(0.0..=1.0).contains(&grant.withholding_rate) {
            issues.push(Issue::error(
                IssueCode::InvalidWithholdingRate,
                format!("grant '{}' withholding must be between 0 and 1", grant.id),
            ));
        }
    }
}

fn check_rate(name: &str, rate: f64, issues: &mut Vec<Issue>) {
    if !(-RATE_BOUND..=RATE_BOUND).contains(&rate) {
        issues.push(Issue::error(
            IssueCode::RateOutOfRange,
            format!("{name} of {rate} is outside [-0.5, 0.5]"),
        ));
    }
}

fn check_scenario(household: &Household, scenario: &Scenario, issues: &mut Vec<Issue>) {
    let swr = scenario.safe_withdrawal_rate;
    if !(swr > 0.0 && swr <= MAX_SAFE_WITHDRAWAL_RATE) {
        issues.push(Issue::error(
            IssueCode::SwrOutOfRange,
            format!("safe withdrawal rate {swr} must be in (0, 0.10]"),
        ));
    }
    if !(1..=MAX_HORIZON_YEARS).contains(&scenario.horizon_years) {
        issues.push(Issue::error(
            IssueCode::HorizonOutOfRange,
            format!(
                "horizon of {} years must be between 1 and {MAX_HORIZON_YEARS}",
                scenario.horizon_years
            ),
        ));
    }
    check_rate("nominal return", scenario.nominal_return, issues);
    check_rate("inflation", scenario.inflation, issues);
    if let Some(rate) = scenario.salary_growth_override {
        check_rate("salary growth override", rate, issues);
    }
    if let Some(rate) = scenario.stress_test_first_year_return {
        check_rate("stress-test return", rate, issues);
    }

    if scenario.tax.effective_rate.is_some() && scenario.tax.take_home.is_some() {
        issues.push(Issue::error(
            IssueCode::ConflictingTaxMode,
            "set either an effective tax rate or a take-home amount, not both",
        ));
    }

    if let Some(id) = scenario.surplus_account_id.as_deref() {
        if household.account(id).is_none() {
            issues.push(Issue::error(
                IssueCode::DanglingAccountRef,
                format!("surplus account '{id}' does not exist"),
            ));
        }
    }

    if scenario.nominal_return > AGGRESSIVE_NOMINAL_RETURN {
        issues.push(Issue::warning(
            IssueCode::AggressiveReturn,
            format!(
                "a nominal return of {:.1}% is above the 10% long-run guide",
                scenario.nominal_return * 100.0
            ),
        ));
    }

    let has_employer_money = household
        .people
        .iter()
        .flat_map(|p| p.payroll.contributions.iter())
        .any(|c| c.role == ContributorRole::Employer);
    if has_employer_money && !scenario.include_employer_match {
        issues.push(Issue::warning(
            IssueCode::EmployerMatchExcluded,
            "employer contributions are configured but excluded by the scenario",
        ));
    }
}
