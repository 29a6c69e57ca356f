use super::issues::{Issue, IssueCode};
use super::types::{Household, Phase, RetirementTrigger, Scenario, Shortfall};

/// Invested assets needed to sustain `annual_spend` at the safe withdrawal rate.
pub fn fi_number(annual_spend: f64, safe_withdrawal_rate: f64) -> f64 {
    if safe_withdrawal_rate <= 0.0 {
        return f64::INFINITY;
    }
    annual_spend / safe_withdrawal_rate
}

/// When the household stops accumulating, resolved once per run.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RetirementPlan {
    /// First withdrawal year is fixed.
    AtYear(i32),
    /// Withdrawal starts the year after invested assets first reach the FI number.
    OnFi,
}

impl RetirementPlan {
    pub fn resolve(
        household: &Household,
        scenario: &Scenario,
        warnings: &mut Vec<Issue>,
        assumptions: &mut Vec<String>,
    ) -> Self {
        match scenario.retirement_trigger {
            RetirementTrigger::Age => {
                match (household.oldest_birth_year(), scenario.target_retirement_age) {
                    (Some(born), Some(age)) => RetirementPlan::AtYear(born + age as i32),
                    _ => {
                        warnings.push(Issue::warning(
                            IssueCode::RetirementAgeUnresolved,
                            "age-triggered retirement needs a birth year and a target retirement age; \
                             retiring on reaching FI instead",
                        ));
                        assumptions.push("retirement falls back to the FI trigger".to_string());
                        RetirementPlan::OnFi
                    }
                }
            }
            RetirementTrigger::Fi => RetirementPlan::OnFi,
            RetirementTrigger::Either => match scenario.retirement_year {
                Some(year) => RetirementPlan::AtYear(year),
                None => {
                    assumptions.push(
                        "no retirement year configured; retiring the year after reaching FI"
                            .to_string(),
                    );
                    RetirementPlan::OnFi
                }
            },
        }
    }
}

/// The year coast-FI is measured against, if one can be determined.
pub fn coast_target_year(household: &Household, scenario: &Scenario) -> Option<i32> {
    scenario.retirement_year.or_else(|| {
        let born = household.oldest_birth_year()?;
        let age = scenario.target_retirement_age?;
        Some(born + age as i32)
    })
}

/// Assets left untouched at `rate` for `years` reach `fi_number`.
pub fn coast_fi_reached(invested: f64, rate: f64, years: i32, fi_number: f64) -> bool {
    invested * (1.0 + rate).powi(years.max(0)) >= fi_number
}

/// One-time check on the first retirement year of a fixed-year plan.
pub fn shortfall_check(
    year: i32,
    invested: f64,
    safe_withdrawal_rate: f64,
    target_spend: f64,
) -> Option<Shortfall> {
    let sustainable_spend = invested * safe_withdrawal_rate;
    if sustainable_spend >= target_spend {
        return None;
    }
    Some(Shortfall {
        year,
        invested_assets: invested,
        sustainable_spend,
        target_spend,
        gap: target_spend - sustainable_spend,
    })
}

#[derive(Clone, Debug)]
pub struct MilestoneTracker {
    plan: RetirementPlan,
    fi_number: f64,
    base_rate: f64,
    coast_target_year: Option<i32>,
    fi_year: Option<i32>,
    coast_fi_year: Option<i32>,
}

impl MilestoneTracker {
    pub fn new(
        plan: RetirementPlan,
        fi_number: f64,
        base_rate: f64,
        coast_target_year: Option<i32>,
    ) -> Self {
        Self {
            plan,
            fi_number,
            base_rate,
            coast_target_year,
            fi_year: None,
            coast_fi_year: None,
        }
    }

    /// Phase of `year`; once withdrawal starts it never reverts.
    pub fn phase_for(&self, year: i32) -> Phase {
        let retired = match self.plan {
            RetirementPlan::AtYear(first) => year >= first,
            RetirementPlan::OnFi => self.fi_year.is_some_and(|fi| year > fi),
        };
        if retired {
            Phase::Withdrawal
        } else {
            Phase::Accumulation
        }
    }

    /// Records the end-of-year invested assets. Returns true when this year is the FI year.
    pub fn observe(&mut self, year: i32, invested: f64) -> bool {
        if self.coast_fi_year.is_none() {
            if let Some(target) = self.coast_target_year {
                if year <= target
                    && coast_fi_reached(invested, self.base_rate, target - year, self.fi_number)
                {
                    self.coast_fi_year = Some(year);
                }
            }
        }
        if self.fi_year.is_none() && invested >= self.fi_number {
            self.fi_year = Some(year);
            return true;
        }
        false
    }

    pub fn has_fixed_retirement(&self) -> bool {
        matches!(self.plan, RetirementPlan::AtYear(_))
    }

    pub fn fi_year(&self) -> Option<i32> {
        self.fi_year
    }

    pub fn coast_fi_year(&self) -> Option<i32> {
        self.coast_fi_year
    }
}
