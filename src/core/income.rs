use super::types::{
    EquityGrant, Income, SalaryGrowthMode, Scenario, TakeHomeDefinition, TaxSettings,
};

/// How salary-path taxes and the cash landing in checking are derived.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum TaxMode {
    EffectiveRate(f64),
    TakeHome {
        annual: f64,
        definition: TakeHomeDefinition,
    },
    NetOverride(f64),
}

impl TaxMode {
    /// Picks the tax mode once per run. The net-to-checking override wins,
    /// then a take-home figure, then an effective rate.
    pub fn resolve(tax: &TaxSettings, assumptions: &mut Vec<String>) -> Self {
        if let Some(net) = tax.net_to_checking_override {
            return TaxMode::NetOverride(net);
        }
        if let Some(take_home) = tax.take_home {
            return TaxMode::TakeHome {
                annual: take_home.annual_amount,
                definition: take_home.definition,
            };
        }
        match tax.effective_rate {
            Some(rate) => TaxMode::EffectiveRate(rate),
            None => {
                assumptions.push(
                    "no tax mode configured; salary taxed at an effective rate of 0%".to_string(),
                );
                TaxMode::EffectiveRate(0.0)
            }
        }
    }

    pub fn effective_rate(self) -> Option<f64> {
        match self {
            TaxMode::EffectiveRate(rate) => Some(rate),
            _ => None,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub enum SalaryGrowth {
    Override(f64),
    PerPerson {
        mode: SalaryGrowthMode,
        inflation: f64,
    },
}

impl SalaryGrowth {
    pub fn resolve(scenario: &Scenario) -> Self {
        match scenario.salary_growth_override {
            Some(rate) => SalaryGrowth::Override(rate),
            None => SalaryGrowth::PerPerson {
                mode: scenario.salary_growth_mode,
                inflation: scenario.inflation,
            },
        }
    }

    pub fn annual_rate(self, income: &Income) -> f64 {
        match self {
            SalaryGrowth::Override(rate) => rate,
            SalaryGrowth::PerPerson {
                mode: SalaryGrowthMode::Nominal,
                ..
            } => income.growth_rate,
            SalaryGrowth::PerPerson {
                mode: SalaryGrowthMode::Real,
                inflation,
            } => {
                if income.growth_is_real {
                    income.growth_rate
                } else {
                    inflation
                }
            }
        }
    }

    pub fn factor(self, income: &Income, years_elapsed: usize) -> f64 {
        (1.0 + self.annual_rate(income)).powi(years_elapsed as i32)
    }
}

#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WageIncome {
    pub salary: f64,
    pub bonus: f64,
}

impl WageIncome {
    pub fn total(self) -> f64 {
        self.salary + self.bonus
    }
}

pub fn wage_income(income: &Income, growth: SalaryGrowth, years_elapsed: usize) -> WageIncome {
    let salary = income.base_salary.max(0.0) * growth.factor(income, years_elapsed);
    let bonus = income.bonus_fixed.max(0.0) + salary * income.bonus_percent.max(0.0);
    WageIncome { salary, bonus }
}

#[derive(Clone, Debug, PartialEq)]
pub struct VestOutcome {
    pub value: f64,
    pub withholding: f64,
    pub net_proceeds: f64,
}

pub fn vest_for_year(grant: &EquityGrant, year: i32) -> Option<VestOutcome> {
    let shares = grant.vesting.get(&year).copied()?;
    if shares <= 0.0 {
        return None;
    }
    let price = grant.price.price_in(year).max(0.0);
    let value = shares * price;
    let withholding = value * grant.withholding_rate.clamp(0.0, 1.0);
    Some(VestOutcome {
        value,
        withholding,
        net_proceeds: value - withholding,
    })
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TakeHome {
    pub net_to_checking: f64,
    pub salary_tax: f64,
}

/// Salary-side amounts for one household year.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct PayrollTotals {
    pub wages: f64,
    pub pre_tax_payroll: f64,
    pub employee_payroll: f64,
    pub deductions: f64,
    /// Household wages relative to the first projection year.
    pub wage_growth_factor: f64,
}

pub fn resolve_take_home(mode: TaxMode, totals: PayrollTotals) -> TakeHome {
    let PayrollTotals {
        wages,
        pre_tax_payroll,
        employee_payroll,
        deductions,
        wage_growth_factor,
    } = totals;

    match mode {
        TaxMode::EffectiveRate(rate) => {
            let taxable = (wages - pre_tax_payroll - deductions).max(0.0);
            let salary_tax = taxable * rate;
            TakeHome {
                net_to_checking: wages - employee_payroll - deductions - salary_tax,
                salary_tax,
            }
        }
        TaxMode::TakeHome {
            annual,
            definition: TakeHomeDefinition::NetToChecking,
        } => {
            let net_to_checking = annual * wage_growth_factor;
            TakeHome {
                net_to_checking,
                salary_tax: wages - employee_payroll - deductions - net_to_checking,
            }
        }
        TaxMode::TakeHome {
            annual,
            definition: TakeHomeDefinition::AfterTaxBeforeRetirement,
        } => {
            let after_tax = annual * wage_growth_factor;
            TakeHome {
                net_to_checking: after_tax - employee_payroll,
                salary_tax: wages - deductions - after_tax,
            }
        }
        TaxMode::NetOverride(net_to_checking) => TakeHome {
            net_to_checking,
            salary_tax: wages - employee_payroll - deductions - net_to_checking,
        },
    }
}
