use super::types::{AccountType, ModelingMode, Scenario};

/// Fisher real return for a nominal return under the given inflation.
pub fn real_return(nominal: f64, inflation: f64) -> f64 {
    (1.0 + nominal) / (1.0 + inflation) - 1.0
}

/// Resolves the growth rate an account earns in a given projection year.
///
/// Priority: an injected per-year path (Monte Carlo), then the first-year
/// stress return, then a money-market fixed yield, then the scenario base rate.
#[derive(Clone, Debug)]
pub struct RateResolver<'a> {
    base: f64,
    mode: ModelingMode,
    inflation: f64,
    stress_first_year: Option<f64>,
    path: Option<&'a [f64]>,
}

impl<'a> RateResolver<'a> {
    pub fn new(scenario: &Scenario) -> Self {
        let base = match scenario.modeling_mode {
            ModelingMode::Real => real_return(scenario.nominal_return, scenario.inflation),
            ModelingMode::Nominal => scenario.nominal_return,
        };
        Self {
            base,
            mode: scenario.modeling_mode,
            inflation: scenario.inflation,
            stress_first_year: scenario.stress_test_first_year_return,
            path: None,
        }
    }

    pub fn with_path(scenario: &Scenario, path: &'a [f64]) -> Self {
        Self {
            path: Some(path),
            ..Self::new(scenario)
        }
    }

    pub fn base_rate(&self) -> f64 {
        self.base
    }

    pub fn rate_for(&self, account_type: AccountType, year_index: usize) -> f64 {
        if let Some(rate) = self.path.and_then(|p| p.get(year_index)) {
            return *rate;
        }
        if year_index == 0 {
            if let Some(rate) = self.stress_first_year {
                return rate;
            }
        }
        if let AccountType::MoneyMarket {
            fixed_yield: Some(fixed),
        } = account_type
        {
            return match self.mode {
                ModelingMode::Real => real_return(fixed, self.inflation),
                ModelingMode::Nominal => fixed,
            };
        }
        self.base
    }
}

/// Contributions are assumed to land evenly through the year.
pub fn accumulation_growth(rate: f64, begin: f64, net_contribution: f64) -> f64 {
    rate * (begin + 0.5 * net_contribution)
}

/// Withdrawals leave the account before the year's growth is earned.
pub fn withdrawal_growth(rate: f64, begin: f64, withdrawal: f64) -> f64 {
    rate * (begin - withdrawal)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert_eq, proptest};

    fn scenario() -> Scenario {
        Scenario::new(0.07, 0.03, 0.03, 96_000.0)
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_real_return_is_fisher_exact(
            nominal_bp in -5_000i32..5_001,
            inflation_bp in -5_000i32..5_001
        ) {
            let n = nominal_bp as f64 / 10_000.0;
            let i = inflation_bp as f64 / 10_000.0;
            prop_assert_eq!(real_return(n, i), (1.0 + n) / (1.0 + i) - 1.0);
        }
    }

    #[test]
    fn base_rate_follows_modeling_mode() {
        let mut s = scenario();
        let real = RateResolver::new(&s);
        assert_eq!(real.base_rate(), real_return(0.07, 0.03));

        s.modeling_mode = ModelingMode::Nominal;
        let nominal = RateResolver::new(&s);
        assert_eq!(nominal.base_rate(), 0.07);
    }

    #[test]
    fn overrides_apply_in_priority_order() {
        let mut s = scenario();
        s.stress_test_first_year_return = Some(-0.30);
        let mm = AccountType::MoneyMarket {
            fixed_yield: Some(0.05),
        };

        let resolver = RateResolver::new(&s);
        assert_eq!(resolver.rate_for(AccountType::Taxable, 0), -0.30);
        assert_eq!(resolver.rate_for(mm, 0), -0.30);
        assert_eq!(resolver.rate_for(mm, 1), real_return(0.05, 0.03));
        assert_eq!(resolver.rate_for(AccountType::Taxable, 1), resolver.base_rate());

        let path = [0.11, 0.12];
        let injected = RateResolver::with_path(&s, &path);
        assert_eq!(injected.rate_for(AccountType::Taxable, 0), 0.11);
        assert_eq!(injected.rate_for(mm, 1), 0.12);
        // Past the end of the path the normal rules apply again.
        assert_eq!(injected.rate_for(AccountType::Taxable, 2), resolver.base_rate());
    }

    #[test]
    fn money_market_without_yield_uses_base_rate() {
        let s = scenario();
        let resolver = RateResolver::new(&s);
        let mm = AccountType::MoneyMarket { fixed_yield: None };
        assert_eq!(resolver.rate_for(mm, 3), resolver.base_rate());
    }

    #[test]
    fn growth_conventions_differ_between_phases() {
        // Half of the contribution earns growth; withdrawals earn none.
        assert!((accumulation_growth(0.10, 1_000.0, 200.0) - 110.0).abs() < 1e-12);
        assert!((withdrawal_growth(0.10, 1_000.0, 200.0) - 80.0).abs() < 1e-12);
    }
}
