use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::issues::Issue;
use super::ledger::Ledger;

pub type AccountId = String;
pub type PersonId = String;

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    "USD".to_string()
}

/// Longest horizon a projection will simulate.
pub const MAX_HORIZON_YEARS: u32 = 150;

fn default_horizon_years() -> u32 {
    50
}

fn default_bucket_order() -> Vec<WithdrawalBucket> {
    vec![
        WithdrawalBucket::Taxable,
        WithdrawalBucket::TaxDeferred,
        WithdrawalBucket::Roth,
    ]
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ModelingMode {
    #[default]
    Real,
    Nominal,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithdrawalBucket {
    Taxable,
    TaxDeferred,
    Roth,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum AccountType {
    Cash,
    Taxable,
    MoneyMarket {
        #[serde(default, rename = "yield")]
        fixed_yield: Option<f64>,
    },
    #[serde(rename = "traditional-401k")]
    Traditional401k,
    TraditionalIra,
    #[serde(rename = "roth-401k")]
    Roth401k,
    RothIra,
    Hsa,
}

impl AccountType {
    pub fn bucket(self) -> WithdrawalBucket {
        match self {
            AccountType::Cash | AccountType::Taxable | AccountType::MoneyMarket { .. } => {
                WithdrawalBucket::Taxable
            }
            AccountType::Traditional401k | AccountType::TraditionalIra | AccountType::Hsa => {
                WithdrawalBucket::TaxDeferred
            }
            AccountType::Roth401k | AccountType::RothIra => WithdrawalBucket::Roth,
        }
    }

    /// Employee payroll contributions into these accounts come out of salary before tax.
    pub fn is_pre_tax(self) -> bool {
        matches!(
            self,
            AccountType::Traditional401k | AccountType::TraditionalIra | AccountType::Hsa
        )
    }

    pub fn is_cash_like(self) -> bool {
        matches!(self, AccountType::Cash | AccountType::MoneyMarket { .. })
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Account {
    pub id: AccountId,
    #[serde(default)]
    pub name: String,
    #[serde(rename = "type")]
    pub account_type: AccountType,
    #[serde(default)]
    pub owner_id: Option<PersonId>,
    #[serde(default)]
    pub starting_balance: f64,
    #[serde(default = "default_true")]
    pub counts_toward_fi: bool,
}

impl Account {
    pub fn new(id: &str, account_type: AccountType, starting_balance: f64) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            account_type,
            owner_id: None,
            starting_balance,
            counts_toward_fi: true,
        }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ContributorRole {
    #[default]
    Employee,
    Employer,
}

/// The single amount mode a contribution resolves to.
#[derive(Copy, Clone, Debug, PartialEq)]
pub enum ContributionAmount {
    Annual(f64),
    Monthly(f64),
    /// Fraction of the relevant wage income, e.g. `0.06` for 6%.
    PercentOfIncome(f64),
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Contribution {
    pub account_id: AccountId,
    #[serde(default)]
    pub annual_amount: Option<f64>,
    #[serde(default)]
    pub monthly_amount: Option<f64>,
    #[serde(default)]
    pub percent_of_income: Option<f64>,
    #[serde(default)]
    pub role: ContributorRole,
    #[serde(default)]
    pub start_year: Option<i32>,
    #[serde(default)]
    pub start_month: Option<u32>,
    #[serde(default)]
    pub end_year: Option<i32>,
    #[serde(default)]
    pub end_month: Option<u32>,
}

impl Contribution {
    pub fn annual(account_id: &str, amount: f64) -> Self {
        Self {
            account_id: account_id.to_string(),
            annual_amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn monthly(account_id: &str, amount: f64) -> Self {
        Self {
            account_id: account_id.to_string(),
            monthly_amount: Some(amount),
            ..Self::default()
        }
    }

    pub fn percent(account_id: &str, fraction: f64) -> Self {
        Self {
            account_id: account_id.to_string(),
            percent_of_income: Some(fraction),
            ..Self::default()
        }
    }

    pub fn from_employer(mut self) -> Self {
        self.role = ContributorRole::Employer;
        self
    }

    /// Returns the amount mode when exactly one of the three is set.
    pub fn amount(&self) -> Option<ContributionAmount> {
        match (
            self.annual_amount,
            self.monthly_amount,
            self.percent_of_income,
        ) {
            (Some(v), None, None) => Some(ContributionAmount::Annual(v)),
            (None, Some(v), None) => Some(ContributionAmount::Monthly(v)),
            (None, None, Some(v)) => Some(ContributionAmount::PercentOfIncome(v)),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Income {
    pub base_salary: f64,
    pub growth_rate: f64,
    pub growth_is_real: bool,
    pub bonus_fixed: f64,
    /// Fraction of that year's salary paid as bonus.
    pub bonus_percent: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Payroll {
    pub contributions: Vec<Contribution>,
    /// Annual non-investing payroll deductions (insurance premiums and the like).
    pub deductions: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: PersonId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub birth_year: Option<i32>,
    #[serde(default)]
    pub income: Income,
    #[serde(default)]
    pub payroll: Payroll,
}

impl Person {
    pub fn new(id: &str, birth_year: Option<i32>) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            birth_year,
            income: Income::default(),
            payroll: Payroll::default(),
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "kebab-case")]
pub enum PricePath {
    Fixed {
        price: f64,
    },
    #[serde(rename_all = "camelCase")]
    Growth {
        base_price: f64,
        base_year: i32,
        rate: f64,
    },
}

impl PricePath {
    pub fn price_in(self, year: i32) -> f64 {
        match self {
            PricePath::Fixed { price } => price,
            PricePath::Growth {
                base_price,
                base_year,
                rate,
            } => base_price * (1.0 + rate).powi(year - base_year),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EquityGrant {
    pub id: String,
    pub owner_id: PersonId,
    /// Shares vesting per calendar year.
    pub vesting: BTreeMap<i32, f64>,
    pub price: PricePath,
    pub withholding_rate: f64,
    #[serde(default)]
    pub destination_account_id: Option<AccountId>,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EventKind {
    Inflow,
    Outflow,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OneTimeEvent {
    #[serde(default)]
    pub name: String,
    pub year: i32,
    pub amount: f64,
    pub kind: EventKind,
    #[serde(default)]
    pub account_id: Option<AccountId>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyFundGoal {
    pub account_id: AccountId,
    pub target: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Household {
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub start_year: i32,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub people: Vec<Person>,
    #[serde(default)]
    pub accounts: Vec<Account>,
    #[serde(default)]
    pub events: Vec<OneTimeEvent>,
    #[serde(default)]
    pub equity_grants: Vec<EquityGrant>,
    #[serde(default)]
    pub out_of_pocket_contributions: Vec<Contribution>,
    #[serde(default)]
    pub recurring_savings: Vec<Contribution>,
    #[serde(default)]
    pub emergency_fund: Option<EmergencyFundGoal>,
    /// Living spend while accumulating; the residual of take-home cash when absent.
    #[serde(default)]
    pub annual_spending: Option<f64>,
}

impl Household {
    pub fn new(id: &str, start_year: i32) -> Self {
        Self {
            id: id.to_string(),
            name: id.to_string(),
            start_year,
            currency: default_currency(),
            people: Vec::new(),
            accounts: Vec::new(),
            events: Vec::new(),
            equity_grants: Vec::new(),
            out_of_pocket_contributions: Vec::new(),
            recurring_savings: Vec::new(),
            emergency_fund: None,
            annual_spending: None,
        }
    }

    pub fn account(&self, id: &str) -> Option<&Account> {
        self.accounts.iter().find(|a| a.id == id)
    }

    pub fn person(&self, id: &str) -> Option<&Person> {
        self.people.iter().find(|p| p.id == id)
    }

    pub fn oldest_birth_year(&self) -> Option<i32> {
        self.people.iter().filter_map(|p| p.birth_year).min()
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TakeHomeDefinition {
    /// The literal amount landing in checking.
    #[default]
    NetToChecking,
    /// Pay after tax and deductions but before retirement contributions.
    AfterTaxBeforeRetirement,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TakeHomeSettings {
    pub annual_amount: f64,
    #[serde(default)]
    pub definition: TakeHomeDefinition,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TaxSettings {
    pub effective_rate: Option<f64>,
    pub take_home: Option<TakeHomeSettings>,
    pub net_to_checking_override: Option<f64>,
    pub retirement_tax_rate: Option<f64>,
    pub taxable_withdrawal_rate: f64,
    pub gross_up_taxable: bool,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum WithinBucketOrder {
    #[default]
    SmallestFirst,
    LargestFirst,
    Declared,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SalaryGrowthMode {
    #[default]
    Nominal,
    Real,
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RetirementTrigger {
    Age,
    Fi,
    #[default]
    Either,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Scenario {
    #[serde(default)]
    pub modeling_mode: ModelingMode,
    pub nominal_return: f64,
    pub inflation: f64,
    pub safe_withdrawal_rate: f64,
    pub annual_retirement_spend: f64,
    #[serde(default)]
    pub tax: TaxSettings,
    #[serde(default = "default_bucket_order")]
    pub bucket_order: Vec<WithdrawalBucket>,
    #[serde(default)]
    pub within_bucket: WithinBucketOrder,
    #[serde(default)]
    pub salary_growth_mode: SalaryGrowthMode,
    #[serde(default)]
    pub salary_growth_override: Option<f64>,
    #[serde(default)]
    pub retirement_trigger: RetirementTrigger,
    #[serde(default)]
    pub target_retirement_age: Option<u32>,
    #[serde(default)]
    pub retirement_year: Option<i32>,
    #[serde(default)]
    pub stress_test_first_year_return: Option<f64>,
    #[serde(default)]
    pub surplus_account_id: Option<AccountId>,
    #[serde(default = "default_true")]
    pub include_employer_match: bool,
    /// Per-grant enable flags that win over the grant's own flag.
    #[serde(default)]
    pub equity_overrides: BTreeMap<String, bool>,
    #[serde(default = "default_horizon_years")]
    pub horizon_years: u32,
}

impl Scenario {
    pub fn new(
        nominal_return: f64,
        inflation: f64,
        safe_withdrawal_rate: f64,
        annual_retirement_spend: f64,
    ) -> Self {
        Self {
            modeling_mode: ModelingMode::Real,
            nominal_return,
            inflation,
            safe_withdrawal_rate,
            annual_retirement_spend,
            tax: TaxSettings::default(),
            bucket_order: default_bucket_order(),
            within_bucket: WithinBucketOrder::default(),
            salary_growth_mode: SalaryGrowthMode::default(),
            salary_growth_override: None,
            retirement_trigger: RetirementTrigger::default(),
            target_retirement_age: None,
            retirement_year: None,
            stress_test_first_year_return: None,
            surplus_account_id: None,
            include_employer_match: true,
            equity_overrides: BTreeMap::new(),
            horizon_years: default_horizon_years(),
        }
    }

    /// Rows a projection produces; horizons past the maximum are cut short.
    pub fn simulated_years(&self) -> u32 {
        self.horizon_years.min(MAX_HORIZON_YEARS)
    }

    /// First calendar year after the simulated horizon.
    pub fn horizon_end(&self, start_year: i32) -> i32 {
        start_year.saturating_add(self.simulated_years() as i32)
    }

    pub fn grant_enabled(&self, grant: &EquityGrant) -> bool {
        self.equity_overrides
            .get(&grant.id)
            .copied()
            .unwrap_or(grant.enabled)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Phase {
    Accumulation,
    Withdrawal,
}

/// Sources and uses of one year's cash, kept for reconciliation diagnostics.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CashflowBreakdown {
    pub income: f64,
    pub employer_contributions: f64,
    pub other_inflows: f64,
    pub withdrawals: f64,
    pub spending: f64,
    pub contributions: f64,
    pub taxes: f64,
    pub deductions: f64,
    pub event_deposits: f64,
    pub delta: f64,
}

impl CashflowBreakdown {
    pub fn sources(&self) -> f64 {
        self.income + self.employer_contributions + self.other_inflows + self.withdrawals
    }

    pub fn uses(&self) -> f64 {
        self.spending + self.contributions + self.taxes + self.deductions + self.event_deposits
    }

    pub fn reconciled(mut self) -> Self {
        self.delta = self.sources() - self.uses();
        self
    }
}

/// Requested contributions that were not deposited, by reason.
#[derive(Copy, Clone, Debug, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionAdjustments {
    /// Employer money left out because the scenario excludes it.
    pub employer_excluded: f64,
    pub capped_at_limit: f64,
    pub emergency_fund_clamped: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearRow {
    pub year: i32,
    pub phase: Phase,
    pub gross_income: f64,
    pub equity_income: f64,
    pub salary_taxes: f64,
    pub equity_withholding: f64,
    pub withdrawal_taxes: f64,
    pub taxes: f64,
    pub spending: f64,
    pub payroll_deductions: f64,
    pub begin_balances: Ledger,
    pub event_flows: Ledger,
    pub contributions: Ledger,
    pub employer_contributions: Ledger,
    pub growth: Ledger,
    pub withdrawals: Ledger,
    pub ending_balances: Ledger,
    pub net_worth: f64,
    pub invested_assets: f64,
    pub withdrawal_shortfall: f64,
    pub contribution_adjustments: ContributionAdjustments,
    pub reconciliation: CashflowBreakdown,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub issues: Vec<Issue>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Shortfall {
    pub year: i32,
    pub invested_assets: f64,
    pub sustainable_spend: f64,
    pub target_spend: f64,
    pub gap: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectionResult {
    pub rows: Vec<YearRow>,
    pub fi_number: f64,
    pub fi_year: Option<i32>,
    pub coast_fi_year: Option<i32>,
    pub retirement_year: Option<i32>,
    pub shortfall: Option<Shortfall>,
    pub savings_rate: Option<f64>,
    pub errors: Vec<Issue>,
    pub warnings: Vec<Issue>,
    pub assumptions: Vec<String>,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloConfig {
    pub paths: u32,
    /// Annual return volatility as a fraction, e.g. `0.15`.
    pub volatility: f64,
    pub seed: u64,
}

#[derive(Copy, Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloSummary {
    pub paths: u32,
    pub reached_fi: u32,
    pub fi_year_25: f64,
    pub fi_year_50: f64,
    pub fi_year_75: f64,
    pub sentinel_year: i32,
}
