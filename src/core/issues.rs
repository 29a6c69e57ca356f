use serde::{Deserialize, Serialize};

use super::types::CashflowBreakdown;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueCode {
    // Blocking input problems.
    DuplicateAccountId,
    DanglingAccountRef,
    DanglingPersonRef,
    SwrOutOfRange,
    RateOutOfRange,
    NegativeBalance,
    ConflictingTaxMode,
    InvalidContributionAmount,
    EventOutflowWithoutAccount,
    InvalidWithholdingRate,
    HorizonOutOfRange,
    // Model consistency, raised while projecting.
    ReconciliationMismatch,
    ZeroTaxDeferredRate,
    // Advisory.
    AggressiveReturn,
    CashflowDeficit,
    EventOverdraft,
    UnfundedEquityVest,
    EquityVestPastHorizon,
    EquityVestAfterRetirement,
    EmployerMatchExcluded,
    UnresolvedSurplus,
    NegativeImpliedTax,
    RetirementAgeUnresolved,
    WithdrawalShortfall,
}

impl IssueCode {
    pub fn as_str(self) -> &'static str {
        match self {
            IssueCode::DuplicateAccountId => "DUPLICATE_ACCOUNT_ID",
            IssueCode::DanglingAccountRef => "DANGLING_ACCOUNT_REF",
            IssueCode::DanglingPersonRef => "DANGLING_PERSON_REF",
            IssueCode::SwrOutOfRange => "SWR_OUT_OF_RANGE",
            IssueCode::RateOutOfRange => "RATE_OUT_OF_RANGE",
            IssueCode::NegativeBalance => "NEGATIVE_BALANCE",
            IssueCode::ConflictingTaxMode => "CONFLICTING_TAX_MODE",
            IssueCode::InvalidContributionAmount => "INVALID_CONTRIBUTION_AMOUNT",
            IssueCode::EventOutflowWithoutAccount => "EVENT_OUTFLOW_WITHOUT_ACCOUNT",
            IssueCode::InvalidWithholdingRate => "INVALID_WITHHOLDING_RATE",
            IssueCode::HorizonOutOfRange => "HORIZON_OUT_OF_RANGE",
            IssueCode::ReconciliationMismatch => "RECONCILIATION_MISMATCH",
            IssueCode::ZeroTaxDeferredRate => "ZERO_TAX_DEFERRED_RATE",
            IssueCode::AggressiveReturn => "AGGRESSIVE_RETURN",
            IssueCode::CashflowDeficit => "CASHFLOW_DEFICIT",
            IssueCode::EventOverdraft => "EVENT_OVERDRAFT",
            IssueCode::UnfundedEquityVest => "UNFUNDED_EQUITY_VEST",
            IssueCode::EquityVestPastHorizon => "EQUITY_VEST_PAST_HORIZON",
            IssueCode::EquityVestAfterRetirement => "EQUITY_VEST_AFTER_RETIREMENT",
            IssueCode::EmployerMatchExcluded => "EMPLOYER_MATCH_EXCLUDED",
            IssueCode::UnresolvedSurplus => "UNRESOLVED_SURPLUS",
            IssueCode::NegativeImpliedTax => "NEGATIVE_IMPLIED_TAX",
            IssueCode::RetirementAgeUnresolved => "RETIREMENT_AGE_UNRESOLVED",
            IssueCode::WithdrawalShortfall => "WITHDRAWAL_SHORTFALL",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Issue {
    pub code: IssueCode,
    pub severity: Severity,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub breakdown: Option<CashflowBreakdown>,
}

impl Issue {
    pub fn error(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Error,
            message: message.into(),
            year: None,
            breakdown: None,
        }
    }

    pub fn warning(code: IssueCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: Severity::Warning,
            message: message.into(),
            year: None,
            breakdown: None,
        }
    }

    pub fn in_year(mut self, year: i32) -> Self {
        self.year = Some(year);
        self
    }

    pub fn with_breakdown(mut self, breakdown: CashflowBreakdown) -> Self {
        self.breakdown = Some(breakdown);
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

pub fn has_errors(issues: &[Issue]) -> bool {
    issues.iter().any(Issue::is_error)
}
