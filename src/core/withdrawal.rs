use super::ledger::Ledger;
use super::types::{Account, AccountType, WithdrawalBucket, WithinBucketOrder};

pub const TAX_DEFERRED_ACCESS_AGE: f64 = 59.5;
pub const HSA_ACCESS_AGE: f64 = 65.0;

const MAX_WITHDRAWAL_TAX_RATE: f64 = 0.99;

/// Whether an account may be drawn in `year`. Without a birth year on file
/// every account is treated as accessible.
pub fn is_accessible(account_type: AccountType, year: i32, oldest_birth_year: Option<i32>) -> bool {
    let Some(birth_year) = oldest_birth_year else {
        return true;
    };
    let age = (year - birth_year) as f64;
    match account_type {
        AccountType::Hsa => age >= HSA_ACCESS_AGE,
        AccountType::Traditional401k | AccountType::TraditionalIra => {
            age >= TAX_DEFERRED_ACCESS_AGE
        }
        _ => true,
    }
}

fn full_bucket_order(requested: &[WithdrawalBucket]) -> Vec<WithdrawalBucket> {
    let mut order = Vec::with_capacity(3);
    for bucket in requested.iter().copied().chain([
        WithdrawalBucket::Taxable,
        WithdrawalBucket::TaxDeferred,
        WithdrawalBucket::Roth,
    ]) {
        if !order.contains(&bucket) {
            order.push(bucket);
        }
    }
    order
}

/// Draw order for the accessible accounts holding a positive balance.
pub fn order_accounts<'a>(
    accounts: &'a [Account],
    balances: &Ledger,
    bucket_order: &[WithdrawalBucket],
    within: WithinBucketOrder,
    year: i32,
    oldest_birth_year: Option<i32>,
) -> Vec<&'a Account> {
    let mut ordered = Vec::with_capacity(accounts.len());
    for bucket in full_bucket_order(bucket_order) {
        let mut members: Vec<&Account> = accounts
            .iter()
            .filter(|a| a.account_type.bucket() == bucket)
            .filter(|a| balances.get(&a.id) > 0.0)
            .filter(|a| is_accessible(a.account_type, year, oldest_birth_year))
            .collect();
        match within {
            WithinBucketOrder::SmallestFirst => {
                members.sort_by(|a, b| balances.get(&a.id).total_cmp(&balances.get(&b.id)))
            }
            WithinBucketOrder::LargestFirst => {
                members.sort_by(|a, b| balances.get(&b.id).total_cmp(&balances.get(&a.id)))
            }
            WithinBucketOrder::Declared => {}
        }
        ordered.extend(members);
    }
    ordered
}

/// Tax rates applied to withdrawals, resolved once per run.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct WithdrawalRates {
    pub tax_deferred: f64,
    /// Applied to `Taxable` accounts only when gross-up is enabled.
    pub taxable: Option<f64>,
}

impl WithdrawalRates {
    pub fn rate_for(&self, account_type: AccountType) -> f64 {
        let rate = match account_type {
            AccountType::Taxable => self.taxable.unwrap_or(0.0),
            t if t.bucket() == WithdrawalBucket::TaxDeferred => self.tax_deferred,
            _ => 0.0,
        };
        rate.clamp(0.0, MAX_WITHDRAWAL_TAX_RATE)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct WithdrawalPlan {
    pub withdrawals: Ledger,
    pub taxes: f64,
    pub net_realized: f64,
    pub shortfall: f64,
    pub tax_deferred_gross: f64,
}

/// Draws `need` of after-tax spending from `ordered`, grossing up taxed draws.
pub fn allocate_withdrawals(
    ordered: &[&Account],
    balances: &Ledger,
    need: f64,
    rates: WithdrawalRates,
) -> WithdrawalPlan {
    let mut plan = WithdrawalPlan::default();
    let mut remaining = need.max(0.0);

    for account in ordered {
        if remaining <= 0.0 {
            break;
        }
        let available = balances.get(&account.id);
        if available <= 0.0 {
            continue;
        }
        let rate = rates.rate_for(account.account_type);
        let wanted = remaining / (1.0 - rate);
        let (draw, net) = if wanted <= available {
            (wanted, remaining)
        } else {
            (available, available * (1.0 - rate))
        };
        let tax = draw - net;

        plan.withdrawals.add(&account.id, draw);
        plan.taxes += tax;
        plan.net_realized += net;
        if account.account_type.bucket() == WithdrawalBucket::TaxDeferred {
            plan.tax_deferred_gross += draw;
        }
        remaining = if wanted <= available { 0.0 } else { remaining - net };
    }

    plan.shortfall = remaining;
    plan
}
