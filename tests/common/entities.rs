use uuid::Uuid;

/// Sample Account entity for testing
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    pub id: Uuid,
    pub owner: String,
    pub balance: i64,
}

impl Account {
    pub fn open(owner: &str, balance: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            owner: owner.to_string(),
            balance,
        }
    }
}

/// Sample ledger entry recorded against an account
#[derive(Debug, Clone, PartialEq)]
pub struct LedgerEntry {
    pub id: Uuid,
    pub account_id: Uuid,
    pub amount: i64,
}

impl LedgerEntry {
    pub fn deposit(account_id: Uuid, amount: i64) -> Self {
        Self {
            id: Uuid::new_v4(),
            account_id,
            amount,
        }
    }
}
