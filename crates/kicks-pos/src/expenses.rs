//! # Expenses
//!
//! Cash taken out of the till. Recorded locally, uploaded right away when
//! the remote store answers, otherwise by the next sync cycle.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::info;

use kicks_core::validation::{validate_description, validate_expense_amount};
use kicks_core::{Expense, SyncEntity, User};
use kicks_db::Database;
use kicks_sync::SyncEngine;

use crate::error::PosResult;
use crate::outcome::RemoteMirror;

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExpenseOutcome {
    pub expense: Expense,
    pub remote: RemoteMirror,
}

#[derive(Clone)]
pub struct ExpenseService {
    db: Database,
    engine: Arc<SyncEngine>,
}

impl ExpenseService {
    pub fn new(engine: Arc<SyncEngine>) -> Self {
        ExpenseService {
            db: engine.database().clone(),
            engine,
        }
    }

    pub async fn record(&self, amount_cents: i64, description: &str, user: &User) -> PosResult<ExpenseOutcome> {
        validate_expense_amount(amount_cents)?;
        validate_description(description)?;

        let expense = self
            .db
            .expenses()
            .insert(Utc::now(), amount_cents, description.trim(), Some(user.id))
            .await?;
        let remote = RemoteMirror::push(&self.engine, SyncEntity::Expense, expense.id).await;
        let expense = self.db.expenses().require(expense.id).await?;

        info!(
            expense_id = expense.id,
            amount = %expense.amount(),
            user = %user.name,
            uploaded = remote.is_confirmed(),
            "Expense recorded"
        );
        Ok(ExpenseOutcome { expense, remote })
    }

    pub async fn list_between(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> PosResult<Vec<Expense>> {
        Ok(self.db.expenses().list_between(from, to).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PosError;
    use crate::test_support::{clerk, till};
    use chrono::Duration;

    #[tokio::test]
    async fn test_record_and_upload() {
        let (till, remote) = till().await;
        let user = clerk(&till).await;

        let outcome = till.expenses().record(2550, "  Shoe boxes ", &user).await.unwrap();

        assert_eq!(outcome.expense.description, "Shoe boxes");
        assert_eq!(outcome.expense.salesperson_id, Some(user.id));
        assert!(outcome.expense.synced);
        let RemoteMirror::Confirmed { remote_id } = outcome.remote else {
            panic!("expense not uploaded");
        };
        assert_eq!(remote.row(SyncEntity::Expense, remote_id).unwrap()["amount"], serde_json::json!(25.5));
    }

    #[tokio::test]
    async fn test_invalid_expense_rejected() {
        let (till, _remote) = till().await;
        let user = clerk(&till).await;

        assert!(matches!(
            till.expenses().record(0, "Tape", &user).await,
            Err(PosError::Validation(_))
        ));
        assert!(matches!(
            till.expenses().record(100, "   ", &user).await,
            Err(PosError::Validation(_))
        ));
        let now = Utc::now();
        assert!(till
            .expenses()
            .list_between(now - Duration::days(1), now + Duration::days(1))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_offline_expense_pending() {
        let (till, remote) = till().await;
        let user = clerk(&till).await;
        remote.set_offline(true);

        let outcome = till.expenses().record(1000, "Lunch", &user).await.unwrap();
        assert!(!outcome.remote.is_confirmed());
        assert!(!outcome.expense.synced);

        let now = Utc::now();
        let listed = till
            .expenses()
            .list_between(now - Duration::hours(1), now + Duration::hours(1))
            .await
            .unwrap();
        assert_eq!(listed.len(), 1);
    }
}
