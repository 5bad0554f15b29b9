//! # Dashboard
//!
//! Period summaries for the balance screen. Reads whatever the Local Store
//! holds, so a till that has been offline shows its own sales plus
//! everything pulled before the outage.

use chrono::{DateTime, Duration, Utc};

use kicks_core::reports::DashboardSummary;
use kicks_db::Database;

use crate::error::{PosError, PosResult};

#[derive(Debug, Clone)]
pub struct DashboardService {
    db: Database,
}

impl DashboardService {
    pub fn new(db: Database) -> Self {
        DashboardService { db }
    }

    /// Summary of `[from, to)`.
    pub async fn summary(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> PosResult<DashboardSummary> {
        if to < from {
            return Err(PosError::business("period end is before its start"));
        }
        let sales = self.db.sales().list_between(from, to).await?;
        let expenses = self.db.expenses().list_between(from, to).await?;
        Ok(DashboardSummary::from_records(&sales, &expenses))
    }

    /// Summary of the last `days` days up to now.
    pub async fn last_days(&self, days: i64) -> PosResult<DashboardSummary> {
        let to = Utc::now();
        self.summary(to - Duration::days(days.max(0)), to + Duration::seconds(1)).await
    }
}
