//! # Dashboard Aggregates
//!
//! Balance figures for the admin dashboard, computed from whatever sales and
//! expenses the caller loaded for the period.
//!
//! Refunded sales stay in the record set for audit but never count towards
//! revenue, no matter how many times sync has pushed or pulled them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::money::Money;
use crate::types::{Expense, PaymentMethod, Sale};

/// Revenue collected through one payment method.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct MethodTotal {
    pub method: PaymentMethod,
    pub sales: usize,
    pub revenue_cents: i64,
}

/// Revenue attributed to one salesperson.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct SalespersonTotal {
    pub salesperson_name: String,
    pub sales: usize,
    pub units: i64,
    pub revenue_cents: i64,
}

/// Everything the balance screen shows for a period.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, TS)]
#[ts(export)]
pub struct DashboardSummary {
    /// Non-refunded sales.
    pub sales_count: usize,
    pub refunded_count: usize,
    pub gross_revenue_cents: i64,
    /// Value of refunded sales (informational only).
    pub refunded_cents: i64,
    pub shipping_cents: i64,
    pub expenses_cents: i64,
    /// Revenue minus expenses.
    pub net_cents: i64,
    pub units_sold: i64,
    pub by_method: Vec<MethodTotal>,
    pub by_salesperson: Vec<SalespersonTotal>,
}

impl DashboardSummary {
    pub fn from_records(sales: &[Sale], expenses: &[Expense]) -> Self {
        let mut summary = DashboardSummary::default();
        let mut by_method: BTreeMap<PaymentMethod, MethodTotal> = BTreeMap::new();
        let mut by_person: BTreeMap<String, SalespersonTotal> = BTreeMap::new();

        for sale in sales {
            if sale.refunded {
                summary.refunded_count += 1;
                summary.refunded_cents += sale.total_cents;
                continue;
            }

            let revenue = sale.revenue().cents();
            summary.sales_count += 1;
            summary.gross_revenue_cents += revenue;
            summary.shipping_cents += sale.shipping_cost_cents;
            summary.units_sold += sale.units();

            let m = by_method
                .entry(sale.payment_method)
                .or_insert_with(|| MethodTotal {
                    method: sale.payment_method,
                    sales: 0,
                    revenue_cents: 0,
                });
            m.sales += 1;
            m.revenue_cents += revenue;

            let p = by_person
                .entry(sale.salesperson_name.clone())
                .or_insert_with(|| SalespersonTotal {
                    salesperson_name: sale.salesperson_name.clone(),
                    sales: 0,
                    units: 0,
                    revenue_cents: 0,
                });
            p.sales += 1;
            p.units += sale.units();
            p.revenue_cents += revenue;
        }

        let expenses: Money = expenses.iter().map(Expense::amount).sum();
        summary.expenses_cents = expenses.cents();
        summary.net_cents = summary.gross_revenue_cents - summary.expenses_cents;
        summary.by_method = by_method.into_values().collect();

        let mut people: Vec<_> = by_person.into_values().collect();
        people.sort_by(|a, b| b.revenue_cents.cmp(&a.revenue_cents));
        summary.by_salesperson = people;

        summary
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SaleItem;
    use chrono::Utc;

    fn sale(id: i64, total: i64, method: PaymentMethod, who: &str, refunded: bool) -> Sale {
        Sale {
            id,
            timestamp: Utc::now(),
            items: vec![SaleItem {
                product_id: 1,
                name: "Chuck 70".to_string(),
                brand: None,
                category: None,
                size: None,
                price_cents: total,
                quantity: 1,
            }],
            total_cents: total,
            shipping_cost_cents: 0,
            salesperson_id: None,
            salesperson_name: who.to_string(),
            payment_method: method,
            location: None,
            layaway_id: None,
            refunded,
            synced: true,
        }
    }

    fn expense(amount: i64) -> Expense {
        Expense {
            id: 1,
            timestamp: Utc::now(),
            amount_cents: amount,
            description: "Shoe bags".to_string(),
            salesperson_id: None,
            synced: true,
        }
    }

    #[test]
    fn test_refunded_sales_excluded_from_revenue() {
        let sales = vec![
            sale(1, 10000, PaymentMethod::Cash, "Ana", false),
            sale(2, 5000, PaymentMethod::Card, "Ana", true),
            sale(3, 2500, PaymentMethod::Qr, "Luis", false),
        ];
        let summary = DashboardSummary::from_records(&sales, &[expense(1500)]);

        assert_eq!(summary.sales_count, 2);
        assert_eq!(summary.refunded_count, 1);
        assert_eq!(summary.gross_revenue_cents, 12500);
        assert_eq!(summary.refunded_cents, 5000);
        assert_eq!(summary.expenses_cents, 1500);
        assert_eq!(summary.net_cents, 11000);
        assert_eq!(summary.units_sold, 2);
        assert!(summary.by_method.iter().all(|m| m.method != PaymentMethod::Card));
    }

    #[test]
    fn test_refund_excluded_even_when_duplicated() {
        // The same refunded sale loaded twice (pulled and pushed) is still zero.
        let refunded = sale(9, 8000, PaymentMethod::Cash, "Ana", true);
        let summary = DashboardSummary::from_records(&[refunded.clone(), refunded], &[]);
        assert_eq!(summary.gross_revenue_cents, 0);
    }

    #[test]
    fn test_salesperson_ranking() {
        let sales = vec![
            sale(1, 1000, PaymentMethod::Cash, "Ana", false),
            sale(2, 3000, PaymentMethod::Cash, "Luis", false),
            sale(3, 1500, PaymentMethod::Card, "Ana", false),
        ];
        let summary = DashboardSummary::from_records(&sales, &[]);
        assert_eq!(summary.by_salesperson[0].salesperson_name, "Luis");
        assert_eq!(summary.by_salesperson[1].revenue_cents, 2500);

        let cash = summary
            .by_method
            .iter()
            .find(|m| m.method == PaymentMethod::Cash)
            .unwrap();
        assert_eq!(cash.sales, 2);
        assert_eq!(cash.revenue_cents, 4000);
    }
}
