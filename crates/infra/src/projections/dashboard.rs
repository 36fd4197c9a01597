//! Dashboard snapshots.
//!
//! Snapshots are recomputed from committed ledger rows whenever a pull
//! session notices its scope changed; nothing here is incrementally
//! maintained. Cancelled invoices never count as sales.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Datelike, Days, NaiveDate, NaiveTime, TimeZone, Timelike, Utc, Weekday};
use serde::Serialize;

use posledger_core::{BranchId, Money};
use posledger_events::Scope;
use posledger_invoicing::Invoice;

use crate::ledger_store::{InvoiceFilter, LedgerStore, SalesLine, StoreError};

const TOP_N: usize = 5;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WeeklySales {
    pub monday: Money,
    pub tuesday: Money,
    pub wednesday: Money,
    pub thursday: Money,
    pub friday: Money,
    pub saturday: Money,
    pub sunday: Money,
}

impl WeeklySales {
    fn slot(&mut self, day: Weekday) -> &mut Money {
        match day {
            Weekday::Mon => &mut self.monday,
            Weekday::Tue => &mut self.tuesday,
            Weekday::Wed => &mut self.wednesday,
            Weekday::Thu => &mut self.thursday,
            Weekday::Fri => &mut self.friday,
            Weekday::Sat => &mut self.saturday,
            Weekday::Sun => &mut self.sunday,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TopSellingItem {
    pub product_name: String,
    pub total_quantity: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategorySales {
    pub category_name: String,
    pub total_sales: Money,
}

/// Whole-business view for admins.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlobalSnapshot {
    pub total_sales: Money,
    pub total_collected: Money,
    pub total_branch: u64,
    pub total_user: u64,
    pub total_count_order: u64,
    pub average_order_value: Money,
    pub weekly_sales: WeeklySales,
    pub top_selling_items: Vec<TopSellingItem>,
    pub update_type: &'static str,
}

/// One branch, today compared with yesterday.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BranchSnapshot {
    pub branch_id: BranchId,
    pub today_sales: Money,
    pub today_collected: Money,
    pub sales_percent: f64,
    pub total_orders: u64,
    pub order_percent: f64,
    pub avg_orders: Money,
    pub peak_hours: Vec<String>,
    pub top_selling_items: Vec<TopSellingItem>,
    pub sales_by_category: Vec<CategorySales>,
    pub update_type: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum DashboardSnapshot {
    Global(GlobalSnapshot),
    Branch(BranchSnapshot),
}

/// Recompute the snapshot for `scope` as of `now`.
pub async fn compute_snapshot<S>(
    store: &S,
    scope: Scope,
    now: DateTime<Utc>,
) -> Result<DashboardSnapshot, StoreError>
where
    S: LedgerStore + ?Sized,
{
    match scope {
        Scope::Global => global_snapshot(store, now).await.map(DashboardSnapshot::Global),
        Scope::Branch(branch) => branch_snapshot(store, branch, now)
            .await
            .map(DashboardSnapshot::Branch),
    }
}

async fn global_snapshot<S>(store: &S, now: DateTime<Utc>) -> Result<GlobalSnapshot, StoreError>
where
    S: LedgerStore + ?Sized,
{
    let sales = InvoiceFilter::all().sales_only();
    let totals = store.invoice_totals(&sales).await?;

    let monday = week_start(now.date_naive());
    let week = store
        .list_invoices(&sales.clone().created_between(
            start_of_day(monday),
            start_of_day(monday + Days::new(7)),
        ))
        .await?;

    Ok(GlobalSnapshot {
        total_sales: totals.total_amount,
        total_collected: totals.paid_amount,
        total_branch: store.count_branches().await?,
        total_user: store.count_staff().await?,
        total_count_order: totals.count,
        average_order_value: totals.average(),
        weekly_sales: weekly_sales(&week),
        top_selling_items: top_selling(&store.sales_lines(&sales).await?),
        update_type: "initial",
    })
}

async fn branch_snapshot<S>(
    store: &S,
    branch: BranchId,
    now: DateTime<Utc>,
) -> Result<BranchSnapshot, StoreError>
where
    S: LedgerStore + ?Sized,
{
    let today = now.date_naive();
    let yesterday = today - Days::new(1);
    let on = |day: NaiveDate| {
        InvoiceFilter::all()
            .branch(Some(branch))
            .sales_only()
            .created_between(start_of_day(day), start_of_day(day + Days::new(1)))
    };

    let today_invoices = store.list_invoices(&on(today)).await?;
    let yesterday_totals = store.invoice_totals(&on(yesterday)).await?;
    let lines = store.sales_lines(&on(today)).await?;

    // Money sums saturate at the representable range.
    let today_sales: Money = today_invoices.iter().map(Invoice::total_amount).sum();
    let today_collected: Money = today_invoices.iter().map(Invoice::paid_amount).sum();
    let total_orders = today_invoices.len() as u64;
    let avg_orders = if total_orders == 0 {
        Money::ZERO
    } else {
        Money::from_minor(today_sales.minor() / total_orders as i64)
    };

    Ok(BranchSnapshot {
        branch_id: branch,
        today_sales,
        today_collected,
        sales_percent: percent_change(
            today_sales.as_decimal(),
            yesterday_totals.total_amount.as_decimal(),
        ),
        total_orders,
        order_percent: percent_change(total_orders as f64, yesterday_totals.count as f64),
        avg_orders,
        peak_hours: peak_hours(&today_invoices),
        top_selling_items: top_selling(&lines),
        sales_by_category: sales_by_category(&lines),
        update_type: "branch_update",
    })
}

pub fn start_of_day(day: NaiveDate) -> DateTime<Utc> {
    Utc.from_utc_datetime(&day.and_time(NaiveTime::MIN))
}

/// Monday of the week containing `day`.
pub fn week_start(day: NaiveDate) -> NaiveDate {
    day - Days::new(u64::from(day.weekday().num_days_from_monday()))
}

/// Relative change in percent; the plain difference when there is no baseline.
pub fn percent_change(current: f64, previous: f64) -> f64 {
    let change = if previous == 0.0 {
        current - previous
    } else {
        (current - previous) / previous * 100.0
    };
    (change * 100.0).round() / 100.0
}

pub fn weekly_sales(invoices: &[Invoice]) -> WeeklySales {
    let mut week = WeeklySales::default();
    for invoice in invoices {
        *week.slot(invoice.created_at().weekday()) += invoice.total_amount();
    }
    week
}

/// Hours ("02:00 PM") with the most invoices, in chronological order.
pub fn peak_hours(invoices: &[Invoice]) -> Vec<String> {
    let mut per_hour: BTreeMap<u32, usize> = BTreeMap::new();
    for invoice in invoices {
        *per_hour.entry(invoice.created_at().hour()).or_default() += 1;
    }
    let Some(&max) = per_hour.values().max() else {
        return Vec::new();
    };
    per_hour
        .into_iter()
        .filter(|&(_, count)| count == max)
        .filter_map(|(hour, _)| NaiveTime::from_hms_opt(hour, 0, 0))
        .map(|t| t.format("%I:%M %p").to_string())
        .collect()
}

/// Best sellers by quantity; ties broken by name.
pub fn top_selling(lines: &[SalesLine]) -> Vec<TopSellingItem> {
    let mut quantities: HashMap<&str, u64> = HashMap::new();
    for line in lines {
        *quantities.entry(line.product_name.as_str()).or_default() += u64::from(line.quantity);
    }
    let mut items: Vec<TopSellingItem> = quantities
        .into_iter()
        .map(|(name, total_quantity)| TopSellingItem {
            product_name: name.to_string(),
            total_quantity,
        })
        .collect();
    items.sort_by(|a, b| {
        b.total_quantity
            .cmp(&a.total_quantity)
            .then_with(|| a.product_name.cmp(&b.product_name))
    });
    items.truncate(TOP_N);
    items
}

pub fn sales_by_category(lines: &[SalesLine]) -> Vec<CategorySales> {
    let mut totals: HashMap<&str, Money> = HashMap::new();
    for line in lines {
        *totals.entry(line.category_name.as_str()).or_default() += line.line_total;
    }
    let mut categories: Vec<CategorySales> = totals
        .into_iter()
        .map(|(name, total_sales)| CategorySales {
            category_name: name.to_string(),
            total_sales,
        })
        .collect();
    categories.sort_by(|a, b| {
        b.total_sales
            .cmp(&a.total_sales)
            .then_with(|| a.category_name.cmp(&b.category_name))
    });
    categories.truncate(TOP_N);
    categories
}

#[cfg(test)]
mod tests {
    use super::*;
    use posledger_core::{InvoiceId, ProductId};

    fn line(name: &str, category: &str, quantity: u32, total: i64) -> SalesLine {
        SalesLine {
            invoice_id: InvoiceId::new(1),
            branch_id: BranchId::new(1),
            product_id: ProductId::new(1),
            product_name: name.into(),
            category_name: category.into(),
            quantity,
            line_total: Money::from_major(total),
            ordered_at: Utc::now(),
        }
    }

    #[test]
    fn weeks_start_on_monday() {
        // 2024-03-14 is a Thursday.
        let thursday = NaiveDate::from_ymd_opt(2024, 3, 14).unwrap();
        assert_eq!(week_start(thursday), NaiveDate::from_ymd_opt(2024, 3, 11).unwrap());
        let monday = NaiveDate::from_ymd_opt(2024, 3, 11).unwrap();
        assert_eq!(week_start(monday), monday);
    }

    #[test]
    fn percent_change_without_baseline_is_the_difference() {
        assert_eq!(percent_change(150.0, 0.0), 150.0);
        assert_eq!(percent_change(150.0, 100.0), 50.0);
        assert_eq!(percent_change(50.0, 100.0), -50.0);
    }

    #[test]
    fn top_selling_sums_quantities_and_keeps_five() {
        let lines: Vec<SalesLine> = ["a", "b", "c", "d", "e", "f"]
            .iter()
            .enumerate()
            .map(|(i, name)| line(name, "x", i as u32 + 1, 1))
            .chain(std::iter::once(line("a", "x", 10, 1)))
            .collect();
        let top = top_selling(&lines);
        assert_eq!(top.len(), 5);
        assert_eq!(top[0].product_name, "a");
        assert_eq!(top[0].total_quantity, 11);
        assert!(top.iter().all(|t| t.product_name != "b"));
    }

    #[test]
    fn categories_rank_by_revenue() {
        let lines = vec![
            line("tea", "Drinks", 1, 2),
            line("cake", "Desserts", 1, 5),
            line("coffee", "Drinks", 1, 4),
        ];
        let ranked = sales_by_category(&lines);
        assert_eq!(ranked[0].category_name, "Drinks");
        assert_eq!(ranked[0].total_sales, Money::from_major(6));
    }

    #[test]
    fn category_revenue_saturates_instead_of_overflowing() {
        let mut big = line("gold", "Premium", 1, 0);
        big.line_total = Money::from_minor(i64::MAX - 1);
        let ranked = sales_by_category(&[big.clone(), big]);
        assert_eq!(ranked[0].total_sales, Money::from_minor(i64::MAX));
    }

    #[test]
    fn empty_day_has_no_peak() {
        assert!(peak_hours(&[]).is_empty());
    }
}
