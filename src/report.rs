//! Summary figures for the dashboard: KPIs, best-selling products and monthly revenue.

use std::fmt;

use chrono::NaiveDate;
use polars::prelude::*;

use crate::data::{
    PreparedTable, CUSTOMER_ID, DESCRIPTION, INVOICE_DATE, INVOICE_NO, LINE_REVENUE, QUANTITY,
};
use crate::error::Result;

const INVOICES: &str = "Invoices";
const CUSTOMERS: &str = "Customers";
const REVENUE: &str = "Revenue";
const TOTAL_QUANTITY: &str = "TotalQuantity";
const YEAR: &str = "Year";
const MONTH: &str = "Month";

/// Number of products in the best-seller ranking.
pub const TOP_PRODUCTS: usize = 10;

/// Headline figures of a prepared table.
#[derive(Debug, Clone, PartialEq)]
pub struct Kpis {
    pub invoices: u64,
    pub customers: u64,
    pub revenue: f64,
}

/// Total quantity sold of one product description.
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSales {
    pub description: String,
    pub quantity: i64,
}

/// Revenue of one calendar month.
#[derive(Debug, Clone, PartialEq)]
pub struct MonthlyRevenue {
    /// First day of the month.
    pub month: NaiveDate,
    pub revenue: f64,
}

impl fmt::Display for MonthlyRevenue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.month.format("%Y-%m"))
    }
}

/// Everything the presentation layer shows besides the segmentation.
#[derive(Debug, Clone)]
pub struct Summary {
    pub kpis: Kpis,
    pub top_products: Vec<ProductSales>,
    pub monthly_revenue: Vec<MonthlyRevenue>,
}

impl Summary {
    pub fn compute(table: &PreparedTable) -> Result<Self> {
        Ok(Self {
            kpis: compute_kpis(table)?,
            top_products: top_products(table, TOP_PRODUCTS)?,
            monthly_revenue: monthly_revenue(table)?,
        })
    }
}

/// Distinct invoices, distinct customers and total revenue.
pub fn compute_kpis(table: &PreparedTable) -> Result<Kpis> {
    let out = table
        .frame()
        .clone()
        .lazy()
        .select([
            col(INVOICE_NO)
                .n_unique()
                .cast(DataType::UInt64)
                .alias(INVOICES),
            col(CUSTOMER_ID)
                .n_unique()
                .cast(DataType::UInt64)
                .alias(CUSTOMERS),
            col(LINE_REVENUE).sum().alias(REVENUE),
        ])
        .collect()?;

    Ok(Kpis {
        invoices: out.column(INVOICES)?.u64()?.get(0).unwrap_or(0),
        customers: out.column(CUSTOMERS)?.u64()?.get(0).unwrap_or(0),
        revenue: out.column(REVENUE)?.f64()?.get(0).unwrap_or(0.0),
    })
}

/// The `n` descriptions with the largest total quantity, descending.
///
/// Ties keep description order. Rows without a description are not ranked.
pub fn top_products(table: &PreparedTable, n: usize) -> Result<Vec<ProductSales>> {
    let ranked = table
        .frame()
        .clone()
        .lazy()
        .filter(col(DESCRIPTION).is_not_null())
        .group_by([col(DESCRIPTION)])
        .agg([col(QUANTITY).sum().alias(TOTAL_QUANTITY)])
        .sort_by_exprs(
            [col(TOTAL_QUANTITY), col(DESCRIPTION)],
            SortMultipleOptions::default().with_order_descending_multi([true, false]),
        )
        .limit(n as IdxSize)
        .collect()?;

    let descriptions = ranked.column(DESCRIPTION)?.str()?;
    let quantities = ranked.column(TOTAL_QUANTITY)?.i64()?;

    Ok(descriptions
        .into_iter()
        .zip(quantities.into_iter())
        .filter_map(|(description, quantity)| {
            Some(ProductSales {
                description: description?.to_string(),
                quantity: quantity.unwrap_or(0),
            })
        })
        .collect())
}

/// Revenue per calendar month in chronological order. Months without invoices are absent.
pub fn monthly_revenue(table: &PreparedTable) -> Result<Vec<MonthlyRevenue>> {
    let monthly = table
        .frame()
        .clone()
        .lazy()
        .group_by([
            col(INVOICE_DATE).dt().year().cast(DataType::Int32).alias(YEAR),
            col(INVOICE_DATE).dt().month().cast(DataType::Int32).alias(MONTH),
        ])
        .agg([col(LINE_REVENUE).sum().alias(REVENUE)])
        .sort_by_exprs([col(YEAR), col(MONTH)], SortMultipleOptions::default())
        .collect()?;

    let years = monthly.column(YEAR)?.i32()?;
    let months = monthly.column(MONTH)?.i32()?;
    let revenues = monthly.column(REVENUE)?.f64()?;

    Ok(years
        .into_iter()
        .zip(months.into_iter())
        .zip(revenues.into_iter())
        .filter_map(|((year, month), revenue)| {
            let month = NaiveDate::from_ymd_opt(year?, u32::try_from(month?).ok()?, 1)?;
            Some(MonthlyRevenue {
                month,
                revenue: revenue.unwrap_or(0.0),
            })
        })
        .collect())
}

/// Format an amount in pounds with thousands separators and two decimals.
///
/// Non-finite amounts render as `£-`.
pub fn format_currency(amount: f64) -> String {
    if !amount.is_finite() {
        return "\u{a3}-".to_string();
    }
    let fixed = format!("{:.2}", amount.abs());
    let (integer, fraction) = fixed.split_once('.').unwrap_or((fixed.as_str(), "00"));
    let sign = if amount < 0.0 && fixed != "0.00" { "-" } else { "" };
    format!("\u{a3}{}{}.{}", sign, group_thousands(integer), fraction)
}

fn group_thousands(digits: &str) -> String {
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    let lead = digits.len() % 3;
    for (i, c) in digits.chars().enumerate() {
        if i != 0 && i % 3 == lead {
            grouped.push(',');
        }
        grouped.push(c);
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{prepare_transactions, LoadOptions};

    const SAMPLE: &str = "\
InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate
A1,C1,MUG,2,5.00,2021-01-01
A2,C1,JAR,1,10.00,2021-01-10
A3,C2,BOWL,0,3.00,2021-01-05
";

    fn table(text: &str) -> PreparedTable {
        prepare_transactions(text, &LoadOptions::default()).unwrap()
    }

    #[test]
    fn test_compute_kpis() {
        let kpis = compute_kpis(&table(SAMPLE)).unwrap();
        assert_eq!(kpis.invoices, 2);
        assert_eq!(kpis.customers, 1);
        assert!((kpis.revenue - 20.0).abs() < 1e-9);
        assert_eq!(format_currency(kpis.revenue), "\u{a3}20.00");
    }

    #[test]
    fn test_kpis_of_empty_table() {
        let kpis = compute_kpis(&table(
            "InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate\n",
        ))
        .unwrap();
        assert_eq!(kpis.invoices, 0);
        assert_eq!(kpis.customers, 0);
        assert_eq!(kpis.revenue, 0.0);
    }

    #[test]
    fn test_top_products_ranking_and_ties() {
        let text = "\
InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate
1,C1,PEN,5,1.0,2021-01-01
2,C1,CUP,3,1.0,2021-01-01
3,C2,PEN,4,1.0,2021-01-02
4,C2,BAG,9,1.0,2021-01-02
5,C3,ANT,3,1.0,2021-01-03
6,C3,,50,1.0,2021-01-03
";
        let top = top_products(&table(text), 10).unwrap();
        let ranked: Vec<(&str, i64)> = top
            .iter()
            .map(|p| (p.description.as_str(), p.quantity))
            .collect();
        assert_eq!(
            ranked,
            vec![("BAG", 9), ("PEN", 9), ("ANT", 3), ("CUP", 3)]
        );

        let top_two = top_products(&table(text), 2).unwrap();
        assert_eq!(top_two.len(), 2);
    }

    #[test]
    fn test_monthly_revenue_skips_empty_months() {
        let text = "\
InvoiceNo,CustomerID,Description,Quantity,UnitPrice,InvoiceDate
1,C1,PEN,1,2.0,2011-03-15
2,C1,PEN,1,3.0,2010-12-01 08:26:00
3,C2,CUP,2,1.5,2010-12-24
4,C2,CUP,1,4.0,2011-03-01
";
        let monthly = monthly_revenue(&table(text)).unwrap();
        assert_eq!(monthly.len(), 2);
        assert_eq!(monthly[0].month, NaiveDate::from_ymd_opt(2010, 12, 1).unwrap());
        assert!((monthly[0].revenue - 6.0).abs() < 1e-9);
        assert_eq!(monthly[1].to_string(), "2011-03");
        assert!((monthly[1].revenue - 6.0).abs() < 1e-9);
    }

    #[test]
    fn test_format_currency() {
        assert_eq!(format_currency(0.0), "\u{a3}0.00");
        assert_eq!(format_currency(1234.5), "\u{a3}1,234.50");
        assert_eq!(format_currency(8_911_407.904), "\u{a3}8,911,407.90");
        assert_eq!(format_currency(-999.999), "\u{a3}-1,000.00");
        assert_eq!(format_currency(123.0), "\u{a3}123.00");
        assert_eq!(format_currency(f64::INFINITY), "\u{a3}-");
        assert_eq!(format_currency(f64::NAN), "\u{a3}-");
    }
}
