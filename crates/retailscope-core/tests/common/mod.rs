#![allow(dead_code)]

use chrono::{NaiveDate, NaiveDateTime};
use retailscope_core::types::{Dataset, TransactionRow};

pub const SAMPLE_CSV: &str = "\
Order Date,Ship Date,Category,Sub-Category,Product Name,Sales,Discount,Profit,Quantity
2023-01-01,2023-01-02,Technology,Phones,iPhone 14,999.99,0.1,199.99,1
2023-01-02,2023-01-03,Furniture,Chairs,Office Chair,299.99,0.0,59.99,1
2023-01-03,2023-01-04,Office Supplies,Binders,Binder Clips,15.99,0.05,3.19,5
";

pub fn date(text: &str) -> NaiveDate {
    NaiveDate::parse_from_str(text, "%Y-%m-%d").unwrap()
}

pub fn midnight(text: &str) -> NaiveDateTime {
    date(text).and_hms_opt(0, 0, 0).unwrap()
}

pub struct RowBuilder {
    row: TransactionRow,
}

impl RowBuilder {
    pub fn new(order_date: &str, category: &str) -> Self {
        Self {
            row: TransactionRow {
                order_date: midnight(order_date),
                ship_date: midnight(order_date),
                category: category.to_string(),
                sub_category: "General".to_string(),
                product_name: format!("{category} item"),
                sales: 100.0,
                discount: 0.0,
                profit: 10.0,
                quantity: 1,
            },
        }
    }

    pub fn product(mut self, name: &str) -> Self {
        self.row.product_name = name.to_string();
        self
    }

    pub fn sales(mut self, sales: f64) -> Self {
        self.row.sales = sales;
        self
    }

    pub fn discount(mut self, discount: f64) -> Self {
        self.row.discount = discount;
        self
    }

    pub fn profit(mut self, profit: f64) -> Self {
        self.row.profit = profit;
        self
    }

    pub fn build(self) -> TransactionRow {
        self.row
    }
}

pub fn dataset(rows: Vec<TransactionRow>) -> Dataset {
    Dataset::from_rows(rows).unwrap()
}

/// Thirty days across three categories with varied sales, discounts and profits.
pub fn month_of_orders() -> Dataset {
    let categories = ["Furniture", "Office Supplies", "Technology"];
    let start = date("2023-03-01");
    let rows = (0..90)
        .map(|i| {
            let day = start + chrono::Duration::days(i / 3);
            let category = categories[(i % 3) as usize];
            TransactionRow {
                order_date: day.and_hms_opt(9 + (i % 5) as u32, 0, 0).unwrap(),
                ship_date: (day + chrono::Duration::days(2)).and_hms_opt(0, 0, 0).unwrap(),
                category: category.to_string(),
                sub_category: format!("{category} sub"),
                product_name: format!("Product {:02}", i % 25),
                sales: 50.0 + (i * 7 % 31) as f64,
                discount: [0.0, 0.1, 0.2, 0.3][(i % 4) as usize],
                profit: 12.0 - (i * 5 % 17) as f64,
                quantity: 1 + i % 4,
            }
        })
        .collect();
    dataset(rows)
}
