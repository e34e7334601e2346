// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use serde::{Deserialize, Deserializer, Serialize};
use time::{Date, Weekday};

use crate::ids::*;

time::serde::format_description!(iso_date, Date, "[year]-[month]-[day]");

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProductType {
    Newspaper,
    Product,
}

impl ProductType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Newspaper => "NEWSPAPER",
            Self::Product => "PRODUCT",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "NEWSPAPER" => Some(Self::Newspaper),
            "PRODUCT" => Some(Self::Product),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Newspaper => "Periódicos",
            Self::Product => "Productos",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DetailStatus {
    #[default]
    Pending,
    Finished,
}

impl DetailStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "PENDING",
            Self::Finished => "FINISHED",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Pending => "Pendiente",
            Self::Finished => "Pagado",
        }
    }

    pub const fn toggled(self) -> Self {
        match self {
            Self::Pending => Self::Finished,
            Self::Finished => Self::Pending,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationType {
    Income,
    Expense,
}

impl OperationType {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "INCOME",
            Self::Expense => "EXPENSE",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "INCOME" | "INGRESO" => Some(Self::Income),
            "EXPENSE" | "EGRESO" => Some(Self::Expense),
            _ => None,
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Income => "Ingreso",
            Self::Expense => "Egreso",
        }
    }
}

/// Which cash drawer a count belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CashBox {
    #[default]
    Comercio,
    Ojo,
}

impl CashBox {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Comercio => "COMERCIO",
            Self::Ojo => "OJO",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().as_str() {
            "COMERCIO" => Some(Self::Comercio),
            "OJO" => Some(Self::Ojo),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Route {
    Login,
    Home,
    Sellers,
    Products,
    Newspapers,
    Assignments,
    Devolutions,
    Cash,
    Yape,
    Finances,
    Reports,
}

impl Route {
    /// Routes reachable from the tab bar once signed in.
    pub const TABS: [Self; 10] = [
        Self::Home,
        Self::Sellers,
        Self::Products,
        Self::Newspapers,
        Self::Assignments,
        Self::Devolutions,
        Self::Cash,
        Self::Yape,
        Self::Finances,
        Self::Reports,
    ];

    pub const fn label(self) -> &'static str {
        match self {
            Self::Login => "ingresar",
            Self::Home => "inicio",
            Self::Sellers => "vendedores",
            Self::Products => "productos",
            Self::Newspapers => "periódicos",
            Self::Assignments => "asignaciones",
            Self::Devolutions => "devoluciones",
            Self::Cash => "caja",
            Self::Yape => "yape",
            Self::Finances => "finanzas",
            Self::Reports => "reportes",
        }
    }

    pub const fn requires_session(self) -> bool {
        !matches!(self, Self::Login)
    }

    pub const fn has_table(self) -> bool {
        !matches!(self, Self::Login | Self::Home)
    }

    pub const fn supports_search(self) -> bool {
        matches!(self, Self::Sellers | Self::Products | Self::Newspapers)
    }

    pub const fn form(self) -> Option<FormKind> {
        match self {
            Self::Sellers => Some(FormKind::Seller),
            Self::Products => Some(FormKind::Product),
            Self::Newspapers => Some(FormKind::Newspaper),
            Self::Assignments => Some(FormKind::Assignment),
            Self::Cash => Some(FormKind::Cash),
            Self::Yape => Some(FormKind::Yape),
            Self::Finances => Some(FormKind::Finance),
            Self::Login | Self::Home | Self::Devolutions | Self::Reports => None,
        }
    }
}

/// Backend collection a row lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Resource {
    Sellers,
    Products,
    Assignments,
    DetailAssignments,
    Devolutions,
    Finance,
    Cash,
    Yape,
}

impl Resource {
    pub const fn path(self) -> &'static str {
        match self {
            Self::Sellers => "sellers/",
            Self::Products => "products/",
            Self::Assignments => "assignments/",
            Self::DetailAssignments => "detail-assignments/",
            Self::Devolutions => "devolutions/",
            Self::Finance => "finance/",
            Self::Cash => "cash/",
            Self::Yape => "yape/",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Sellers => "seller",
            Self::Products => "product",
            Self::Assignments => "assignment",
            Self::DetailAssignments => "assignment detail",
            Self::Devolutions => "devolution",
            Self::Finance => "finance entry",
            Self::Cash => "cash count",
            Self::Yape => "yape transfer",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FormKind {
    Seller,
    Product,
    Newspaper,
    Assignment,
    Cash,
    Yape,
    Finance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AppMode {
    Nav,
    Edit,
    Search,
    Form(FormKind),
}

/// One page of a paginated listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub count: u64,
    #[serde(default)]
    pub next: Option<String>,
    #[serde(default)]
    pub previous: Option<String>,
    pub results: Vec<T>,
}

impl<T> Page<T> {
    pub fn new(count: u64, results: Vec<T>) -> Self {
        Self {
            count,
            next: None,
            previous: None,
            results,
        }
    }

    pub fn map<U>(self, f: impl FnMut(T) -> U) -> Page<U> {
        Page {
            count: self.count,
            next: self.next,
            previous: self.previous,
            results: self.results.into_iter().map(f).collect(),
        }
    }
}

impl<T> Default for Page<T> {
    fn default() -> Self {
        Self::new(0, Vec::new())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seller {
    pub id: SellerId,
    #[serde(default)]
    pub number_seller: String,
    pub name: String,
    #[serde(default)]
    pub last_name: String,
    #[serde(default)]
    pub dni: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub status: bool,
}

impl Seller {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.name, self.last_name).trim().to_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(rename = "type", default)]
    pub product_type: Option<ProductType>,
    #[serde(default, deserialize_with = "count")]
    pub returns_date: i64,
    #[serde(default, deserialize_with = "amount")]
    pub monday_price: f64,
    #[serde(default, deserialize_with = "amount")]
    pub tuesday_price: f64,
    #[serde(default, deserialize_with = "amount")]
    pub wednesday_price: f64,
    #[serde(default, deserialize_with = "amount")]
    pub thursday_price: f64,
    #[serde(default, deserialize_with = "amount")]
    pub friday_price: f64,
    #[serde(default, deserialize_with = "amount")]
    pub saturday_price: f64,
    #[serde(default, deserialize_with = "amount")]
    pub sunday_price: f64,
    #[serde(default, deserialize_with = "amount")]
    pub product_price: f64,
    #[serde(default)]
    pub status_product: bool,
}

impl Product {
    pub fn is_newspaper(&self) -> bool {
        self.product_type == Some(ProductType::Newspaper)
    }

    /// Newspapers are priced per weekday; everything else has a flat price.
    pub fn price_on(&self, weekday: Weekday) -> f64 {
        if !self.is_newspaper() {
            return self.product_price;
        }
        match weekday {
            Weekday::Monday => self.monday_price,
            Weekday::Tuesday => self.tuesday_price,
            Weekday::Wednesday => self.wednesday_price,
            Weekday::Thursday => self.thursday_price,
            Weekday::Friday => self.friday_price,
            Weekday::Saturday => self.saturday_price,
            Weekday::Sunday => self.sunday_price,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetailAssignment {
    pub id: DetailAssignmentId,
    pub product: Product,
    #[serde(default, deserialize_with = "count")]
    pub quantity: i64,
    #[serde(default, deserialize_with = "count")]
    pub returned_amount: i64,
    #[serde(default, with = "iso_date::option")]
    pub return_date: Option<Date>,
    #[serde(default, deserialize_with = "amount")]
    pub unit_price: f64,
    #[serde(default)]
    pub status: DetailStatus,
}

impl DetailAssignment {
    pub fn pending(&self) -> i64 {
        (self.quantity - self.returned_amount).max(0)
    }

    pub fn amount_due(&self) -> f64 {
        self.pending() as f64 * self.unit_price
    }

    pub fn assigned_total(&self) -> f64 {
        self.quantity as f64 * self.unit_price
    }

    pub fn is_paid(&self) -> bool {
        self.status == DetailStatus::Finished
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub seller: Seller,
    #[serde(with = "iso_date")]
    pub date_assignment: Date,
    #[serde(default)]
    pub detail_assignments: Vec<DetailAssignment>,
}

impl Assignment {
    pub fn detail_for(&self, product: ProductId) -> Option<&DetailAssignment> {
        self.detail_assignments
            .iter()
            .find(|detail| detail.product.id == product)
    }

    pub fn assigned_total(&self) -> f64 {
        self.detail_assignments
            .iter()
            .map(DetailAssignment::assigned_total)
            .sum()
    }

    /// Outstanding debt across every detail; a detail never contributes a credit.
    pub fn debt(&self) -> f64 {
        self.detail_assignments
            .iter()
            .map(|detail| {
                let debt = (detail.quantity - detail.returned_amount) as f64 * detail.unit_price;
                debt.max(0.0)
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Devolution {
    pub id_devolution: DevolutionId,
    pub detail_assignment: DetailAssignmentId,
    #[serde(with = "iso_date")]
    pub devolution_date: Date,
    #[serde(deserialize_with = "count")]
    pub quantity: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finance {
    pub id: FinanceId,
    #[serde(default, with = "iso_date::option")]
    pub date_finance: Option<Date>,
    #[serde(default, deserialize_with = "text")]
    pub description: String,
    pub type_operation: OperationType,
    #[serde(deserialize_with = "amount")]
    pub amount: f64,
}

/// Income and expense totals for one calendar month.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinanceSummary {
    #[serde(deserialize_with = "count")]
    pub year: i64,
    #[serde(deserialize_with = "count")]
    pub month: i64,
    #[serde(default, deserialize_with = "amount")]
    pub income_month: f64,
    #[serde(default, deserialize_with = "amount")]
    pub expense_month: f64,
    #[serde(default, deserialize_with = "amount")]
    pub balance_month: f64,
    #[serde(default)]
    pub transactions_count: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Denomination {
    pub field: &'static str,
    pub label: &'static str,
    pub cents: i64,
}

pub const DENOMINATIONS: [Denomination; 11] = [
    Denomination { field: "two_hundred", label: "S/ 200", cents: 20_000 },
    Denomination { field: "one_hundred", label: "S/ 100", cents: 10_000 },
    Denomination { field: "fifty", label: "S/ 50", cents: 5_000 },
    Denomination { field: "twenty", label: "S/ 20", cents: 2_000 },
    Denomination { field: "ten", label: "S/ 10", cents: 1_000 },
    Denomination { field: "five", label: "S/ 5", cents: 500 },
    Denomination { field: "two", label: "S/ 2", cents: 200 },
    Denomination { field: "one", label: "S/ 1", cents: 100 },
    Denomination { field: "fifty_cents", label: "S/ 0.50", cents: 50 },
    Denomination { field: "twenty_cents", label: "S/ 0.20", cents: 20 },
    Denomination { field: "ten_cents", label: "S/ 0.10", cents: 10 },
];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Cash {
    pub id: CashId,
    #[serde(with = "iso_date")]
    pub date_cash: Date,
    #[serde(default)]
    pub type_product: CashBox,
    #[serde(default, deserialize_with = "count")]
    pub two_hundred: i64,
    #[serde(default, deserialize_with = "count")]
    pub one_hundred: i64,
    #[serde(default, deserialize_with = "count")]
    pub fifty: i64,
    #[serde(default, deserialize_with = "count")]
    pub twenty: i64,
    #[serde(default, deserialize_with = "count")]
    pub ten: i64,
    #[serde(default, deserialize_with = "count")]
    pub five: i64,
    #[serde(default, deserialize_with = "count")]
    pub two: i64,
    #[serde(default, deserialize_with = "count")]
    pub one: i64,
    #[serde(default, deserialize_with = "count")]
    pub fifty_cents: i64,
    #[serde(default, deserialize_with = "count")]
    pub twenty_cents: i64,
    #[serde(default, deserialize_with = "count")]
    pub ten_cents: i64,
    #[serde(default, alias = "amount", deserialize_with = "amount")]
    pub total: f64,
}

impl Cash {
    pub fn counts(&self) -> [i64; 11] {
        [
            self.two_hundred,
            self.one_hundred,
            self.fifty,
            self.twenty,
            self.ten,
            self.five,
            self.two,
            self.one,
            self.fifty_cents,
            self.twenty_cents,
            self.ten_cents,
        ]
    }

    pub fn counted_cents(&self) -> i64 {
        DENOMINATIONS
            .iter()
            .zip(self.counts())
            .map(|(denomination, count)| denomination.cents * count)
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Yape {
    pub id: YapeId,
    pub name: String,
    #[serde(deserialize_with = "amount")]
    pub amount: f64,
    #[serde(default, with = "iso_date::option")]
    pub date_yape: Option<Date>,
    #[serde(default)]
    pub operation_code: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReportKind {
    SalesBySeller,
    MonthlyEarnings,
    TopProducts,
    TopNewspapers,
    Profits,
    ReturnsAndEfficiency,
}

impl ReportKind {
    pub const ALL: [Self; 6] = [
        Self::SalesBySeller,
        Self::MonthlyEarnings,
        Self::TopProducts,
        Self::TopNewspapers,
        Self::Profits,
        Self::ReturnsAndEfficiency,
    ];

    pub const fn path(self) -> &'static str {
        match self {
            Self::SalesBySeller => "reports/sales-by-seller/",
            Self::MonthlyEarnings => "reports/monthly-earnings/",
            Self::TopProducts => "reports/top-products/",
            Self::TopNewspapers => "reports/top-newspapers/",
            Self::Profits => "reports/profits/",
            Self::ReturnsAndEfficiency => "reports/returns-and-efficiency/",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::SalesBySeller => "Ventas por vendedor",
            Self::MonthlyEarnings => "Ganancias mensuales",
            Self::TopProducts => "Productos más vendidos",
            Self::TopNewspapers => "Periódicos más vendidos",
            Self::Profits => "Utilidades",
            Self::ReturnsAndEfficiency => "Devoluciones y eficiencia",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerSales {
    #[serde(alias = "assignment__seller__name", default, deserialize_with = "text")]
    pub seller_name: String,
    #[serde(default, deserialize_with = "amount")]
    pub total_sold: f64,
    #[serde(default, deserialize_with = "amount")]
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthlyEarnings {
    #[serde(default, deserialize_with = "text")]
    pub month: String,
    #[serde(default, deserialize_with = "amount")]
    pub total_earnings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProductSales {
    #[serde(alias = "product__name", default, deserialize_with = "text")]
    pub product_name: String,
    #[serde(default, deserialize_with = "amount")]
    pub total_sold: f64,
    #[serde(default, deserialize_with = "amount")]
    pub total_amount: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SellerProfit {
    #[serde(alias = "assignment__seller__name", default, deserialize_with = "text")]
    pub seller_name: String,
    #[serde(default, deserialize_with = "amount")]
    pub total_profit: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReturnsEfficiency {
    #[serde(alias = "assignment__seller__name", default, deserialize_with = "text")]
    pub seller_name: String,
    #[serde(default, deserialize_with = "amount")]
    pub total_sold: f64,
    #[serde(default, deserialize_with = "amount")]
    pub total_returned: f64,
    #[serde(default, deserialize_with = "amount")]
    pub return_percentage: f64,
    #[serde(default, deserialize_with = "amount")]
    pub impact_on_sales: f64,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Numeric {
    Number(f64),
    Text(String),
}

// Decimal fields arrive as JSON strings ("12.500"); nulls count as zero.
fn amount<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    match Option::<Numeric>::deserialize(deserializer)? {
        None => Ok(0.0),
        Some(Numeric::Number(value)) => Ok(value),
        Some(Numeric::Text(raw)) if raw.trim().is_empty() => Ok(0.0),
        Some(Numeric::Text(raw)) => raw
            .trim()
            .parse::<f64>()
            .map_err(|_| serde::de::Error::custom(format!("invalid decimal {raw:?}"))),
    }
}

fn count<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    amount(deserializer).map(|value| value.round() as i64)
}

fn text<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<String>::deserialize(deserializer)?.unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::{Assignment, Cash, DetailStatus, Page, Product, ProductType, Route};
    use serde_json::json;
    use time::Weekday;

    fn newspaper() -> serde_json::Value {
        json!({
            "id": 3,
            "name": "El Comercio",
            "type": "NEWSPAPER",
            "returns_date": 2,
            "monday_price": "1.00",
            "tuesday_price": "1.00",
            "wednesday_price": "1.00",
            "thursday_price": "1.00",
            "friday_price": "1.20",
            "saturday_price": "1.50",
            "sunday_price": "3.50",
            "product_price": null,
            "status_product": true
        })
    }

    #[test]
    fn decimal_strings_and_nulls_decode_as_numbers() {
        let product: Product = serde_json::from_value(newspaper()).expect("decode product");
        assert_eq!(product.product_type, Some(ProductType::Newspaper));
        assert_eq!(product.sunday_price, 3.5);
        assert_eq!(product.product_price, 0.0);
        assert_eq!(product.price_on(Weekday::Sunday), 3.5);
        assert_eq!(product.price_on(Weekday::Friday), 1.2);
    }

    #[test]
    fn debt_ignores_over_returned_details() {
        let assignment: Assignment = serde_json::from_value(json!({
            "id": 1,
            "seller": {
                "id": 7, "name": "Ana", "last_name": "Quispe", "dni": "12345678", "status": true
            },
            "date_assignment": "2025-02-03",
            "detail_assignments": [
                {
                    "id": 10, "product": newspaper(), "quantity": 10, "returned_amount": 4,
                    "unit_price": "1.50", "status": "PENDING"
                },
                {
                    "id": 11, "product": newspaper(), "quantity": 2, "returned_amount": 5,
                    "unit_price": "2.00", "status": "FINISHED"
                }
            ]
        }))
        .expect("decode assignment");

        assert_eq!(assignment.debt(), 9.0);
        assert_eq!(assignment.detail_assignments[1].pending(), 0);
        assert_eq!(assignment.detail_assignments[1].status, DetailStatus::Finished);
        assert_eq!(assignment.seller.full_name(), "Ana Quispe");
    }

    #[test]
    fn cash_totals_count_in_cents() {
        let cash: Cash = serde_json::from_value(json!({
            "id": 1,
            "date_cash": "2025-02-03",
            "type_product": "OJO",
            "two_hundred": 1,
            "ten_cents": 3,
            "fifty_cents": null,
            "total": "200.300"
        }))
        .expect("decode cash");
        assert_eq!(cash.counted_cents(), 20_030);
        assert_eq!(cash.total, 200.3);
    }

    #[test]
    fn page_decodes_paginated_envelope() {
        let page: Page<serde_json::Value> = serde_json::from_value(json!({
            "count": 47,
            "next": "http://host/api/v1/sellers/?page=2",
            "previous": null,
            "results": [{"id": 1}]
        }))
        .expect("decode page");
        assert_eq!(page.count, 47);
        assert_eq!(page.results.len(), 1);
    }

    #[test]
    fn only_login_is_public() {
        assert!(!Route::Login.requires_session());
        assert!(Route::TABS.iter().all(|route| route.requires_session()));
    }
}
