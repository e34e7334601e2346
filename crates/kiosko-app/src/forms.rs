// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Result, anyhow, bail};
use serde_json::{Map, Value, json};
use time::Date;

use crate::edit::{format_iso_date, parse_iso_date};
use crate::{CashBox, DENOMINATIONS, FormKind, OperationType, ProductId, ProductType, Resource};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginInput {
    pub username: String,
    pub password: String,
}

impl LoginInput {
    pub fn validate(&self) -> Result<()> {
        if self.username.trim().is_empty() {
            bail!("username is required -- enter your user and retry");
        }
        if self.password.is_empty() {
            bail!("password is required -- enter your password and retry");
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SellerFormInput {
    pub name: String,
    pub last_name: String,
    pub dni: String,
    pub phone: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProductFormInput {
    pub name: String,
    pub product_type: ProductType,
    /// Flat price for products; ignored for newspapers.
    pub price: f64,
    /// Monday through Sunday; only used for newspapers.
    pub weekday_prices: [f64; 7],
    pub returns_date: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssignmentFormInput {
    pub products: Vec<ProductId>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashFormInput {
    pub date_cash: Date,
    pub cash_box: CashBox,
    pub counts: [i64; 11],
}

#[derive(Debug, Clone, PartialEq)]
pub struct YapeFormInput {
    pub name: String,
    pub amount: f64,
    pub date_yape: Option<Date>,
    pub operation_code: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FinanceFormInput {
    pub type_operation: OperationType,
    pub description: String,
    pub amount: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormPayload {
    Seller(SellerFormInput),
    Product(ProductFormInput),
    Assignment(AssignmentFormInput),
    Cash(CashFormInput),
    Yape(YapeFormInput),
    Finance(FinanceFormInput),
}

/// One input line of a create form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldSpec {
    pub label: &'static str,
    pub hint: &'static str,
}

const fn field(label: &'static str, hint: &'static str) -> FieldSpec {
    FieldSpec { label, hint }
}

const SELLER_FIELDS: &[FieldSpec] = &[
    field("Nombre", ""),
    field("Apellido", ""),
    field("DNI", "8 dígitos"),
    field("Teléfono", "hasta 9 dígitos"),
];

const PRODUCT_FIELDS: &[FieldSpec] = &[
    field("Nombre", ""),
    field("Precio", "S/"),
    field("Días de devolución", "0"),
];

const NEWSPAPER_FIELDS: &[FieldSpec] = &[
    field("Nombre", ""),
    field("Lunes", "S/"),
    field("Martes", "S/"),
    field("Miércoles", "S/"),
    field("Jueves", "S/"),
    field("Viernes", "S/"),
    field("Sábado", "S/"),
    field("Domingo", "S/"),
    field("Días de devolución", "0"),
];

const ASSIGNMENT_FIELDS: &[FieldSpec] = &[field("Productos", "ids separados por coma")];

const CASH_FIELDS: &[FieldSpec] = &[
    field("Fecha", "AAAA-MM-DD"),
    field("Caja", "COMERCIO u OJO"),
    field("S/ 200", "0"),
    field("S/ 100", "0"),
    field("S/ 50", "0"),
    field("S/ 20", "0"),
    field("S/ 10", "0"),
    field("S/ 5", "0"),
    field("S/ 2", "0"),
    field("S/ 1", "0"),
    field("S/ 0.50", "0"),
    field("S/ 0.20", "0"),
    field("S/ 0.10", "0"),
];

const YAPE_FIELDS: &[FieldSpec] = &[
    field("Nombre", ""),
    field("Monto", "S/"),
    field("Fecha", "AAAA-MM-DD"),
    field("Operación", "3 caracteres"),
];

const FINANCE_FIELDS: &[FieldSpec] = &[
    field("Tipo", "INGRESO o EGRESO"),
    field("Descripción", ""),
    field("Monto", "S/"),
];

impl FormKind {
    pub const fn title(self) -> &'static str {
        match self {
            Self::Seller => "Nuevo vendedor",
            Self::Product => "Nuevo producto",
            Self::Newspaper => "Nuevo periódico",
            Self::Assignment => "Nueva asignación",
            Self::Cash => "Nuevo arqueo de caja",
            Self::Yape => "Nuevo yape",
            Self::Finance => "Nuevo movimiento",
        }
    }

    pub const fn fields(self) -> &'static [FieldSpec] {
        match self {
            Self::Seller => SELLER_FIELDS,
            Self::Product => PRODUCT_FIELDS,
            Self::Newspaper => NEWSPAPER_FIELDS,
            Self::Assignment => ASSIGNMENT_FIELDS,
            Self::Cash => CASH_FIELDS,
            Self::Yape => YAPE_FIELDS,
            Self::Finance => FINANCE_FIELDS,
        }
    }
}

impl FormPayload {
    pub fn kind(&self) -> FormKind {
        match self {
            Self::Seller(_) => FormKind::Seller,
            Self::Product(product) if product.product_type == ProductType::Newspaper => {
                FormKind::Newspaper
            }
            Self::Product(_) => FormKind::Product,
            Self::Assignment(_) => FormKind::Assignment,
            Self::Cash(_) => FormKind::Cash,
            Self::Yape(_) => FormKind::Yape,
            Self::Finance(_) => FormKind::Finance,
        }
    }

    pub fn resource(&self) -> Resource {
        match self {
            Self::Seller(_) => Resource::Sellers,
            Self::Product(_) => Resource::Products,
            Self::Assignment(_) => Resource::Assignments,
            Self::Cash(_) => Resource::Cash,
            Self::Yape(_) => Resource::Yape,
            Self::Finance(_) => Resource::Finance,
        }
    }

    /// Builds a payload from the raw lines of a create form, in
    /// [`FormKind::fields`] order.
    pub fn from_fields(kind: FormKind, values: &[String]) -> Result<Self> {
        let expected = kind.fields().len();
        if values.len() != expected {
            bail!("form expects {expected} fields, got {}", values.len());
        }
        let value = |index: usize| values[index].trim();
        let payload = match kind {
            FormKind::Seller => Self::Seller(SellerFormInput {
                name: value(0).to_owned(),
                last_name: value(1).to_owned(),
                dni: value(2).to_owned(),
                phone: value(3).to_owned(),
            }),
            FormKind::Product => Self::Product(ProductFormInput {
                name: value(0).to_owned(),
                product_type: ProductType::Product,
                price: parse_amount("price", value(1))?,
                weekday_prices: [0.0; 7],
                returns_date: parse_count("return days", value(2))?,
            }),
            FormKind::Newspaper => {
                let mut weekday_prices = [0.0; 7];
                for (day, price) in weekday_prices.iter_mut().enumerate() {
                    *price = parse_amount(NEWSPAPER_FIELDS[day + 1].label, value(day + 1))?;
                }
                Self::Product(ProductFormInput {
                    name: value(0).to_owned(),
                    product_type: ProductType::Newspaper,
                    price: 0.0,
                    weekday_prices,
                    returns_date: parse_count("return days", value(8))?,
                })
            }
            FormKind::Assignment => Self::Assignment(AssignmentFormInput {
                products: value(0)
                    .split(',')
                    .map(str::trim)
                    .filter(|raw| !raw.is_empty())
                    .map(|raw| {
                        raw.parse::<i64>()
                            .map(ProductId::new)
                            .map_err(|_| anyhow!("product id {raw:?} is not a number"))
                    })
                    .collect::<Result<_>>()?,
            }),
            FormKind::Cash => {
                let date_cash = parse_iso_date(value(0)).ok_or_else(|| {
                    anyhow!("cash date must be YYYY-MM-DD -- fix the date and retry")
                })?;
                let cash_box = CashBox::parse(value(1))
                    .ok_or_else(|| anyhow!("cash box must be COMERCIO or OJO"))?;
                let mut counts = [0; 11];
                for (index, count) in counts.iter_mut().enumerate() {
                    *count = parse_count(DENOMINATIONS[index].label, value(index + 2))?;
                }
                Self::Cash(CashFormInput {
                    date_cash,
                    cash_box,
                    counts,
                })
            }
            FormKind::Yape => Self::Yape(YapeFormInput {
                name: value(0).to_owned(),
                amount: parse_amount("amount", value(1))?,
                date_yape: match value(2) {
                    "" => None,
                    raw => Some(parse_iso_date(raw).ok_or_else(|| {
                        anyhow!("yape date must be YYYY-MM-DD -- fix the date and retry")
                    })?),
                },
                operation_code: value(3).to_owned(),
            }),
            FormKind::Finance => Self::Finance(FinanceFormInput {
                type_operation: OperationType::parse(value(0))
                    .ok_or_else(|| anyhow!("operation type must be INGRESO or EGRESO"))?,
                description: value(1).to_owned(),
                amount: parse_amount("amount", value(2))?,
            }),
        };
        payload.validate()?;
        Ok(payload)
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            Self::Seller(seller) => seller.validate(),
            Self::Product(product) => product.validate(),
            Self::Assignment(assignment) => assignment.validate(),
            Self::Cash(cash) => cash.validate(),
            Self::Yape(yape) => yape.validate(),
            Self::Finance(finance) => finance.validate(),
        }
    }

    /// Request body for the create endpoint.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Seller(seller) => json!({
                "name": seller.name,
                "last_name": seller.last_name,
                "dni": seller.dni,
                "phone": seller.phone,
                "status": true,
            }),
            Self::Product(product) => {
                let mut body = Map::new();
                body.insert("name".to_owned(), json!(product.name));
                body.insert("type".to_owned(), json!(product.product_type.as_str()));
                body.insert("returns_date".to_owned(), json!(product.returns_date));
                body.insert("status_product".to_owned(), json!(true));
                match product.product_type {
                    ProductType::Newspaper => {
                        for (field, price) in WEEKDAY_FIELDS.iter().zip(product.weekday_prices) {
                            body.insert((*field).to_owned(), json!(price));
                        }
                    }
                    ProductType::Product => {
                        body.insert("product_price".to_owned(), json!(product.price));
                    }
                }
                Value::Object(body)
            }
            Self::Assignment(assignment) => json!({
                "products": assignment.products.iter().map(|id| id.get()).collect::<Vec<_>>(),
            }),
            Self::Cash(cash) => {
                let mut body = Map::new();
                body.insert("date_cash".to_owned(), json!(format_iso_date(cash.date_cash)));
                body.insert("type_product".to_owned(), json!(cash.cash_box.as_str()));
                for (denomination, count) in DENOMINATIONS.iter().zip(cash.counts) {
                    body.insert(denomination.field.to_owned(), json!(count));
                }
                body.insert("total".to_owned(), json!(cash.total()));
                Value::Object(body)
            }
            Self::Yape(yape) => {
                let operation_code =
                    (!yape.operation_code.is_empty()).then(|| yape.operation_code.clone());
                json!({
                    "name": yape.name,
                    "amount": yape.amount,
                    "date_yape": yape.date_yape.map(format_iso_date),
                    "operation_code": operation_code,
                })
            }
            Self::Finance(finance) => json!({
                "type_operation": finance.type_operation.as_str(),
                "description": finance.description,
                "amount": finance.amount,
            }),
        }
    }
}

const WEEKDAY_FIELDS: [&str; 7] = [
    "monday_price",
    "tuesday_price",
    "wednesday_price",
    "thursday_price",
    "friday_price",
    "saturday_price",
    "sunday_price",
];

impl SellerFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("seller name is required -- enter a name and retry");
        }
        if self.last_name.trim().is_empty() {
            bail!("seller last name is required -- enter a last name and retry");
        }
        if self.dni.len() != 8 || !self.dni.chars().all(|ch| ch.is_ascii_digit()) {
            bail!("seller DNI must be exactly 8 digits");
        }
        if self.phone.len() > 9 || !self.phone.chars().all(|ch| ch.is_ascii_digit()) {
            bail!("seller phone must be up to 9 digits");
        }
        Ok(())
    }
}

impl ProductFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("product name is required -- enter a name and retry");
        }
        if self.returns_date < 0 {
            bail!("return days cannot be negative");
        }
        match self.product_type {
            ProductType::Newspaper => {
                if self.weekday_prices.iter().any(|price| *price < 0.0) {
                    bail!("newspaper prices cannot be negative");
                }
            }
            ProductType::Product => {
                if self.price <= 0.0 {
                    bail!("product price must be positive");
                }
            }
        }
        Ok(())
    }
}

impl AssignmentFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.products.is_empty() {
            bail!("choose at least one product -- enter product ids and retry");
        }
        if self.products.iter().any(|id| id.get() <= 0) {
            bail!("product ids must be positive");
        }
        Ok(())
    }
}

impl CashFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.counts.iter().any(|count| *count < 0) {
            bail!("denomination counts cannot be negative");
        }
        Ok(())
    }

    pub fn total_cents(&self) -> i64 {
        DENOMINATIONS
            .iter()
            .zip(self.counts)
            .map(|(denomination, count)| denomination.cents * count)
            .sum()
    }

    pub fn total(&self) -> f64 {
        self.total_cents() as f64 / 100.0
    }
}

impl YapeFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            bail!("yape sender name is required -- enter a name and retry");
        }
        if self.amount <= 0.0 {
            bail!("yape amount must be positive");
        }
        if self.operation_code.chars().count() > 3 {
            bail!("operation code is at most 3 characters");
        }
        Ok(())
    }
}

impl FinanceFormInput {
    pub fn validate(&self) -> Result<()> {
        if self.amount <= 0.0 {
            bail!("finance amount must be positive");
        }
        Ok(())
    }
}

fn parse_amount(label: &str, raw: &str) -> Result<f64> {
    if raw.is_empty() {
        return Ok(0.0);
    }
    let value = raw
        .parse::<f64>()
        .map_err(|_| anyhow!("{label} must be a number, got {raw:?}"))?;
    if !value.is_finite() {
        bail!("{label} must be a finite number");
    }
    Ok(value)
}

fn parse_count(label: &str, raw: &str) -> Result<i64> {
    if raw.is_empty() {
        return Ok(0);
    }
    raw.parse::<i64>()
        .map_err(|_| anyhow!("{label} must be a whole number, got {raw:?}"))
}

#[cfg(test)]
mod tests {
    use super::{FormPayload, LoginInput, SellerFormInput};
    use crate::{FormKind, ProductId};
    use serde_json::json;

    fn lines(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn every_form_has_fields() {
        for kind in [
            FormKind::Seller,
            FormKind::Product,
            FormKind::Newspaper,
            FormKind::Assignment,
            FormKind::Cash,
            FormKind::Yape,
            FormKind::Finance,
        ] {
            assert!(!kind.fields().is_empty(), "{kind:?} has no fields");
        }
        assert_eq!(FormKind::Cash.fields().len(), 13);
    }

    #[test]
    fn seller_requires_eight_digit_dni() {
        let seller = SellerFormInput {
            name: "Ana".to_owned(),
            last_name: "Quispe".to_owned(),
            dni: "1234567".to_owned(),
            phone: String::new(),
        };
        let error = FormPayload::Seller(seller).validate().expect_err("short dni");
        assert!(error.to_string().contains("8 digits"));
    }

    #[test]
    fn seller_form_builds_active_seller_body() -> anyhow::Result<()> {
        let payload = FormPayload::from_fields(
            FormKind::Seller,
            &lines(&["Ana", "Quispe", "12345678", "987654321"]),
        )?;
        assert_eq!(
            payload.to_json(),
            json!({
                "name": "Ana",
                "last_name": "Quispe",
                "dni": "12345678",
                "phone": "987654321",
                "status": true,
            })
        );
        Ok(())
    }

    #[test]
    fn newspaper_form_sends_weekday_prices() -> anyhow::Result<()> {
        let payload = FormPayload::from_fields(
            FormKind::Newspaper,
            &lines(&["Ojo", "1", "1", "1", "1", "1.2", "1.5", "3.5", "2"]),
        )?;
        assert_eq!(payload.kind(), FormKind::Newspaper);
        let body = payload.to_json();
        assert_eq!(body["type"], "NEWSPAPER");
        assert_eq!(body["sunday_price"], json!(3.5));
        assert!(body.get("product_price").is_none());
        Ok(())
    }

    #[test]
    fn assignment_form_needs_products() -> anyhow::Result<()> {
        assert!(FormPayload::from_fields(FormKind::Assignment, &lines(&[" "])).is_err());
        assert!(FormPayload::from_fields(FormKind::Assignment, &lines(&["1,x"])).is_err());
        let payload = FormPayload::from_fields(FormKind::Assignment, &lines(&["3, 5"]))?;
        let FormPayload::Assignment(input) = &payload else {
            panic!("expected assignment payload");
        };
        assert_eq!(input.products, vec![ProductId::new(3), ProductId::new(5)]);
        assert_eq!(payload.to_json(), json!({"products": [3, 5]}));
        Ok(())
    }

    #[test]
    fn cash_form_totals_denominations() -> anyhow::Result<()> {
        let payload = FormPayload::from_fields(
            FormKind::Cash,
            &lines(&["2025-02-03", "ojo", "1", "", "", "", "", "", "", "", "", "", "3"]),
        )?;
        let body = payload.to_json();
        assert_eq!(body["type_product"], "OJO");
        assert_eq!(body["total"], json!(200.3));
        assert_eq!(body["ten_cents"], json!(3));

        let negative = FormPayload::from_fields(
            FormKind::Cash,
            &lines(&["2025-02-03", "OJO", "-1", "", "", "", "", "", "", "", "", "", ""]),
        );
        assert!(negative.is_err());
        Ok(())
    }

    #[test]
    fn yape_rejects_long_operation_codes_and_bad_dates() {
        let long = FormPayload::from_fields(FormKind::Yape, &lines(&["Ana", "20", "", "1234"]));
        assert!(long.is_err());
        let bad_date =
            FormPayload::from_fields(FormKind::Yape, &lines(&["Ana", "20", "03/02/2025", ""]));
        assert!(bad_date.is_err());
    }

    #[test]
    fn finance_accepts_spanish_operation_names() -> anyhow::Result<()> {
        let payload =
            FormPayload::from_fields(FormKind::Finance, &lines(&["egreso", "Luz", "80.5"]))?;
        assert_eq!(payload.to_json()["type_operation"], "EXPENSE");
        Ok(())
    }

    #[test]
    fn login_requires_both_fields() {
        let input = LoginInput {
            username: "admin".to_owned(),
            password: String::new(),
        };
        assert!(input.validate().is_err());
    }
}
