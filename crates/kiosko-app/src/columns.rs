// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::Arc;

use crate::edit::{EditKind, EditValue, format_number};
use crate::{
    Assignment, DENOMINATIONS, DetailAssignmentId, DetailStatus, OperationType, Product,
    ReportKind, Resource, Route,
};

/// Renders a cell from its resolved value and the whole row.
pub type CellRenderer = Arc<dyn Fn(Option<&Value>, &Value) -> String + Send + Sync>;

#[derive(Debug, Clone, PartialEq)]
pub enum EditSeed {
    Accessor,
    Fixed(EditValue),
}

/// What a committed edit turns into on the server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CellAction {
    Patch {
        resource: Resource,
        id_path: String,
        field: String,
    },
    RegisterDevolution {
        detail_path: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum UpdateRequest {
    Patch {
        resource: Resource,
        id: i64,
        field: String,
        value: Value,
    },
    RegisterDevolution {
        detail_id: DetailAssignmentId,
        quantity: i64,
    },
}

impl CellAction {
    pub fn target_exists(&self, row: &Value) -> bool {
        match self {
            Self::Patch { id_path, .. } => resolve_path(row, id_path).is_some_and(Value::is_i64),
            Self::RegisterDevolution { detail_path } => resolve_path(row, detail_path)
                .and_then(|detail| detail.get("id"))
                .is_some_and(Value::is_i64),
        }
    }

    pub fn request(&self, row: &Value, value: &EditValue) -> Result<UpdateRequest> {
        match self {
            Self::Patch {
                resource,
                id_path,
                field,
            } => {
                let id = resolve_path(row, id_path)
                    .and_then(Value::as_i64)
                    .ok_or_else(|| anyhow!("row has no {id_path}; refresh and retry"))?;
                Ok(UpdateRequest::Patch {
                    resource: *resource,
                    id,
                    field: field.clone(),
                    value: value.to_json(),
                })
            }
            Self::RegisterDevolution { detail_path } => {
                let detail = DetailCell::at(row, detail_path)
                    .ok_or_else(|| anyhow!("nothing assigned in this cell"))?;
                if matches!(value, EditValue::Number(raw) if raw.fract() != 0.0) {
                    bail!("return quantity must be a whole number");
                }
                let quantity = value
                    .as_i64()
                    .ok_or_else(|| anyhow!("return quantity must be a number"))?;
                if quantity < 0 {
                    bail!("return quantity cannot be negative");
                }
                if quantity > detail.pending() {
                    bail!(
                        "cannot return {quantity}; only {} pending for this product",
                        detail.pending()
                    );
                }
                Ok(UpdateRequest::RegisterDevolution {
                    detail_id: DetailAssignmentId::new(detail.id),
                    quantity,
                })
            }
        }
    }
}

#[derive(Clone)]
pub struct ColumnDescriptor {
    pub id: String,
    pub accessor_path: String,
    pub header: String,
    pub editable: bool,
    pub kind: Option<EditKind>,
    pub seed: EditSeed,
    pub render: Option<CellRenderer>,
    pub action: Option<CellAction>,
    pub width: u16,
}

impl fmt::Debug for ColumnDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnDescriptor")
            .field("id", &self.id)
            .field("accessor_path", &self.accessor_path)
            .field("header", &self.header)
            .field("editable", &self.editable)
            .field("kind", &self.kind)
            .field("seed", &self.seed)
            .field("render", &self.render.as_ref().map(|_| "<fn>"))
            .field("action", &self.action)
            .finish()
    }
}

impl ColumnDescriptor {
    pub fn new(
        id: impl Into<String>,
        accessor_path: impl Into<String>,
        header: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            accessor_path: accessor_path.into(),
            header: header.into(),
            editable: false,
            kind: None,
            seed: EditSeed::Accessor,
            render: None,
            action: None,
            width: 12,
        }
    }

    /// Plain field of `resource`, patched by the row's `id` when edited.
    pub fn field(resource: Resource, field: &str, header: &str, kind: EditKind) -> Self {
        Self::new(field, field, header).editable(
            kind,
            CellAction::Patch {
                resource,
                id_path: "id".to_owned(),
                field: field.to_owned(),
            },
        )
    }

    pub fn editable(mut self, kind: EditKind, action: CellAction) -> Self {
        self.editable = true;
        self.kind = Some(kind);
        self.action = Some(action);
        self
    }

    pub fn seeded(mut self, value: EditValue) -> Self {
        self.seed = EditSeed::Fixed(value);
        self
    }

    pub fn render_with(
        mut self,
        render: impl Fn(Option<&Value>, &Value) -> String + Send + Sync + 'static,
    ) -> Self {
        self.render = Some(Arc::new(render));
        self
    }

    pub fn width(mut self, width: u16) -> Self {
        self.width = width;
        self
    }

    pub fn resolve<'a>(&self, row: &'a Value) -> Option<&'a Value> {
        resolve_path(row, &self.accessor_path)
    }

    pub fn display(&self, row: &Value) -> String {
        let value = self.resolve(row);
        match &self.render {
            Some(render) => render(value, row),
            None => display_value(value),
        }
    }

    /// Whether an edit session may open on this cell of `row`.
    pub fn can_edit(&self, row: &Value) -> bool {
        self.editable
            && self
                .action
                .as_ref()
                .is_some_and(|action| action.target_exists(row))
    }

    pub fn original_value(&self, row: &Value) -> EditValue {
        match (&self.seed, self.kind) {
            (EditSeed::Fixed(value), _) => value.clone(),
            (EditSeed::Accessor, Some(kind)) => EditValue::from_json(kind, self.resolve(row)),
            (EditSeed::Accessor, None) => EditValue::infer(self.resolve(row)),
        }
    }

    pub fn detail_path(&self) -> Option<&str> {
        match &self.action {
            Some(CellAction::RegisterDevolution { detail_path }) => Some(detail_path),
            _ => None,
        }
    }
}

/// Ordered columns with unique ids.
#[derive(Debug, Clone, Default)]
pub struct ColumnSet {
    columns: Vec<ColumnDescriptor>,
}

impl ColumnSet {
    pub fn new(columns: Vec<ColumnDescriptor>) -> Result<Self> {
        let mut seen = BTreeSet::new();
        for column in &columns {
            if !seen.insert(column.id.as_str()) {
                bail!("duplicate column id {:?}", column.id);
            }
        }
        Ok(Self { columns })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColumnDescriptor> {
        self.columns.iter()
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&ColumnDescriptor> {
        self.columns.get(index)
    }

    pub fn position(&self, id: &str) -> Option<usize> {
        self.columns.iter().position(|column| column.id == id)
    }

    pub fn by_id(&self, id: &str) -> Option<&ColumnDescriptor> {
        self.columns.iter().find(|column| column.id == id)
    }
}

/// Follows a dotted path; numeric segments index arrays.
pub fn resolve_path<'a>(row: &'a Value, path: &str) -> Option<&'a Value> {
    if path.is_empty() {
        return Some(row);
    }
    path.split('.').try_fold(row, |current, segment| match current {
        Value::Object(map) => map.get(segment),
        Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get(i)),
        _ => None,
    })
}

/// Replaces the value at `path`; returns false when the path does not resolve.
pub fn set_path(row: &mut Value, path: &str, value: Value) -> bool {
    let mut current = row;
    let mut segments = path.split('.').peekable();
    while let Some(segment) = segments.next() {
        let slot = match current {
            Value::Object(map) => map.get_mut(segment),
            Value::Array(items) => segment.parse::<usize>().ok().and_then(|i| items.get_mut(i)),
            _ => None,
        };
        let Some(slot) = slot else {
            return false;
        };
        if segments.peek().is_none() {
            *slot = value;
            return true;
        }
        current = slot;
    }
    false
}

pub fn display_value(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(text)) => text.clone(),
        Some(Value::Number(number)) => number
            .as_f64()
            .map(format_number)
            .unwrap_or_else(|| number.to_string()),
        Some(Value::Bool(flag)) => flag.to_string(),
        Some(other) => other.to_string(),
    }
}

pub fn format_money(amount: f64) -> String {
    format!("S/ {amount:.2}")
}

fn as_f64(value: Option<&Value>) -> Option<f64> {
    match value? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

fn money(value: Option<&Value>, _row: &Value) -> String {
    as_f64(value).map(format_money).unwrap_or_default()
}

fn active_label(value: Option<&Value>, _row: &Value) -> String {
    match value.and_then(Value::as_bool) {
        Some(true) => "Activo".to_owned(),
        Some(false) => "Inactivo".to_owned(),
        None => String::new(),
    }
}

/// Read-only view of a detail assignment embedded in a row.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetailCell {
    pub id: i64,
    pub quantity: i64,
    pub returned_amount: i64,
    pub unit_price: f64,
    pub paid: bool,
}

impl DetailCell {
    pub fn at(row: &Value, path: &str) -> Option<Self> {
        Self::from_value(resolve_path(row, path)?)
    }

    pub fn from_value(value: &Value) -> Option<Self> {
        let count = |key: &str| as_f64(value.get(key)).map_or(0, |v| v.round() as i64);
        Some(Self {
            id: value.get("id")?.as_i64()?,
            quantity: count("quantity"),
            returned_amount: count("returned_amount"),
            unit_price: as_f64(value.get("unit_price")).unwrap_or(0.0),
            paid: value.get("status").and_then(Value::as_str)
                == Some(DetailStatus::Finished.as_str()),
        })
    }

    pub fn pending(&self) -> i64 {
        (self.quantity - self.returned_amount).max(0)
    }

    pub fn amount_due(&self) -> f64 {
        self.pending() as f64 * self.unit_price
    }
}

/// Shared renderer for every per-product assignment cell.
pub fn detail_summary(value: Option<&Value>, _row: &Value) -> String {
    let Some(detail) = value.and_then(DetailCell::from_value) else {
        return "Sin asignaciones".to_owned();
    };
    if detail.quantity == 0 {
        return "Sin asignaciones".to_owned();
    }
    let status = if detail.paid {
        DetailStatus::Finished
    } else {
        DetailStatus::Pending
    };
    format!(
        "{}/{} dev · {} pend · {} · {}",
        detail.returned_amount,
        detail.quantity,
        detail.pending(),
        format_money(detail.amount_due()),
        status.label()
    )
}

/// Request flipping the paid flag of the detail under a devolution cell.
pub fn toggle_paid_request(column: &ColumnDescriptor, row: &Value) -> Result<UpdateRequest> {
    let detail = column_detail(column, row)?;
    let next = if detail.paid {
        DetailStatus::Pending
    } else {
        DetailStatus::Finished
    };
    Ok(UpdateRequest::Patch {
        resource: Resource::DetailAssignments,
        id: detail.id,
        field: "status".to_owned(),
        value: Value::String(next.as_str().to_owned()),
    })
}

/// Request clearing every registered return of the detail under a devolution cell.
pub fn reset_returns_request(column: &ColumnDescriptor, row: &Value) -> Result<UpdateRequest> {
    let detail = column_detail(column, row)?;
    Ok(UpdateRequest::Patch {
        resource: Resource::DetailAssignments,
        id: detail.id,
        field: "returned_amount".to_owned(),
        value: Value::from(0),
    })
}

fn column_detail(column: &ColumnDescriptor, row: &Value) -> Result<DetailCell> {
    let path = column
        .detail_path()
        .ok_or_else(|| anyhow!("{} is not a product column", column.header))?;
    DetailCell::at(row, path).ok_or_else(|| anyhow!("nothing assigned in this cell"))
}

pub fn to_rows<T: Serialize>(items: &[T]) -> Result<Vec<Value>> {
    items
        .iter()
        .map(|item| serde_json::to_value(item).context("encode row"))
        .collect()
}

/// Flattens an assignment into a row with its details keyed by product id.
pub fn assignment_row(assignment: &Assignment) -> Result<Value> {
    let mut row = serde_json::to_value(assignment).context("encode assignment row")?;
    let mut by_product = Map::new();
    for detail in &assignment.detail_assignments {
        by_product.insert(
            detail.product.id.to_string(),
            serde_json::to_value(detail).context("encode assignment detail")?,
        );
    }
    if let Value::Object(map) = &mut row {
        map.insert("by_product".to_owned(), Value::Object(by_product));
        map.insert(
            "total_assigned".to_owned(),
            Value::from(assignment.assigned_total()),
        );
        map.insert("debt".to_owned(), Value::from(assignment.debt()));
    }
    Ok(row)
}

pub fn assignment_rows(assignments: &[Assignment]) -> Result<Vec<Value>> {
    assignments.iter().map(assignment_row).collect()
}

/// Distinct products referenced by assignment rows, ordered by id.
pub fn products_in_rows(rows: &[Value]) -> Vec<Product> {
    let mut products = BTreeMap::new();
    for row in rows {
        let Some(Value::Array(details)) = row.get("detail_assignments") else {
            continue;
        };
        for detail in details {
            if let Some(product) = detail
                .get("product")
                .and_then(|value| serde_json::from_value::<Product>(value.clone()).ok())
            {
                products.entry(product.id).or_insert(product);
            }
        }
    }
    products.into_values().collect()
}

pub fn seller_columns() -> Result<ColumnSet> {
    ColumnSet::new(vec![
        ColumnDescriptor::new("number_seller", "number_seller", "Código").width(8),
        ColumnDescriptor::field(Resource::Sellers, "name", "Nombre", EditKind::Text).width(16),
        ColumnDescriptor::field(Resource::Sellers, "last_name", "Apellido", EditKind::Text)
            .width(16),
        ColumnDescriptor::field(Resource::Sellers, "dni", "DNI", EditKind::Text).width(10),
        ColumnDescriptor::field(Resource::Sellers, "phone", "Teléfono", EditKind::Text).width(11),
        ColumnDescriptor::field(Resource::Sellers, "status", "Estado", EditKind::Boolean)
            .render_with(active_label)
            .width(9),
    ])
}

pub fn product_columns() -> Result<ColumnSet> {
    ColumnSet::new(vec![
        ColumnDescriptor::field(Resource::Products, "name", "Nombre", EditKind::Text).width(24),
        ColumnDescriptor::field(Resource::Products, "product_price", "Precio", EditKind::Number)
            .render_with(money),
        ColumnDescriptor::field(
            Resource::Products,
            "returns_date",
            "Días dev.",
            EditKind::Number,
        )
        .width(9),
        ColumnDescriptor::field(Resource::Products, "status_product", "Estado", EditKind::Boolean)
            .render_with(active_label)
            .width(9),
    ])
}

const WEEKDAY_PRICES: [(&str, &str); 7] = [
    ("monday_price", "Lun"),
    ("tuesday_price", "Mar"),
    ("wednesday_price", "Mié"),
    ("thursday_price", "Jue"),
    ("friday_price", "Vie"),
    ("saturday_price", "Sáb"),
    ("sunday_price", "Dom"),
];

pub fn newspaper_columns() -> Result<ColumnSet> {
    let mut columns = vec![
        ColumnDescriptor::field(Resource::Products, "name", "Nombre", EditKind::Text).width(20),
    ];
    columns.extend(WEEKDAY_PRICES.iter().map(|(field, header)| {
        ColumnDescriptor::field(Resource::Products, field, header, EditKind::Number)
            .render_with(money)
            .width(9)
    }));
    columns.push(
        ColumnDescriptor::field(Resource::Products, "returns_date", "Días dev.", EditKind::Number)
            .width(9),
    );
    columns.push(
        ColumnDescriptor::field(Resource::Products, "status_product", "Estado", EditKind::Boolean)
            .render_with(active_label)
            .width(9),
    );
    ColumnSet::new(columns)
}

fn seller_identity_columns() -> Vec<ColumnDescriptor> {
    vec![
        ColumnDescriptor::new("seller_code", "seller.number_seller", "Código").width(8),
        ColumnDescriptor::new("seller_name", "seller", "Vendedor")
            .render_with(|value, _row| {
                let name = value
                    .and_then(|seller| seller.get("name"))
                    .map(|v| display_value(Some(v)));
                let last = value
                    .and_then(|seller| seller.get("last_name"))
                    .map(|v| display_value(Some(v)));
                format!("{} {}", name.unwrap_or_default(), last.unwrap_or_default())
                    .trim()
                    .to_owned()
            })
            .width(20),
        ColumnDescriptor::new("date_assignment", "date_assignment", "Fecha").width(10),
    ]
}

pub fn assignment_columns(products: &[Product]) -> Result<ColumnSet> {
    let mut columns = seller_identity_columns();
    columns.extend(products.iter().map(|product| {
        let base = format!("by_product.{}", product.id);
        ColumnDescriptor::new(
            format!("product-{}", product.id),
            format!("{base}.quantity"),
            product.name.clone(),
        )
        .editable(
            EditKind::Number,
            CellAction::Patch {
                resource: Resource::DetailAssignments,
                id_path: format!("{base}.id"),
                field: "quantity".to_owned(),
            },
        )
        .render_with(|value, _row| match value {
            Some(value) => display_value(Some(value)),
            None => "-".to_owned(),
        })
        .width(10)
    }));
    columns.push(
        ColumnDescriptor::new("total_assigned", "total_assigned", "Total")
            .render_with(money)
            .width(11),
    );
    ColumnSet::new(columns)
}

pub fn devolution_columns(products: &[Product]) -> Result<ColumnSet> {
    let mut columns = seller_identity_columns();
    columns.extend(products.iter().map(|product| {
        let path = format!("by_product.{}", product.id);
        ColumnDescriptor::new(format!("return-{}", product.id), path.clone(), product.name.clone())
            .editable(EditKind::Number, CellAction::RegisterDevolution { detail_path: path })
            .seeded(EditValue::Number(0.0))
            .render_with(detail_summary)
            .width(34)
    }));
    columns.push(
        ColumnDescriptor::new("debt", "debt", "Deuda")
            .render_with(money)
            .width(11),
    );
    ColumnSet::new(columns)
}

pub fn cash_columns() -> Result<ColumnSet> {
    let mut columns = vec![
        ColumnDescriptor::field(Resource::Cash, "date_cash", "Fecha", EditKind::Date).width(10),
        ColumnDescriptor::new("type_product", "type_product", "Caja").width(9),
    ];
    columns.extend(DENOMINATIONS.iter().map(|denomination| {
        ColumnDescriptor::field(
            Resource::Cash,
            denomination.field,
            denomination.label,
            EditKind::Number,
        )
        .width(8)
    }));
    columns.push(
        ColumnDescriptor::new("total", "total", "Total")
            .render_with(money)
            .width(11),
    );
    ColumnSet::new(columns)
}

pub fn yape_columns() -> Result<ColumnSet> {
    ColumnSet::new(vec![
        ColumnDescriptor::field(Resource::Yape, "name", "Nombre", EditKind::Text).width(22),
        ColumnDescriptor::field(Resource::Yape, "amount", "Monto", EditKind::Number)
            .render_with(money),
        ColumnDescriptor::field(Resource::Yape, "date_yape", "Fecha", EditKind::Date).width(10),
        ColumnDescriptor::field(Resource::Yape, "operation_code", "Operación", EditKind::Text)
            .width(10),
    ])
}

pub fn finance_columns() -> Result<ColumnSet> {
    ColumnSet::new(vec![
        ColumnDescriptor::new("date_finance", "date_finance", "Fecha").width(10),
        ColumnDescriptor::new("type_operation", "type_operation", "Tipo")
            .render_with(|value, _row| {
                value
                    .and_then(Value::as_str)
                    .and_then(OperationType::parse)
                    .map(|kind| kind.label().to_owned())
                    .unwrap_or_default()
            })
            .width(8),
        ColumnDescriptor::field(Resource::Finance, "description", "Descripción", EditKind::Text)
            .width(30),
        ColumnDescriptor::field(Resource::Finance, "amount", "Monto", EditKind::Number)
            .render_with(money),
    ])
}

pub fn report_columns(kind: ReportKind) -> Result<ColumnSet> {
    let seller = || ColumnDescriptor::new("seller_name", "seller_name", "Vendedor").width(24);
    let product = || ColumnDescriptor::new("product_name", "product_name", "Producto").width(24);
    let sold = || ColumnDescriptor::new("total_sold", "total_sold", "Vendidos").width(10);
    let amount = || {
        ColumnDescriptor::new("total_amount", "total_amount", "Monto")
            .render_with(money)
            .width(12)
    };
    let columns = match kind {
        ReportKind::SalesBySeller => vec![seller(), sold(), amount()],
        ReportKind::MonthlyEarnings => vec![
            ColumnDescriptor::new("month", "month", "Mes").width(12),
            ColumnDescriptor::new("total_earnings", "total_earnings", "Ganancias")
                .render_with(money)
                .width(12),
        ],
        ReportKind::TopProducts | ReportKind::TopNewspapers => vec![product(), sold(), amount()],
        ReportKind::Profits => vec![
            seller(),
            ColumnDescriptor::new("total_profit", "total_profit", "Utilidad")
                .render_with(money)
                .width(12),
        ],
        ReportKind::ReturnsAndEfficiency => vec![
            seller(),
            sold(),
            ColumnDescriptor::new("total_returned", "total_returned", "Devueltos").width(10),
            ColumnDescriptor::new("return_percentage", "return_percentage", "% dev.")
                .render_with(|value, _row| {
                    as_f64(value).map(|pct| format!("{pct:.1}%")).unwrap_or_default()
                })
                .width(8),
            ColumnDescriptor::new("impact_on_sales", "impact_on_sales", "Impacto")
                .render_with(money)
                .width(12),
        ],
    };
    ColumnSet::new(columns)
}

/// Columns for a route's table; assignment views need the products on the page.
pub fn columns_for(route: Route, rows: &[Value], report: ReportKind) -> Result<ColumnSet> {
    match route {
        Route::Sellers => seller_columns(),
        Route::Products => product_columns(),
        Route::Newspapers => newspaper_columns(),
        Route::Assignments => assignment_columns(&products_in_rows(rows)),
        Route::Devolutions => devolution_columns(&products_in_rows(rows)),
        Route::Cash => cash_columns(),
        Route::Yape => yape_columns(),
        Route::Finances => finance_columns(),
        Route::Reports => report_columns(report),
        Route::Login | Route::Home => ColumnSet::new(Vec::new()),
    }
}
