// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow, bail};
use kiosko_api::{CashFilter, Client, ListQuery};
use kiosko_app::columns::{UpdateRequest, assignment_rows, to_rows};
use kiosko_app::edit::format_iso_date;
use kiosko_app::forms::{FormPayload, LoginInput};
use kiosko_app::tickets::{DrawerCount, assignment_ticket, cash_report, debtors_report};
use kiosko_app::{
    Assignment, FinanceSummary, MonthlyEarnings, Page, ProductSales, ProductType, ReportKind,
    Resource, ReturnsEfficiency, Route, SellerProfit, SellerSales,
};
use kiosko_tui::{AppRuntime, ExportKind, InternalEvent, PageQuery};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use std::thread;
use time::{Date, OffsetDateTime};
use tracing::{debug, warn};

/// Cash drawers and yapes fit on one page of the daily report.
const REPORT_FETCH_SIZE: u32 = 100;

pub struct ApiRuntime {
    client: Client,
    export_dir: PathBuf,
}

impl ApiRuntime {
    pub fn new(client: Client, export_dir: PathBuf) -> Self {
        Self { client, export_dir }
    }

    fn write_export(&self, name: &str, body: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.export_dir)
            .with_context(|| format!("create export directory {}", self.export_dir.display()))?;
        let path = self.export_dir.join(name);
        fs::write(&path, body).with_context(|| format!("write {}", path.display()))?;
        Ok(path)
    }
}

/// Loads one page of `query.route` as table rows.
pub fn load_rows(client: &Client, query: &PageQuery) -> Result<Page<Value>> {
    let list = ListQuery::new(query.request.page, query.request.page_size);
    let search = query.request.search.as_deref();
    let (start, end) = (Some(query.start), Some(query.end));
    match query.route {
        Route::Sellers => rows_page(client.list_sellers(list, search)?),
        Route::Products => {
            rows_page(client.list_products(list, Some(ProductType::Product), search)?)
        }
        Route::Newspapers => {
            rows_page(client.list_products(list, Some(ProductType::Newspaper), search)?)
        }
        Route::Assignments | Route::Devolutions => {
            let page = client.list_assignments(list, start, end)?;
            Ok(Page::new(page.count, assignment_rows(&page.results)?))
        }
        Route::Cash => rows_page(client.list_cash(
            list,
            CashFilter {
                from: start,
                to: end,
                ..CashFilter::default()
            },
        )?),
        Route::Yape => rows_page(client.list_yape(list, start, end)?),
        Route::Finances => rows_page(client.list_finance(list, None, None)?),
        Route::Reports => {
            let rows = match query.report {
                ReportKind::SalesBySeller => {
                    to_rows(&client.report::<SellerSales>(query.report, query.start, query.end)?)?
                }
                ReportKind::MonthlyEarnings => to_rows(
                    &client.report::<MonthlyEarnings>(query.report, query.start, query.end)?,
                )?,
                ReportKind::TopProducts | ReportKind::TopNewspapers => {
                    to_rows(&client.report::<ProductSales>(query.report, query.start, query.end)?)?
                }
                ReportKind::Profits => {
                    to_rows(&client.report::<SellerProfit>(query.report, query.start, query.end)?)?
                }
                ReportKind::ReturnsAndEfficiency => to_rows(
                    &client.report::<ReturnsEfficiency>(query.report, query.start, query.end)?,
                )?,
            };
            Ok(Page::new(rows.len() as u64, rows))
        }
        Route::Login | Route::Home => bail!("{} has no table", query.route.label()),
    }
}

fn rows_page<T: serde::Serialize>(page: Page<T>) -> Result<Page<Value>> {
    Ok(Page::new(page.count, to_rows(&page.results)?))
}

fn route_resource(route: Route) -> Option<Resource> {
    match route {
        Route::Sellers => Some(Resource::Sellers),
        Route::Products | Route::Newspapers => Some(Resource::Products),
        Route::Assignments => Some(Resource::Assignments),
        Route::Cash => Some(Resource::Cash),
        Route::Yape => Some(Resource::Yape),
        Route::Finances => Some(Resource::Finance),
        Route::Login | Route::Home | Route::Devolutions | Route::Reports => None,
    }
}

fn decode_assignments(rows: &[Value]) -> Result<Vec<Assignment>> {
    rows.iter()
        .map(|row| serde_json::from_value(row.clone()).context("decode assignment row"))
        .collect()
}

fn slug(text: &str) -> String {
    text.chars()
        .map(|ch| if ch.is_alphanumeric() { ch.to_ascii_lowercase() } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

fn assignment_export(assignment: &Assignment, now: OffsetDateTime) -> Result<String> {
    let types = [ProductType::Newspaper, ProductType::Product];
    let tickets = types
        .into_iter()
        .filter(|product_type| {
            assignment
                .detail_assignments
                .iter()
                .any(|detail| detail.product.product_type == Some(*product_type))
        })
        .map(|product_type| assignment_ticket(assignment, product_type, now.time()))
        .collect::<Vec<_>>();
    if tickets.is_empty() {
        bail!("assignment {} has no products to print", assignment.id);
    }
    Ok(tickets.join("\n"))
}

impl AppRuntime for ApiRuntime {
    fn session_active(&mut self) -> bool {
        self.client.session().is_signed_in()
    }

    fn login(&mut self, input: &LoginInput) -> Result<()> {
        self.client.login(input)?;
        Ok(())
    }

    fn logout(&mut self) -> Result<()> {
        self.client.logout();
        Ok(())
    }

    fn load_home(&mut self, today: Date) -> Result<FinanceSummary> {
        self.client
            .finance_monthly_summary(today.year(), u8::from(today.month()))
    }

    fn load_page(&mut self, query: &PageQuery) -> Result<Page<Value>> {
        load_rows(&self.client, query)
    }

    fn spawn_page_load(&mut self, query: PageQuery, tx: Sender<InternalEvent>) -> Result<()> {
        let client = self.client.clone();
        thread::Builder::new()
            .name(format!("load-{}", query.route.label()))
            .spawn(move || {
                let result = load_rows(&client, &query).map_err(|error| {
                    let message = format!("{error:#}");
                    warn!(route = query.route.label(), error = %message, "load failed");
                    message
                });
                if tx
                    .send(InternalEvent::PageLoaded {
                        mount: query.mount,
                        seq: query.request.seq,
                        result,
                    })
                    .is_err()
                {
                    debug!("page event channel closed before load finished");
                }
            })
            .context("spawn page loader")?;
        Ok(())
    }

    fn apply_update(&mut self, request: &UpdateRequest) -> Result<()> {
        self.client.apply(request)
    }

    fn delete_row(&mut self, route: Route, row: &Value) -> Result<()> {
        let resource = route_resource(route)
            .ok_or_else(|| anyhow!("rows on {} cannot be deleted", route.label()))?;
        let id = row
            .get("id")
            .and_then(Value::as_i64)
            .ok_or_else(|| anyhow!("row has no id; refresh and retry"))?;
        self.client.delete(resource, id)
    }

    fn submit_form(&mut self, payload: &FormPayload) -> Result<()> {
        self.client.submit(payload)?;
        Ok(())
    }

    fn export(&mut self, kind: ExportKind, rows: &[Value], today: Date) -> Result<PathBuf> {
        let now = OffsetDateTime::now_utc();
        match kind {
            ExportKind::AssignmentTicket { row } => {
                let value = rows
                    .get(row)
                    .ok_or_else(|| anyhow!("no assignment at row {}", row + 1))?;
                let assignment: Assignment =
                    serde_json::from_value(value.clone()).context("decode assignment row")?;
                let body = assignment_export(&assignment, now)?;
                let name = format!(
                    "ticket-{}-{}.txt",
                    slug(&assignment.seller.full_name()),
                    format_iso_date(assignment.date_assignment)
                );
                self.write_export(&name, &body)
            }
            ExportKind::Debtors => {
                let assignments = decode_assignments(rows)?;
                let body = debtors_report(&assignments, today, now.time());
                self.write_export(&format!("deudores-{}.txt", format_iso_date(today)), &body)
            }
            ExportKind::CashReport => {
                let filter = CashFilter {
                    date: Some(today),
                    ..CashFilter::default()
                };
                let drawers = self
                    .client
                    .list_cash(ListQuery::new(1, REPORT_FETCH_SIZE), filter)?
                    .results
                    .iter()
                    .map(|cash| DrawerCount {
                        cash_box: cash.type_product,
                        counts: cash.counts(),
                    })
                    .collect::<Vec<_>>();
                let yapes = self
                    .client
                    .list_yape(ListQuery::new(1, REPORT_FETCH_SIZE), Some(today), Some(today))?
                    .results;
                let body = cash_report(today, &drawers, &yapes, now.time());
                self.write_export(&format!("caja-{}.txt", format_iso_date(today)), &body)
            }
        }
    }
}

/// Resolves the export directory relative to the working directory when needed.
pub fn absolute_export_dir(dir: &Path) -> Result<PathBuf> {
    if dir.is_absolute() {
        return Ok(dir.to_path_buf());
    }
    let cwd = std::env::current_dir().context("resolve working directory")?;
    Ok(cwd.join(dir))
}

#[cfg(test)]
mod tests {
    use super::{ApiRuntime, load_rows, slug};
    use anyhow::Result;
    use kiosko_api::{Client, MemoryTokenStore, Tokens};
    use kiosko_app::fetch::FetchRequest;
    use kiosko_app::{ReportKind, Route};
    use kiosko_testkit::{
        MockBackend, MockResponse, fake_jwt, page_json, sample_assignment, sample_sellers,
    };
    use kiosko_tui::{AppRuntime, ExportKind, PageQuery};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use time::macros::date;

    fn signed_in_client(base_url: &str) -> Result<Client> {
        let store = MemoryTokenStore::with_tokens(Tokens::new(fake_jwt(1, "a"), "refresh"));
        Client::new(base_url, Duration::from_secs(2), Arc::new(store))
    }

    fn query(route: Route) -> PageQuery {
        PageQuery {
            route,
            mount: 1,
            request: FetchRequest {
                seq: 1,
                page: 2,
                page_size: 20,
                search: Some("ana".to_owned()),
            },
            report: ReportKind::SalesBySeller,
            start: date!(2025 - 02 - 01),
            end: date!(2025 - 02 - 03),
        }
    }

    #[test]
    fn seller_rows_come_from_paged_listing() -> Result<()> {
        let backend =
            MockBackend::start(1, |_| MockResponse::ok(page_json(42, sample_sellers(2))))?;
        let client = signed_in_client(backend.base_url())?;
        let page = load_rows(&client, &query(Route::Sellers))?;
        let requests = backend.finish();

        assert_eq!(page.count, 42);
        assert_eq!(page.results.len(), 2);
        assert_eq!(requests[0].path(), "/api/v1/sellers/");
        assert_eq!(requests[0].query(), "page=2&page_size=20&search=ana");
        Ok(())
    }

    #[test]
    fn newspaper_listing_filters_by_type() -> Result<()> {
        let backend = MockBackend::start(1, |_| MockResponse::ok(page_json(0, Vec::new())))?;
        let client = signed_in_client(backend.base_url())?;
        load_rows(&client, &query(Route::Newspapers))?;
        let requests = backend.finish();
        assert!(requests[0].query().contains("product_type=NEWSPAPER"));
        assert!(requests[0].query().contains("product_name=ana"));
        Ok(())
    }

    #[test]
    fn assignment_rows_carry_product_index() -> Result<()> {
        let backend =
            MockBackend::start(1, |_| MockResponse::ok(page_json(1, vec![sample_assignment()])))?;
        let client = signed_in_client(backend.base_url())?;
        let page = load_rows(&client, &query(Route::Devolutions))?;
        let requests = backend.finish();

        assert!(requests[0].query().contains("start_date=2025-02-01"));
        assert!(requests[0].query().contains("end_date=2025-02-03"));
        assert!(page.results[0]["by_product"].is_object());
        assert!(page.results[0]["debt"].is_number());
        Ok(())
    }

    #[test]
    fn report_rows_are_counted_locally() -> Result<()> {
        let backend = MockBackend::start(1, |_| {
            MockResponse::ok(json!([
                {"assignment__seller__name": "Ana", "total_sold": 10, "total_amount": "25.50"},
                {"assignment__seller__name": "Luis", "total_sold": 4, "total_amount": 8},
            ]))
        })?;
        let client = signed_in_client(backend.base_url())?;
        let page = load_rows(&client, &query(Route::Reports))?;
        backend.finish();

        assert_eq!(page.count, 2);
        assert_eq!(page.results[0]["seller_name"], json!("Ana"));
        Ok(())
    }

    #[test]
    fn delete_uses_route_resource() -> Result<()> {
        let backend = MockBackend::start(1, |_| MockResponse::empty(204))?;
        let client = signed_in_client(backend.base_url())?;
        let mut runtime = ApiRuntime::new(client, std::env::temp_dir());
        runtime.delete_row(Route::Newspapers, &json!({"id": 4}))?;
        let requests = backend.finish();
        assert_eq!(requests[0].method, "DELETE");
        assert_eq!(requests[0].path(), "/api/v1/products/4/");
        Ok(())
    }

    #[test]
    fn devolution_rows_cannot_be_deleted() -> Result<()> {
        let client = signed_in_client("http://127.0.0.1:9/api/v1/")?;
        let mut runtime = ApiRuntime::new(client, std::env::temp_dir());
        let error = runtime
            .delete_row(Route::Devolutions, &json!({"id": 4}))
            .expect_err("devolution rows are views");
        assert!(error.to_string().contains("cannot be deleted"));
        Ok(())
    }

    #[test]
    fn ticket_export_writes_file_named_after_seller() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let client = signed_in_client("http://127.0.0.1:9/api/v1/")?;
        let mut runtime = ApiRuntime::new(client, temp.path().to_path_buf());

        let rows = vec![sample_assignment()];
        let path = runtime.export(
            ExportKind::AssignmentTicket { row: 0 },
            &rows,
            date!(2025 - 02 - 03),
        )?;
        let body = std::fs::read_to_string(&path)?;

        let name = path.file_name().and_then(|name| name.to_str()).unwrap_or_default();
        assert!(name.starts_with("ticket-"));
        assert!(name.ends_with("-2025-02-03.txt"));
        assert!(body.contains("COMPROBANTE DE ENTREGA"));
        Ok(())
    }

    #[test]
    fn debtors_export_uses_today_in_file_name() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let client = signed_in_client("http://127.0.0.1:9/api/v1/")?;
        let mut runtime = ApiRuntime::new(client, temp.path().join("nested"));
        let path = runtime.export(
            ExportKind::Debtors,
            &[sample_assignment()],
            date!(2025 - 02 - 03),
        )?;
        assert!(path.ends_with("deudores-2025-02-03.txt"));
        assert!(path.exists());
        Ok(())
    }

    #[test]
    fn slug_keeps_accented_letters() {
        assert_eq!(slug("Lucía  Huamán"), "lucía-huamán");
        assert_eq!(slug("--Ana--"), "ana");
    }
}
