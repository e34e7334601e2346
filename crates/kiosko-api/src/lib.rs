// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

mod token;

pub use token::{
    FileTokenStore, MemoryTokenStore, TOKEN_FILE_NAME, TokenStore, Tokens, decode_user_id,
};

use anyhow::{Context, Result, anyhow, bail};
use kiosko_app::columns::UpdateRequest;
use kiosko_app::edit::format_iso_date;
use kiosko_app::forms::{AssignmentFormInput, FormPayload, LoginInput};
use kiosko_app::{
    Assignment, AssignmentId, Cash, CashBox, DetailAssignment, DetailAssignmentId,
    DetailStatus, Devolution, DevolutionId, Finance, FinanceSummary, OperationType, Page,
    Product, ProductId, ProductType, ReportKind, Resource, Seller, Yape,
};
use reqwest::blocking::{Client as HttpClient, Response};
use reqwest::{Method, StatusCode};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use time::Date;
use tracing::{debug, info, warn};
use url::Url;

const TOKEN_PATH: &str = "token/";
const REFRESH_PATH: &str = "token/refresh/";

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("cannot reach {base_url} -- check [api].base_url or KIOSKO_API_URL ({source})")]
    Transport {
        base_url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("server error ({status}): {message}")]
    Status { status: u16, message: String },
    #[error("decode {what}: {source}")]
    Decode {
        what: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("session expired -- sign in again")]
    SessionExpired,
    #[error("invalid username or password")]
    Unauthorized,
}

/// True when `error` (or anything it wraps) means the user must sign in again.
pub fn is_session_expired(error: &anyhow::Error) -> bool {
    matches!(
        error.downcast_ref::<ApiError>(),
        Some(ApiError::SessionExpired)
    )
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access: String,
    #[serde(default)]
    refresh: Option<String>,
}

/// Token state shared by every clone of a [`Client`]. Refreshes are
/// single-flight: callers holding the same stale access token wait on one
/// refresh and reuse its result.
pub struct Session {
    store: Arc<dyn TokenStore>,
    refresh_lock: Mutex<()>,
}

impl Session {
    pub fn new(store: Arc<dyn TokenStore>) -> Self {
        Self {
            store,
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn tokens(&self) -> Option<Tokens> {
        self.store.get()
    }

    pub fn access_token(&self) -> Option<String> {
        self.store.get().map(|tokens| tokens.access)
    }

    pub fn is_signed_in(&self) -> bool {
        self.store.get().is_some()
    }

    pub fn sign_in(&self, access: &str, refresh: &str) -> Result<Tokens> {
        let tokens = Tokens::new(access, refresh);
        self.store.set(tokens.clone()).context("save session")?;
        Ok(tokens)
    }

    pub fn sign_out(&self) {
        if let Err(error) = self.store.clear() {
            warn!(%error, "clear session");
        }
    }

    /// Returns a fresh access token for a request that was rejected with
    /// `stale`. Runs `refresh` only if nobody else replaced the token first.
    pub fn refresh_with<F>(&self, stale: &str, refresh: F) -> Result<String, ApiError>
    where
        F: FnOnce(&str) -> Result<(String, Option<String>), ApiError>,
    {
        let _guard = self
            .refresh_lock
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let Some(current) = self.store.get() else {
            return Err(ApiError::SessionExpired);
        };
        if current.access != stale {
            debug!("access token already refreshed");
            return Ok(current.access);
        }
        match refresh(&current.refresh) {
            Ok((access, rotated)) => {
                let tokens = Tokens::new(access, rotated.unwrap_or(current.refresh));
                if let Err(error) = self.store.set(tokens.clone()) {
                    warn!(%error, "persist refreshed session");
                }
                info!("access token refreshed");
                Ok(tokens.access)
            }
            Err(error) => {
                warn!(%error, "token refresh failed; clearing session");
                self.sign_out();
                Err(ApiError::SessionExpired)
            }
        }
    }
}

/// Query string for list endpoints: page plus endpoint-specific filters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub page: u32,
    pub page_size: u32,
    pub filters: Vec<(String, String)>,
}

impl ListQuery {
    pub fn new(page: u32, page_size: u32) -> Self {
        Self {
            page,
            page_size,
            filters: Vec::new(),
        }
    }

    pub fn filter(mut self, key: &str, value: impl ToString) -> Self {
        self.filters.push((key.to_owned(), value.to_string()));
        self
    }

    pub fn filter_opt<V: ToString>(self, key: &str, value: Option<V>) -> Self {
        match value {
            Some(value) => self.filter(key, value),
            None => self,
        }
    }

    pub fn date_opt(self, key: &str, value: Option<Date>) -> Self {
        self.filter_opt(key, value.map(format_iso_date))
    }

    fn pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::with_capacity(self.filters.len() + 2);
        if self.page > 0 {
            pairs.push(("page".to_owned(), self.page.to_string()));
        }
        if self.page_size > 0 {
            pairs.push(("page_size".to_owned(), self.page_size.to_string()));
        }
        pairs.extend(self.filters.iter().cloned());
        pairs
    }
}

/// Filters accepted by the cash listing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CashFilter {
    pub date: Option<Date>,
    pub from: Option<Date>,
    pub to: Option<Date>,
    pub cash_box: Option<CashBox>,
}

#[derive(Clone)]
pub struct Client {
    base_url: Url,
    refresh_url: Url,
    timeout: Duration,
    http: HttpClient,
    session: Arc<Session>,
}

impl Client {
    pub fn new(base_url: &str, timeout: Duration, store: Arc<dyn TokenStore>) -> Result<Self> {
        let trimmed = base_url.trim();
        if trimmed.is_empty() {
            bail!("api.base_url must not be empty");
        }
        // Relative joins need the trailing slash.
        let normalized = format!("{}/", trimmed.trim_end_matches('/'));
        let base_url = Url::parse(&normalized)
            .with_context(|| format!("invalid api.base_url {trimmed:?}"))?;
        let refresh_url = base_url
            .join(REFRESH_PATH)
            .context("build token refresh URL")?;

        let http = HttpClient::builder()
            .timeout(timeout)
            .build()
            .context("build HTTP client")?;

        Ok(Self {
            base_url,
            refresh_url,
            timeout,
            http,
            session: Arc::new(Session::new(store)),
        })
    }

    pub fn base_url(&self) -> &str {
        self.base_url.as_str()
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn login(&self, input: &LoginInput) -> Result<Tokens> {
        input.validate()?;
        let url = self.url(TOKEN_PATH, &[])?;
        let response = self
            .http
            .post(url)
            .json(&json!({"username": input.username.trim(), "password": input.password}))
            .send()
            .map_err(|source| self.transport(source))?;
        if response.status() == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized.into());
        }
        let parsed: TokenResponse = decode(check(response)?, "login response")?;
        let refresh = parsed
            .refresh
            .ok_or_else(|| anyhow!("login response has no refresh token"))?;
        let tokens = self.session.sign_in(&parsed.access, &refresh)?;
        info!(user_id = ?tokens.user_id, "signed in");
        Ok(tokens)
    }

    pub fn logout(&self) {
        self.session.sign_out();
        info!("signed out");
    }

    fn url(&self, path: &str, query: &[(String, String)]) -> Result<Url> {
        let mut url = self
            .base_url
            .join(path)
            .with_context(|| format!("build URL for {path}"))?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn transport(&self, source: reqwest::Error) -> ApiError {
        ApiError::Transport {
            base_url: self.base_url.to_string(),
            source,
        }
    }

    fn attempt(
        &self,
        method: &Method,
        url: &Url,
        body: Option<&Value>,
        access: Option<&str>,
    ) -> Result<Response, ApiError> {
        let mut request = self.http.request(method.clone(), url.clone());
        if let Some(access) = access {
            request = request.bearer_auth(access);
        }
        if let Some(body) = body {
            request = request.json(body);
        }
        request.send().map_err(|source| self.transport(source))
    }

    fn refresh_tokens(&self, refresh: &str) -> Result<(String, Option<String>), ApiError> {
        let response = self
            .http
            .post(self.refresh_url.clone())
            .json(&json!({"refresh": refresh}))
            .send()
            .map_err(|source| self.transport(source))?;
        let parsed: TokenResponse = decode(check(response)?, "refresh response")?;
        Ok((parsed.access, parsed.refresh))
    }

    /// Sends an authenticated request. A 401 triggers one refresh and one
    /// replay; a second 401 ends the session.
    fn execute(
        &self,
        method: Method,
        path: &str,
        query: &[(String, String)],
        body: Option<&Value>,
    ) -> Result<Response> {
        let url = self.url(path, query)?;
        debug!(%method, %url, "request");
        let access = self.session.access_token();
        let response = self.attempt(&method, &url, body, access.as_deref())?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(check(response)?);
        }

        let Some(stale) = access else {
            return Err(ApiError::SessionExpired.into());
        };
        warn!(%url, "request unauthorized; refreshing access token");
        let fresh = self
            .session
            .refresh_with(&stale, |refresh| self.refresh_tokens(refresh))?;
        let replay = self.attempt(&method, &url, body, Some(&fresh))?;
        if replay.status() == StatusCode::UNAUTHORIZED {
            warn!(%url, "replay still unauthorized; clearing session");
            self.session.sign_out();
            return Err(ApiError::SessionExpired.into());
        }
        Ok(check(replay)?)
    }

    fn get_json<T: DeserializeOwned>(&self, path: &str, query: &[(String, String)]) -> Result<T> {
        let response = self.execute(Method::GET, path, query, None)?;
        Ok(decode(response, path)?)
    }

    fn send_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        body: &Value,
    ) -> Result<T> {
        let response = self.execute(method, path, &[], Some(body))?;
        Ok(decode(response, path)?)
    }

    pub fn list<T: DeserializeOwned>(
        &self,
        resource: Resource,
        query: &ListQuery,
    ) -> Result<Page<T>> {
        self.list_at(resource.path(), query)
    }

    fn list_at<T: DeserializeOwned>(&self, path: &str, query: &ListQuery) -> Result<Page<T>> {
        let page: Page<T> = self
            .get_json(path, &query.pairs())
            .with_context(|| format!("list {path}"))?;
        debug!(path, count = page.count, rows = page.results.len(), "page loaded");
        Ok(page)
    }

    pub fn create<T: DeserializeOwned>(&self, resource: Resource, body: &Value) -> Result<T> {
        self.send_json(Method::POST, resource.path(), body)
            .with_context(|| format!("create {}", resource.label()))
    }

    pub fn patch_field(
        &self,
        resource: Resource,
        id: i64,
        field: &str,
        value: Value,
    ) -> Result<Value> {
        let path = format!("{}{id}/", resource.path());
        let mut body = serde_json::Map::new();
        body.insert(field.to_owned(), value);
        info!(resource = resource.label(), id, field, "patch");
        self.send_json(Method::PATCH, &path, &Value::Object(body))
            .with_context(|| format!("update {} {id}", resource.label()))
    }

    pub fn delete(&self, resource: Resource, id: i64) -> Result<()> {
        let path = format!("{}{id}/", resource.path());
        info!(resource = resource.label(), id, "delete");
        self.execute(Method::DELETE, &path, &[], None)
            .with_context(|| format!("delete {} {id}", resource.label()))?;
        Ok(())
    }

    /// Sends the server call behind a committed cell edit.
    pub fn apply(&self, request: &UpdateRequest) -> Result<()> {
        match request {
            UpdateRequest::Patch {
                resource,
                id,
                field,
                value,
            } => {
                self.patch_field(*resource, *id, field, value.clone())?;
            }
            UpdateRequest::RegisterDevolution {
                detail_id,
                quantity,
            } => {
                self.register_devolution(*detail_id, *quantity)?;
            }
        }
        Ok(())
    }

    /// Creates whatever a submitted form describes and returns the new record.
    pub fn submit(&self, payload: &FormPayload) -> Result<Value> {
        payload.validate()?;
        match payload {
            FormPayload::Assignment(input) => {
                let created = self.create_assignments(input)?;
                Ok(serde_json::to_value(created).context("encode created assignments")?)
            }
            other => self.create(other.resource(), &other.to_json()),
        }
    }

    pub fn list_sellers(&self, query: ListQuery, search: Option<&str>) -> Result<Page<Seller>> {
        self.list(Resource::Sellers, &query.filter_opt("search", search))
    }

    pub fn list_products(
        &self,
        query: ListQuery,
        product_type: Option<ProductType>,
        name: Option<&str>,
    ) -> Result<Page<Product>> {
        let query = query
            .filter_opt("product_type", product_type.map(ProductType::as_str))
            .filter_opt("product_name", name);
        self.list(Resource::Products, &query)
    }

    /// Products priced for `date`, used to pick what goes into new assignments.
    pub fn products_by_date(&self, date: Date, product_type: ProductType) -> Result<Vec<Product>> {
        let query = [
            ("date".to_owned(), format_iso_date(date)),
            ("product_type".to_owned(), product_type.as_str().to_owned()),
        ];
        let listing: Listing<Product> = self
            .get_json("products/by-date/", &query)
            .context("list products by date")?;
        Ok(listing.into_vec())
    }

    pub fn list_assignments(
        &self,
        query: ListQuery,
        start: Option<Date>,
        end: Option<Date>,
    ) -> Result<Page<Assignment>> {
        let query = query.date_opt("start_date", start).date_opt("end_date", end);
        self.list(Resource::Assignments, &query)
    }

    /// Opens today's assignment for every active seller with the given products.
    pub fn create_assignments(&self, input: &AssignmentFormInput) -> Result<Vec<Assignment>> {
        input.validate()?;
        let body = FormPayload::Assignment(input.clone()).to_json();
        info!(products = input.products.len(), "create assignments");
        self.send_json(Method::POST, "assignments/create-assignments/", &body)
            .context("create assignments")
    }

    pub fn list_detail_assignments(&self, query: ListQuery) -> Result<Page<DetailAssignment>> {
        self.list(Resource::DetailAssignments, &query)
    }

    pub fn create_detail_assignment(
        &self,
        assignment: AssignmentId,
        product: ProductId,
        quantity: i64,
    ) -> Result<DetailAssignment> {
        if quantity < 0 {
            bail!("quantity cannot be negative");
        }
        self.create(
            Resource::DetailAssignments,
            &json!({
                "assignment_id": assignment.get(),
                "product_id": product.get(),
                "quantity": quantity,
            }),
        )
    }

    pub fn set_detail_status(
        &self,
        detail: DetailAssignmentId,
        status: DetailStatus,
    ) -> Result<()> {
        self.patch_field(
            Resource::DetailAssignments,
            detail.get(),
            "status",
            json!(status.as_str()),
        )?;
        Ok(())
    }

    pub fn reset_returned(&self, detail: DetailAssignmentId) -> Result<()> {
        self.patch_field(Resource::DetailAssignments, detail.get(), "returned_amount", json!(0))?;
        Ok(())
    }

    pub fn list_devolutions(&self, query: ListQuery) -> Result<Page<Devolution>> {
        self.list(Resource::Devolutions, &query)
    }

    pub fn detail_devolutions(
        &self,
        detail: DetailAssignmentId,
        query: ListQuery,
    ) -> Result<Page<Devolution>> {
        let path = format!("devolutions/detail-assignment-devolutions/{detail}/");
        self.list_at(&path, &query)
    }

    pub fn register_devolution(
        &self,
        detail: DetailAssignmentId,
        quantity: i64,
    ) -> Result<Devolution> {
        if quantity <= 0 {
            bail!("return quantity must be positive");
        }
        let path = format!("devolutions/{detail}/register-devolution/");
        info!(%detail, quantity, "register devolution");
        self.send_json(Method::POST, &path, &json!({"quantity": quantity}))
            .with_context(|| format!("register return for detail {detail}"))
    }

    pub fn delete_devolution(&self, devolution: DevolutionId) -> Result<()> {
        self.delete(Resource::Devolutions, devolution.get())
    }

    pub fn list_finance(
        &self,
        query: ListQuery,
        operation: Option<OperationType>,
        date: Option<Date>,
    ) -> Result<Page<Finance>> {
        let query = query
            .filter_opt("type_operation", operation.map(OperationType::as_str))
            .date_opt("date_finance", date);
        self.list(Resource::Finance, &query)
    }

    pub fn finance_monthly_summary(&self, year: i32, month: u8) -> Result<FinanceSummary> {
        let query = [
            ("year".to_owned(), year.to_string()),
            ("month".to_owned(), month.to_string()),
        ];
        self.get_json("finance/monthly-summary/", &query)
            .context("load monthly finance summary")
    }

    pub fn list_cash(&self, query: ListQuery, filter: CashFilter) -> Result<Page<Cash>> {
        let query = query
            .date_opt("date_cash", filter.date)
            .date_opt("date_from", filter.from)
            .date_opt("date_to", filter.to)
            .filter_opt("type_product", filter.cash_box.map(CashBox::as_str));
        self.list(Resource::Cash, &query)
    }

    pub fn list_yape(
        &self,
        query: ListQuery,
        from: Option<Date>,
        to: Option<Date>,
    ) -> Result<Page<Yape>> {
        let query = query
            .date_opt("date_yape_from", from)
            .date_opt("date_yape_to", to);
        self.list(Resource::Yape, &query)
    }

    /// Report rows for a date range; reports are not paginated.
    pub fn report<T: DeserializeOwned>(
        &self,
        kind: ReportKind,
        start: Date,
        end: Date,
    ) -> Result<Vec<T>> {
        let query = [
            ("start_date".to_owned(), format_iso_date(start)),
            ("end_date".to_owned(), format_iso_date(end)),
        ];
        let listing: Listing<T> = self
            .get_json(kind.path(), &query)
            .with_context(|| format!("load report {}", kind.label()))?;
        Ok(listing.into_vec())
    }
}

/// Endpoints that answer either a bare array or a paginated envelope.
#[derive(Deserialize)]
#[serde(untagged)]
enum Listing<T> {
    Page(Page<T>),
    Rows(Vec<T>),
}

impl<T> Listing<T> {
    fn into_vec(self) -> Vec<T> {
        match self {
            Self::Page(page) => page.results,
            Self::Rows(rows) => rows,
        }
    }
}

fn check(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(clean_error_response(status, &body))
}

fn decode<T: DeserializeOwned>(response: Response, what: &str) -> Result<T, ApiError> {
    let status = response.status();
    let body = response.text().map_err(|error| ApiError::Status {
        status: status.as_u16(),
        message: format!("read body: {error}"),
    })?;
    // DELETE and some PATCH endpoints answer 204 with no body.
    let body = if body.trim().is_empty() { "null" } else { body.as_str() };
    serde_json::from_str(body).map_err(|source| ApiError::Decode {
        what: what.to_owned(),
        source,
    })
}

/// Pulls a readable message out of a REST framework error body:
/// `{"detail": ..}`, `{"message": ..}`, `{"error": ..}` or field errors.
fn clean_error_response(status: StatusCode, body: &str) -> ApiError {
    let code = status.as_u16();
    let message = match serde_json::from_str::<Value>(body) {
        Ok(Value::Object(map)) => ["detail", "message", "error"]
            .iter()
            .find_map(|key| map.get(*key).and_then(Value::as_str).map(str::to_owned))
            .or_else(|| {
                let fields = map
                    .iter()
                    .map(|(field, errors)| match errors {
                        Value::Array(items) => format!(
                            "{field}: {}",
                            items.iter().map(error_text).collect::<Vec<_>>().join(", ")
                        ),
                        other => format!("{field}: {}", error_text(other)),
                    })
                    .collect::<Vec<_>>();
                (!fields.is_empty()).then(|| fields.join("; "))
            }),
        Ok(Value::String(text)) if !text.is_empty() => Some(text),
        _ if body.len() < 100 && !body.contains('<') && !body.trim().is_empty() => {
            Some(body.trim().to_owned())
        }
        _ => None,
    };
    ApiError::Status {
        status: code,
        message: message.unwrap_or_else(|| format!("server returned {code}")),
    }
}

fn error_text(value: &Value) -> String {
    value
        .as_str()
        .map_or_else(|| value.to_string(), str::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{ApiError, ListQuery, clean_error_response, is_session_expired};
    use reqwest::StatusCode;

    #[test]
    fn error_bodies_are_cleaned() {
        let detail = clean_error_response(
            StatusCode::NOT_FOUND,
            r#"{"detail":"No encontrado."}"#,
        );
        assert_eq!(detail.to_string(), "server error (404): No encontrado.");

        let fields = clean_error_response(
            StatusCode::BAD_REQUEST,
            r#"{"dni":["seller with this dni already exists."]}"#,
        );
        assert_eq!(
            fields.to_string(),
            "server error (400): dni: seller with this dni already exists."
        );

        let html = clean_error_response(StatusCode::BAD_GATEWAY, "<html>bad gateway</html>");
        assert_eq!(html.to_string(), "server error (502): server returned 502");
    }

    #[test]
    fn session_expiry_survives_context() {
        let error = anyhow::Error::from(ApiError::SessionExpired).context("list sellers/");
        assert!(is_session_expired(&error));
        assert!(!is_session_expired(&anyhow::anyhow!("other")));
    }

    #[test]
    fn list_query_orders_paging_first() {
        let query = ListQuery::new(2, 20)
            .filter("search", "ana")
            .filter_opt::<&str>("product_type", None);
        assert_eq!(
            query.pairs(),
            vec![
                ("page".to_owned(), "2".to_owned()),
                ("page_size".to_owned(), "20".to_owned()),
                ("search".to_owned(), "ana".to_owned()),
            ]
        );
    }
}
