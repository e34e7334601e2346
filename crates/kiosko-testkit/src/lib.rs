// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result, anyhow};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use kiosko_app::{Assignment, Product, Seller};
use serde_json::{Value, json};
use std::io::Read;
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tiny_http::{Header, Response, Server};

const FIRST_NAMES: [&str; 12] = [
    "Ana", "Luis", "Rosa", "Jorge", "Carmen", "Pedro", "Lucía", "Miguel", "Elena", "Raúl",
    "Sofía", "Víctor",
];
const LAST_NAMES: [&str; 12] = [
    "Quispe", "Mamani", "Flores", "Rojas", "Huamán", "Torres", "Chávez", "Ramos", "Vargas",
    "Castillo", "Mendoza", "Paredes",
];
const NEWSPAPERS: [&str; 6] = ["El Comercio", "Ojo", "Perú21", "Gestión", "Trome", "Depor"];
const PRODUCTS: [&str; 5] = [
    "Álbum Mundial",
    "Figuritas",
    "Revista Somos",
    "Crucigramas",
    "Libro Escolar",
];

#[derive(Debug, Clone)]
struct DeterministicRng {
    state: u64,
}

impl DeterministicRng {
    fn new(seed: u64) -> Self {
        let mut state = seed ^ 0x9E37_79B9_7F4A_7C15;
        if state == 0 {
            state = 0xA409_3822_299F_31D0;
        }
        Self { state }
    }

    fn next_u64(&mut self) -> u64 {
        self.state = self
            .state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        let mut x = self.state;
        x ^= x >> 13;
        x ^= x << 7;
        x ^= x >> 17;
        x
    }

    fn int_n(&mut self, n: usize) -> usize {
        if n <= 1 {
            return 0;
        }
        (self.next_u64() % (n as u64)) as usize
    }

    fn range(&mut self, low: i64, high: i64) -> i64 {
        low + self.int_n((high - low + 1).max(1) as usize) as i64
    }
}

/// Deterministic sellers, products and assignments shaped like backend JSON.
#[derive(Debug, Clone)]
pub struct DistributionFaker {
    rng: DeterministicRng,
    next_id: i64,
}

impl DistributionFaker {
    pub fn new(seed: u64) -> Self {
        Self {
            rng: DeterministicRng::new(seed.max(1)),
            next_id: 1,
        }
    }

    fn id(&mut self) -> i64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    fn pick<'a>(&mut self, values: &[&'a str]) -> &'a str {
        values[self.rng.int_n(values.len())]
    }

    pub fn seller_json(&mut self) -> Value {
        let id = self.id();
        json!({
            "id": id,
            "number_seller": format!("V-{id:03}"),
            "name": self.pick(&FIRST_NAMES),
            "last_name": self.pick(&LAST_NAMES),
            "dni": format!("{:08}", self.rng.range(10_000_000, 79_999_999)),
            "phone": format!("9{:08}", self.rng.range(0, 99_999_999)),
            "status": true,
        })
    }

    pub fn newspaper_json(&mut self) -> Value {
        let id = self.id();
        let weekday = format!("{:.2}", self.rng.range(8, 15) as f64 / 10.0);
        let sunday = format!("{:.2}", self.rng.range(25, 45) as f64 / 10.0);
        json!({
            "id": id,
            "name": self.pick(&NEWSPAPERS),
            "type": "NEWSPAPER",
            "returns_date": 1,
            "monday_price": weekday,
            "tuesday_price": weekday,
            "wednesday_price": weekday,
            "thursday_price": weekday,
            "friday_price": weekday,
            "saturday_price": weekday,
            "sunday_price": sunday,
            "product_price": null,
            "status_product": true,
        })
    }

    pub fn product_json(&mut self) -> Value {
        let id = self.id();
        json!({
            "id": id,
            "name": self.pick(&PRODUCTS),
            "type": "PRODUCT",
            "returns_date": self.rng.range(0, 7),
            "product_price": format!("{:.2}", self.rng.range(10, 200) as f64 / 10.0),
            "status_product": true,
        })
    }

    /// An assignment for `seller` with one detail per product.
    pub fn assignment_json(&mut self, seller: &Value, products: &[Value], date: &str) -> Value {
        let id = self.id();
        let details = products
            .iter()
            .map(|product| {
                let quantity = self.rng.range(5, 40);
                let returned = self.rng.range(0, quantity);
                let unit_price = product
                    .get("monday_price")
                    .filter(|price| !price.is_null())
                    .or_else(|| product.get("product_price"))
                    .cloned()
                    .unwrap_or(Value::Null);
                json!({
                    "id": self.id(),
                    "product": product,
                    "quantity": quantity,
                    "returned_amount": returned,
                    "return_date": null,
                    "unit_price": unit_price,
                    "status": "PENDING",
                })
            })
            .collect::<Vec<_>>();
        json!({
            "id": id,
            "seller": seller,
            "date_assignment": date,
            "detail_assignments": details,
        })
    }
}

pub fn sample_sellers(count: usize) -> Vec<Value> {
    let mut faker = DistributionFaker::new(7);
    (0..count).map(|_| faker.seller_json()).collect()
}

pub fn sample_assignment() -> Value {
    let mut faker = DistributionFaker::new(11);
    let seller = faker.seller_json();
    let products = vec![faker.newspaper_json(), faker.product_json()];
    faker.assignment_json(&seller, &products, "2025-02-03")
}

pub fn typed_seller(value: &Value) -> Result<Seller> {
    serde_json::from_value(value.clone()).context("decode fixture seller")
}

pub fn typed_product(value: &Value) -> Result<Product> {
    serde_json::from_value(value.clone()).context("decode fixture product")
}

pub fn typed_assignment(value: &Value) -> Result<Assignment> {
    serde_json::from_value(value.clone()).context("decode fixture assignment")
}

/// DRF-style paginated envelope.
pub fn page_json(count: usize, results: Vec<Value>) -> Value {
    json!({"count": count, "next": null, "previous": null, "results": results})
}

/// Unsigned JWT carrying `user_id`, good enough for client-side decoding.
pub fn fake_jwt(user_id: i64, nonce: &str) -> String {
    let header = URL_SAFE_NO_PAD.encode(r#"{"alg":"HS256","typ":"JWT"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        json!({"token_type": "access", "user_id": user_id, "jti": nonce}).to_string(),
    );
    format!("{header}.{payload}.signature")
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedRequest {
    pub method: String,
    pub url: String,
    pub authorization: Option<String>,
    pub body: String,
}

impl RecordedRequest {
    pub fn path(&self) -> &str {
        self.url.split_once('?').map_or(&self.url, |(path, _)| path)
    }

    pub fn query(&self) -> &str {
        self.url.split_once('?').map_or("", |(_, query)| query)
    }

    pub fn json(&self) -> Result<Value> {
        serde_json::from_str(&self.body).context("decode recorded request body")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockResponse {
    pub status: u16,
    pub body: String,
}

impl MockResponse {
    pub fn json(status: u16, body: Value) -> Self {
        Self {
            status,
            body: body.to_string(),
        }
    }

    pub fn ok(body: Value) -> Self {
        Self::json(200, body)
    }

    pub fn empty(status: u16) -> Self {
        Self {
            status,
            body: String::new(),
        }
    }
}

/// Scripted HTTP backend on a background thread. Answers up to `expected`
/// requests through `handler`, then stops.
pub struct MockBackend {
    base_url: String,
    handle: Option<JoinHandle<()>>,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
}

impl MockBackend {
    pub fn start<F>(expected: usize, mut handler: F) -> Result<Self>
    where
        F: FnMut(&RecordedRequest) -> MockResponse + Send + 'static,
    {
        let server =
            Server::http("127.0.0.1:0").map_err(|error| anyhow!("start mock server: {error}"))?;
        let base_url = format!("http://{}/api/v1/", server.server_addr());
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);

        let handle = thread::spawn(move || {
            for _ in 0..expected {
                let mut request = match server.recv_timeout(Duration::from_secs(5)) {
                    Ok(Some(request)) => request,
                    _ => break,
                };
                let mut body = String::new();
                let _ = request.as_reader().read_to_string(&mut body);
                let record = RecordedRequest {
                    method: request.method().as_str().to_owned(),
                    url: request.url().to_owned(),
                    authorization: request
                        .headers()
                        .iter()
                        .find(|header| header.field.equiv("Authorization"))
                        .map(|header| header.value.as_str().to_owned()),
                    body,
                };
                let reply = handler(&record);
                recorded
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(record);
                let mut response = Response::from_string(reply.body).with_status_code(reply.status);
                if let Ok(header) = Header::from_bytes("Content-Type", "application/json") {
                    response = response.with_header(header);
                }
                let _ = request.respond(response);
            }
        });

        Ok(Self {
            base_url,
            handle: Some(handle),
            requests,
        })
    }

    /// Base URL including the `/api/v1/` prefix.
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Waits for the server thread and returns every request it saw.
    pub fn finish(mut self) -> Vec<RecordedRequest> {
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
