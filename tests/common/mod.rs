#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::{
    body::{self, Body},
    http::{Method, Request, StatusCode},
    response::Response,
    Router,
};
use chrono::Utc;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use sea_orm::{ActiveModelTrait, Set};
use serde_json::Value;
use storefront_api::{
    auth::{AuthConfig, AuthService, ROLE_ADMIN},
    config::AppConfig,
    db,
    entities::{product, user},
    events::{self, EventSender},
    notifications::{NotificationGateway, OrderSummary},
    services::{
        orders::{OrderService, OrderSettings},
        payments::{PaymentProvider, PaymentProviderError, ProviderOrder, ProviderOrderRequest},
    },
    AppState,
};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

pub const JWT_SECRET: &str = "integration_test_secret_with_32_plus_chars";
pub const PAYMENT_SECRET: &str = "test_key_secret";

/// Payment provider stand-in that records requests and can be told to fail.
#[derive(Default)]
pub struct FakeProvider {
    fail: AtomicBool,
    counter: AtomicUsize,
    requests: Mutex<Vec<ProviderOrderRequest>>,
}

impl FakeProvider {
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn requests(&self) -> Vec<ProviderOrderRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl PaymentProvider for FakeProvider {
    async fn create_order(
        &self,
        request: ProviderOrderRequest,
    ) -> Result<ProviderOrder, PaymentProviderError> {
        self.requests.lock().unwrap().push(request.clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentProviderError::Rejected {
                status: 502,
                body: "gateway unavailable".into(),
            });
        }

        let n = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(ProviderOrder {
            id: format!("order_fake{n:04}"),
            amount: request.amount_subunits,
            currency: request.currency,
            receipt: Some(request.receipt),
            status: Some("created".into()),
        })
    }
}

/// Mailer that records cancellation notices instead of sending them.
pub struct RecordingMailer {
    deliver: AtomicBool,
    cancellations: Mutex<Vec<(String, String, OrderSummary)>>,
}

impl Default for RecordingMailer {
    fn default() -> Self {
        Self {
            deliver: AtomicBool::new(true),
            cancellations: Mutex::new(Vec::new()),
        }
    }
}

impl RecordingMailer {
    pub fn set_delivering(&self, deliver: bool) {
        self.deliver.store(deliver, Ordering::SeqCst);
    }

    pub fn cancellations(&self) -> Vec<(String, String, OrderSummary)> {
        self.cancellations.lock().unwrap().clone()
    }
}

#[async_trait]
impl NotificationGateway for RecordingMailer {
    async fn send_verification_email(&self, _to: &str, _name: &str, _otp: &str) -> bool {
        self.deliver.load(Ordering::SeqCst)
    }

    async fn send_cancellation_email(&self, to: &str, name: &str, order: &OrderSummary) -> bool {
        self.cancellations
            .lock()
            .unwrap()
            .push((to.to_string(), name.to_string(), order.clone()));
        self.deliver.load(Ordering::SeqCst)
    }
}

pub struct SeededUser {
    pub id: Uuid,
    pub email: String,
    pub token: String,
}

/// Application harness backed by an in-memory SQLite database.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    pub provider: Arc<FakeProvider>,
    pub mailer: Arc<RecordingMailer>,
    pub customer: SeededUser,
    pub other_customer: SeededUser,
    pub admin: SeededUser,
    pub lamp: product::Model,
    pub rug: product::Model,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new("sqlite::memory:".to_string(), JWT_SECRET.to_string());
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        cfg.razorpay_key_id = Some("rzp_test_key".to_string());
        cfg.razorpay_key_secret = Some(PAYMENT_SECRET.to_string());

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");
        let db_arc = Arc::new(pool);

        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let provider = Arc::new(FakeProvider::default());
        let mailer = Arc::new(RecordingMailer::default());

        let orders = OrderService::new(
            db_arc.clone(),
            provider.clone(),
            mailer.clone(),
            OrderSettings {
                payment_secret: cfg.payment_secret(),
                currency: cfg.payment_currency.clone(),
                provider_timeout: Duration::from_secs(2),
                notification_timeout: Duration::from_secs(2),
            },
        )
        .with_events(event_sender);

        let auth = Arc::new(AuthService::new(AuthConfig::from(&cfg)));

        let state = AppState {
            db: db_arc,
            config: cfg,
            auth: auth.clone(),
            orders: Arc::new(orders),
        };

        let customer = seed_user(&state, &auth, "Asha Rao", "asha@example.com", vec![]).await;
        let other_customer =
            seed_user(&state, &auth, "Ravi Iyer", "ravi@example.com", vec![]).await;
        let admin = seed_user(
            &state,
            &auth,
            "Store Admin",
            "admin@example.com",
            vec![ROLE_ADMIN.to_string()],
        )
        .await;

        let lamp = seed_product(&state, "Brass Lamp", dec!(499.00)).await;
        let rug = seed_product(&state, "Cotton Rug", dec!(250.50)).await;

        let router = storefront_api::app_router(state.clone());

        Self {
            router,
            state,
            provider,
            mailer,
            customer,
            other_customer,
            admin,
            lamp,
            rug,
            _event_task: event_task,
        }
    }

    /// Send a request against the router with an optional bearer token.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        if let Some(tok) = token {
            builder = builder.header("authorization", format!("Bearer {}", tok));
        }

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("failed to serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("failed to build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }

    /// Request and decode the JSON body.
    pub async fn call(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let response = self.request(method, uri, body, token).await;
        let status = response.status();
        (status, response_json(response).await)
    }

    /// Place an order for the default customer and return its JSON view.
    pub async fn place_order(&self, items: Value, payment_method: &str) -> Value {
        let (status, body) = self
            .call(
                Method::POST,
                "/api/order/place",
                Some(order_payload(items, payment_method)),
                Some(&self.customer.token),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "unexpected body: {body}");
        body["data"].clone()
    }

    pub async fn fetch_order(&self, order_id: &str) -> (StatusCode, Value) {
        self.call(
            Method::GET,
            &format!("/api/order/{order_id}"),
            None,
            Some(&self.admin.token),
        )
        .await
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        self._event_task.abort();
    }
}

async fn seed_user(
    state: &AppState,
    auth: &AuthService,
    name: &str,
    email: &str,
    roles: Vec<String>,
) -> SeededUser {
    let id = Uuid::new_v4();
    user::ActiveModel {
        id: Set(id),
        name: Set(name.to_string()),
        email: Set(email.to_string()),
        created_at: Set(Utc::now()),
    }
    .insert(&*state.db)
    .await
    .expect("seed user");

    let token = auth
        .issue_token(id, Some(name.to_string()), Some(email.to_string()), roles)
        .expect("issue token");

    SeededUser {
        id,
        email: email.to_string(),
        token,
    }
}

async fn seed_product(state: &AppState, name: &str, price: Decimal) -> product::Model {
    product::ActiveModel {
        id: Set(Uuid::new_v4()),
        name: Set(name.to_string()),
        description: Set(Some(format!("{name} for integration tests"))),
        price: Set(price),
        images: Set(serde_json::json!([format!("{}.png", name.to_lowercase().replace(' ', "-"))])),
        created_at: Set(Utc::now()),
    }
    .insert(&*state.db)
    .await
    .expect("seed product")
}

pub fn order_payload(items: Value, payment_method: &str) -> Value {
    serde_json::json!({
        "items": items,
        "address": {
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "asha@example.com",
            "street": "12 MG Road",
            "city": "Pune",
            "state": "Maharashtra",
            "zipcode": "411001",
            "country": "India",
            "phone": "+919876543210"
        },
        "paymentMethod": payment_method
    })
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Decimals are serialized as strings.
pub fn decimal(value: &Value) -> Decimal {
    value
        .as_str()
        .and_then(|s| s.parse().ok())
        .unwrap_or_else(|| panic!("expected decimal string, got {value}"))
}
