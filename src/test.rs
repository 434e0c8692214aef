use std::str::FromStr;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use chrono::{Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::{Value, json};
use tower::ServiceExt;

use crate::{
    config::Config,
    db::{DbPool, bootstrap_admin, fetch_by_ids, init_db_pool, quotation_store::ResolvedParty},
    handlers::router,
    models::{
        invoice::{ChargeInput, InvoiceItemInput, NewInvoice},
        quotation::{
            Commodity, CommodityInput, FreightMode, QuotationInput, QuotationStatus, RequestType,
        },
        user::{CreateUser, Role, User},
    },
    error::AppError,
    pricing::DEFAULT_VAT_RATE,
    state::AppState,
};

const PASSWORD: &str = "password123";

fn test_config() -> Config {
    Config {
        server_host: "127.0.0.1".to_string(),
        server_port: 0,
        database_url: "sqlite::memory:".to_string(),
        max_db_connections: 1,
        jwt_secret: "test-secret".to_string(),
        jwt_expiration_hours: 1,
        vat_rate: DEFAULT_VAT_RATE,
        default_currency: "USD".to_string(),
        invoice_due_days: 30,
        notification_scan_minutes: 60,
        max_document_bytes: 1024,
        admin_email: "admin@test.local".to_string(),
        admin_password: Some(PASSWORD.to_string()),
    }
}

struct TestApp {
    state: AppState,
    app: Router,
    pool: DbPool,
}

impl TestApp {
    async fn new() -> Self {
        let config = test_config();
        let pool = init_db_pool(&config.database_url, config.max_db_connections)
            .await
            .unwrap();
        let state = AppState::new(config, pool.clone());
        bootstrap_admin(&state.users, "admin@test.local", Some(PASSWORD))
            .await
            .unwrap();

        let app = router(state.clone());
        Self { state, app, pool }
    }

    async fn user(&self, email: &str, role: Role) -> User {
        let created = self
            .state
            .users
            .create_user(CreateUser {
                name: email.split('@').next().unwrap().to_string(),
                email: email.to_string(),
                role,
                password: Some(PASSWORD.to_string()),
            })
            .await
            .unwrap();
        self.state.users.get_user_by_id(created.user.id).await.unwrap()
    }

    async fn admin(&self) -> User {
        self.state
            .users
            .get_user_by_email("admin@test.local")
            .await
            .unwrap()
            .unwrap()
    }

    fn token(&self, user: &User) -> String {
        self.state.auth.issue_token(user).unwrap().0
    }

    async fn send(
        &self,
        method: &str,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    async fn create_quotation(&self, token: &str, follow_up: Option<NaiveDate>) -> Value {
        let (status, body) = self
            .send(
                "POST",
                "/api/quotations",
                Some(token),
                Some(json!({
                    "client_name": "Kivu Traders",
                    "freight_mode": "air",
                    "request_type": "import",
                    "origin": "Dubai",
                    "destination": "Kigali",
                    "commodities": [
                        { "name": "Electronics", "quantity_kg": "100", "buy_rate": "5", "client_rate": "8" }
                    ],
                    "follow_up_date": follow_up,
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        body
    }
}

fn decimal(value: &Value) -> Decimal {
    Decimal::from_str(value.as_str().unwrap()).unwrap()
}

#[tokio::test]
async fn login_returns_working_token() {
    let app = TestApp::new().await;

    let (status, body) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "ADMIN@test.local", "password": PASSWORD })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["role"], "admin");
    assert!(body["user"].get("password_hash").is_none());

    let token = body["token"].as_str().unwrap();
    let (status, me) = app.send("GET", "/api/auth/me", Some(token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], "admin@test.local");
}

#[tokio::test]
async fn wrong_password_and_missing_token_are_unauthorized() {
    let app = TestApp::new().await;

    let (status, _) = app
        .send(
            "POST",
            "/api/auth/login",
            None,
            Some(json!({ "email": "admin@test.local", "password": "nope-nope" })),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, body) = app.send("GET", "/api/quotations", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn inactive_user_token_is_rejected() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let token = app.token(&agent);
    let admin_token = app.token(&app.admin().await);

    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/users/{}", agent.id),
            Some(&admin_token),
            Some(json!({ "status": "inactive" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app.send("GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn admin_creates_users_with_generated_passwords() {
    let app = TestApp::new().await;
    let admin_token = app.token(&app.admin().await);

    let (status, body) = app
        .send(
            "POST",
            "/api/users/bulk",
            Some(&admin_token),
            Some(json!({ "users": [
                { "name": "Finance", "email": "finance@test.local", "role": "finance_officer" },
                { "name": "Partner", "email": "partner@test.local", "role": "partner" }
            ]})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    let created = body.as_array().unwrap();
    assert_eq!(created.len(), 2);
    assert_eq!(created[0]["generated_password"].as_str().unwrap().len(), 16);

    let (status, _) = app
        .send(
            "POST",
            "/api/users",
            Some(&admin_token),
            Some(json!({ "name": "Dup", "email": "finance@test.local", "role": "sales_agent" })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let (status, _) = app.send("GET", "/api/users", Some(&app.token(&agent)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn quotation_totals_are_computed() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;

    let quotation = app.create_quotation(&app.token(&agent), None).await;

    assert_eq!(quotation["status"], "pending");
    assert_eq!(quotation["currency"], "USD");
    assert!(quotation["reference"].as_str().unwrap().starts_with("QT-"));
    assert_eq!(decimal(&quotation["buy_rate"]), dec!(500));
    assert_eq!(decimal(&quotation["client_quote"]), dec!(800));
    assert_eq!(decimal(&quotation["profit"]), dec!(300));
    assert_eq!(decimal(&quotation["profit_percentage"]), dec!(60));
    assert_eq!(quotation["quote_sent_by"], agent.id);
    assert_eq!(quotation["commodities"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn quotation_without_commodities_is_rejected() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;

    let (status, _) = app
        .send(
            "POST",
            "/api/quotations",
            Some(&app.token(&agent)),
            Some(json!({
                "client_name": "Kivu Traders",
                "freight_mode": "sea",
                "request_type": "export",
                "origin": "Mombasa",
                "destination": "Antwerp",
                "commodities": []
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let finance = app.user("finance@test.local", Role::FinanceOfficer).await;
    let (status, _) = app
        .send(
            "POST",
            "/api/quotations",
            Some(&app.token(&finance)),
            Some(json!({
                "client_name": "Kivu Traders",
                "freight_mode": "sea",
                "request_type": "export",
                "origin": "Mombasa",
                "destination": "Antwerp",
                "commodities": [{ "name": "Tea", "quantity_kg": 10, "buy_rate": 1, "client_rate": 2 }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn only_admin_decides_and_decisions_are_final() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let agent_token = app.token(&agent);
    let admin_token = app.token(&app.admin().await);

    let quotation = app.create_quotation(&agent_token, None).await;
    let id = quotation["id"].as_i64().unwrap();
    let approve = format!("/api/quotations/{}/approve", id);

    let (status, _) = app.send("POST", &approve, Some(&agent_token), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send("POST", &approve, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "won");
    assert_eq!(body["approved_by_name"], "Administrator");
    assert!(body["approved_at"].is_string());

    let (status, _) = app.send("POST", &approve, Some(&admin_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/quotations/{}", id),
            Some(&agent_token),
            Some(json!({
                "client_name": "Kivu Traders",
                "freight_mode": "air",
                "request_type": "import",
                "origin": "Dubai",
                "destination": "Kigali",
                "commodities": [{ "name": "Electronics", "quantity_kg": "1", "buy_rate": "1", "client_rate": "1" }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn rejection_needs_a_reason() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let admin_token = app.token(&app.admin().await);
    let quotation = app.create_quotation(&app.token(&agent), None).await;
    let reject = format!("/api/quotations/{}/reject", quotation["id"]);

    let (status, _) = app
        .send("POST", &reject, Some(&admin_token), Some(json!({ "reason": "  too low " })))
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = app
        .send(
            "POST",
            &reject,
            Some(&admin_token),
            Some(json!({ "reason": "  client chose another carrier " })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "lost");
    assert_eq!(body["rejection_reason"], "client chose another carrier");
}

#[tokio::test]
async fn pending_quotation_edit_recomputes_totals() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let other = app.user("other@test.local", Role::SalesAgent).await;
    let quotation = app.create_quotation(&app.token(&agent), None).await;
    let uri = format!("/api/quotations/{}", quotation["id"]);
    let edit = json!({
        "client_name": "Kivu Traders",
        "freight_mode": "road",
        "request_type": "transit",
        "origin": "Dar es Salaam",
        "destination": "Kigali",
        "currency": "eur",
        "commodities": [
            { "name": "Cement", "quantity_kg": "200", "buy_rate": "2", "client_rate": "2.5" },
            { "name": "Steel", "quantity_kg": "50", "buy_rate": "0", "client_rate": "1" }
        ]
    });

    let (status, _) = app
        .send("PUT", &uri, Some(&app.token(&other)), Some(edit.clone()))
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, body) = app.send("PUT", &uri, Some(&app.token(&agent)), Some(edit)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currency"], "EUR");
    assert_eq!(decimal(&body["buy_rate"]), dec!(400));
    assert_eq!(decimal(&body["client_quote"]), dec!(550));
    assert_eq!(decimal(&body["profit_percentage"]), dec!(37.5));
    assert_eq!(body["commodities"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn agents_only_see_their_own_quotations() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let other = app.user("other@test.local", Role::SalesAgent).await;
    let director = app.user("director@test.local", Role::SalesDirector).await;

    let mine = app.create_quotation(&app.token(&agent), None).await;
    let theirs = app.create_quotation(&app.token(&other), None).await;

    let (_, list) = app.send("GET", "/api/quotations", Some(&app.token(&agent)), None).await;
    let ids: Vec<_> = list.as_array().unwrap().iter().map(|q| q["id"].clone()).collect();
    assert_eq!(ids, vec![mine["id"].clone()]);

    let (status, _) = app
        .send(
            "GET",
            &format!("/api/quotations/{}", theirs["id"]),
            Some(&app.token(&agent)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, list) = app
        .send("GET", "/api/quotations?status=pending", Some(&app.token(&director)), None)
        .await;
    assert_eq!(list.as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn won_quotation_converts_into_one_invoice() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let finance = app.user("finance@test.local", Role::FinanceOfficer).await;
    let finance_token = app.token(&finance);
    let admin_token = app.token(&app.admin().await);

    let quotation = app.create_quotation(&app.token(&agent), None).await;
    let id = quotation["id"].as_i64().unwrap();
    let convert = format!("/api/quotations/{}/invoice", id);

    let (status, _) = app.send("POST", &convert, Some(&finance_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT, "pending quotations cannot be invoiced");

    app.send("POST", &format!("/api/quotations/{}/approve", id), Some(&admin_token), None)
        .await;

    let (status, invoice) = app.send("POST", &convert, Some(&finance_token), None).await;
    assert_eq!(status, StatusCode::CREATED, "{}", invoice);
    assert!(invoice["invoice_number"].as_str().unwrap().starts_with("INV-"));
    assert_eq!(invoice["quotation_id"], id);
    assert_eq!(invoice["salesperson_id"], agent.id);
    assert_eq!(decimal(&invoice["subtotal"]), dec!(800));
    assert_eq!(decimal(&invoice["tva"]), dec!(144));
    assert_eq!(decimal(&invoice["total"]), dec!(944));
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["items"][0]["charges"][0]["description"], "Freight charge");

    let issue = NaiveDate::from_str(invoice["issue_date"].as_str().unwrap()).unwrap();
    let due = NaiveDate::from_str(invoice["due_date"].as_str().unwrap()).unwrap();
    assert_eq!(due - issue, Duration::days(30));

    let (status, _) = app.send("POST", &convert, Some(&finance_token), None).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = app
        .send("DELETE", &format!("/api/quotations/{}", id), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn unique_index_blocks_second_invoice_for_quotation() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let input = QuotationInput {
        client_id: None,
        client_name: Some("Kivu Traders".to_string()),
        freight_mode: FreightMode::Rail,
        request_type: RequestType::Import,
        origin: "A".to_string(),
        destination: "B".to_string(),
        currency: None,
        commodities: vec![CommodityInput {
            name: "Coffee".to_string(),
            quantity_kg: dec!(10),
            buy_rate: dec!(1),
            client_rate: dec!(2),
        }],
        follow_up_date: None,
        remarks: None,
    };
    let party = ResolvedParty {
        client_id: None,
        client_name: "Kivu Traders".to_string(),
        currency: "USD".to_string(),
    };
    let quotation = app.state.quotations.create(&input, &party, &agent).await.unwrap();

    let new = NewInvoice {
        quotation_id: Some(quotation.id),
        client_id: None,
        client_name: "Kivu Traders".to_string(),
        client_address: None,
        client_contact: None,
        client_tin: None,
        salesperson_id: agent.id,
        salesperson_name: agent.name.clone(),
        currency: "USD".to_string(),
        items: vec![InvoiceItemInput {
            commodity: "Coffee".to_string(),
            quantity: dec!(10),
            charges: vec![ChargeInput {
                description: "Freight".to_string(),
                rate: dec!(2),
            }],
        }],
        issue_date: Utc::now().date_naive(),
        due_date: Utc::now().date_naive(),
        validity_date: None,
        remarks: None,
    };

    app.state.invoices.create(&new, DEFAULT_VAT_RATE).await.unwrap();
    let second = app.state.invoices.create(&new, DEFAULT_VAT_RATE).await;
    assert!(matches!(second, Err(AppError::Conflict(_))));
}

#[tokio::test]
async fn invoice_status_changes_and_paid_is_final() {
    let app = TestApp::new().await;
    let finance = app.user("finance@test.local", Role::FinanceOfficer).await;
    let token = app.token(&finance);

    let (status, invoice) = app
        .send(
            "POST",
            "/api/invoices",
            Some(&token),
            Some(json!({
                "client_name": "Lake Shipping",
                "items": [
                    { "commodity": "Handling", "quantity": "3", "charges": [
                        { "description": "Labour", "rate": "100" },
                        { "description": "Storage", "rate": "150" }
                    ]}
                ],
                "issue_date": "2026-01-01",
                "due_date": "2026-01-31"
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", invoice);
    assert_eq!(decimal(&invoice["subtotal"]), dec!(750));
    assert_eq!(decimal(&invoice["tva"]), dec!(135));
    assert_eq!(decimal(&invoice["total"]), dec!(885));
    assert_eq!(invoice["status"], "pending");
    assert_eq!(invoice["effective_status"], "overdue");

    let uri = format!("/api/invoices/{}/status", invoice["id"]);
    let (status, paid) = app
        .send("PUT", &uri, Some(&token), Some(json!({ "status": "paid" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paid["status"], "paid");
    assert!(paid["paid_at"].is_string());

    let (status, _) = app
        .send("PUT", &uri, Some(&token), Some(json!({ "status": "pending" })))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn partners_cannot_see_invoices() {
    let app = TestApp::new().await;
    let partner = app.user("partner@test.local", Role::Partner).await;

    let (status, _) = app.send("GET", "/api/invoices", Some(&app.token(&partner)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app.send("GET", "/api/clients", Some(&app.token(&partner)), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn financial_report_groups_by_currency() {
    let app = TestApp::new().await;
    let director = app.user("director@test.local", Role::SalesDirector).await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    app.create_quotation(&app.token(&agent), None).await;

    let (status, report) = app
        .send("GET", "/api/reports/financial", Some(&app.token(&director)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let usd = &report["currencies"][0];
    assert_eq!(usd["currency"], "USD");
    assert_eq!(usd["quotations"]["pending"], 1);
    assert_eq!(decimal(&usd["quotations"]["total_profit"]), dec!(300));

    let (status, _) = app
        .send("GET", "/api/reports/financial", Some(&app.token(&agent)), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = app
        .send(
            "GET",
            "/api/reports/financial?from=2026-03-10&to=2026-03-01",
            Some(&app.token(&director)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn csv_export_has_header_and_rows() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    app.create_quotation(&app.token(&agent), None).await;

    let request = Request::builder()
        .uri("/api/reports/quotations.csv")
        .header(header::AUTHORIZATION, format!("Bearer {}", app.token(&app.admin().await)))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers()[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));

    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let csv = String::from_utf8(bytes.to_vec()).unwrap();
    let lines: Vec<_> = csv.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("reference,"));
    assert!(lines[1].contains("500.00,800.00,300.00,60.00,pending"));
}

#[tokio::test]
async fn notification_scan_is_idempotent() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let yesterday = Utc::now().date_naive() - Duration::days(1);
    app.create_quotation(&app.token(&agent), Some(yesterday)).await;

    let first = app.state.notifier.scan(Utc::now()).await.unwrap();
    // follow-up, daily digest, weekly summary
    assert_eq!(first, 3);
    assert_eq!(app.state.notifier.scan(Utc::now()).await.unwrap(), 0);

    let (status, list) = app
        .send("GET", "/api/notifications?unread_only=true", Some(&app.token(&agent)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    let list = list.as_array().unwrap();
    assert_eq!(list.len(), 1);
    assert_eq!(list[0]["kind"], "follow_up_due");

    let (status, read) = app
        .send(
            "POST",
            &format!("/api/notifications/{}/read", list[0]["id"]),
            Some(&app.token(&agent)),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(read["read_at"].is_string());

    // The submission notification went to the admins
    let admin_token = app.token(&app.admin().await);
    let (_, list) = app.send("GET", "/api/notifications", Some(&admin_token), None).await;
    let kinds: Vec<_> = list.as_array().unwrap().iter().map(|n| n["kind"].clone()).collect();
    assert!(kinds.contains(&json!("quotation_submitted")));
    assert!(kinds.contains(&json!("daily_pending_digest")));

    let (_, marked) = app
        .send("POST", "/api/notifications/read-all", Some(&admin_token), None)
        .await;
    assert_eq!(marked["updated"], 2);
}

#[tokio::test]
async fn decision_notifies_the_quoting_user() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let quotation = app.create_quotation(&app.token(&agent), None).await;

    app.send(
        "POST",
        &format!("/api/quotations/{}/approve", quotation["id"]),
        Some(&app.token(&app.admin().await)),
        None,
    )
    .await;

    let notifications = app
        .state
        .notifications
        .list_for(agent.id, agent.role, true)
        .await
        .unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(
        notifications[0].dedup_key,
        format!("quotation-decided:{}", quotation["id"])
    );
}

#[tokio::test]
async fn documents_round_trip_and_respect_size_limit() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let token = app.token(&agent);

    let request = Request::builder()
        .method("POST")
        .uri("/api/documents?file_name=booking.pdf")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .header(header::CONTENT_TYPE, "application/pdf")
        .body(Body::from(&b"%PDF-1.4 booking"[..]))
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let document: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(document["size_bytes"], 16);
    assert_eq!(document["uploaded_by"], agent.id);

    let request = Request::builder()
        .uri(format!("/api/documents/{}/content", document["id"]))
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::empty())
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CONTENT_TYPE], "application/pdf");
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&bytes[..], b"%PDF-1.4 booking");

    let request = Request::builder()
        .method("POST")
        .uri("/api/documents?file_name=huge.bin")
        .header(header::AUTHORIZATION, format!("Bearer {}", token))
        .body(Body::from(vec![0u8; 2048]))
        .unwrap();
    let response = app.app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);

    let (status, _) = app
        .send(
            "POST",
            "/api/documents?file_name=x.pdf&quotation_id=999",
            Some(&token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn quotation_store_rejects_deciding_twice() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let quotation = app.create_quotation(&app.token(&agent), None).await;
    let id = quotation["id"].as_i64().unwrap();

    let lost = app
        .state
        .quotations
        .decide(id, QuotationStatus::Lost, &admin, Some("client went silent"))
        .await
        .unwrap();
    assert_eq!(lost.approved_by, Some(admin.id));

    let again = app.state.quotations.decide(id, QuotationStatus::Won, &admin, None).await;
    assert!(again.is_err());
    assert_eq!(
        app.state.invoices.list_unpaid().await.unwrap().len(),
        0,
        "deciding never creates invoices"
    );
}

#[tokio::test]
async fn documents_follow_quotation_and_invoice_visibility() {
    let app = TestApp::new().await;
    let finance = app.user("finance@test.local", Role::FinanceOfficer).await;
    let owner = app.user("owner@test.local", Role::SalesAgent).await;
    let other = app.user("other@test.local", Role::SalesAgent).await;
    let partner = app.user("partner@test.local", Role::Partner).await;
    let (finance_token, owner_token) = (app.token(&finance), app.token(&owner));
    let (other_token, partner_token) = (app.token(&other), app.token(&partner));

    let (status, invoice) = app
        .send(
            "POST",
            "/api/invoices",
            Some(&finance_token),
            Some(json!({
                "client_name": "Lake Shipping",
                "items": [{ "commodity": "Handling", "quantity": "1", "charges": [
                    { "description": "Labour", "rate": "100" }
                ]}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{}", invoice);
    let (status, invoice_doc) = app
        .send(
            "POST",
            &format!("/api/documents?file_name=receipt.json&invoice_id={}", invoice["id"]),
            Some(&finance_token),
            Some(json!({ "paid": false })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let quotation = app.create_quotation(&owner_token, None).await;
    let (status, quotation_doc) = app
        .send(
            "POST",
            &format!("/api/documents?file_name=booking.json&quotation_id={}", quotation["id"]),
            Some(&owner_token),
            Some(json!({ "booking": 1 })),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, _) = app
        .send("GET", &format!("/api/invoices/{}", invoice["id"]), Some(&partner_token), None)
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    for uri in [
        format!("/api/documents/{}", invoice_doc["id"]),
        format!("/api/documents/{}/content", invoice_doc["id"]),
    ] {
        let (status, _) = app.send("GET", &uri, Some(&partner_token), None).await;
        assert_eq!(status, StatusCode::FORBIDDEN, "{}", uri);
    }

    let (status, _) = app
        .send(
            "GET",
            &format!("/api/documents/{}/content", quotation_doc["id"]),
            Some(&other_token),
            None,
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = app
        .send(
            "POST",
            &format!("/api/documents?file_name=x.json&quotation_id={}", quotation["id"]),
            Some(&other_token),
            Some(json!({})),
        )
        .await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let ids = |list: &Value| -> Vec<Value> {
        list.as_array().unwrap().iter().map(|d| d["id"].clone()).collect()
    };
    let (_, list) = app.send("GET", "/api/documents", Some(&partner_token), None).await;
    assert!(ids(&list).is_empty());
    let (_, list) = app.send("GET", "/api/documents", Some(&other_token), None).await;
    assert!(ids(&list).is_empty());
    let (_, list) = app.send("GET", "/api/documents", Some(&owner_token), None).await;
    assert_eq!(ids(&list), vec![quotation_doc["id"].clone()]);
    let (_, list) = app.send("GET", "/api/documents", Some(&finance_token), None).await;
    assert_eq!(ids(&list).len(), 2);
}

#[tokio::test]
async fn oversized_amounts_are_rejected() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let finance = app.user("finance@test.local", Role::FinanceOfficer).await;

    let (status, body) = app
        .send(
            "POST",
            "/api/quotations",
            Some(&app.token(&agent)),
            Some(json!({
                "client_name": "Kivu Traders",
                "freight_mode": "air",
                "request_type": "import",
                "origin": "Dubai",
                "destination": "Kigali",
                "commodities": [{
                    "name": "Electronics",
                    "quantity_kg": "79228162514264337593543950335",
                    "buy_rate": "2",
                    "client_rate": "3"
                }]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{}", body);

    let (status, _) = app
        .send(
            "POST",
            "/api/invoices",
            Some(&app.token(&finance)),
            Some(json!({
                "client_name": "Lake Shipping",
                "items": [{ "commodity": "Handling", "quantity": "1000000000001", "charges": [
                    { "description": "Labour", "rate": "999999999999" }
                ]}]
            })),
        )
        .await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    // Still serving after the rejected requests
    let quotation = app.create_quotation(&app.token(&agent), None).await;
    assert_eq!(decimal(&quotation["profit"]), dec!(300));
}

#[tokio::test]
async fn deleting_a_user_with_quotations_asks_to_deactivate() {
    let app = TestApp::new().await;
    let admin_token = app.token(&app.admin().await);
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    app.create_quotation(&app.token(&agent), None).await;

    let (status, body) = app
        .send("DELETE", &format!("/api/users/{}", agent.id), Some(&admin_token), None)
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["error"].as_str().unwrap().contains("deactivate instead"));

    let (status, _) = app
        .send(
            "PUT",
            &format!("/api/users/{}", agent.id),
            Some(&admin_token),
            Some(json!({ "status": "inactive" })),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn admin_cannot_change_own_role() {
    let app = TestApp::new().await;
    let admin = app.admin().await;
    let uri = format!("/api/users/{}", admin.id);
    let token = app.token(&admin);

    let (status, _) = app
        .send("PUT", &uri, Some(&token), Some(json!({ "role": "sales_agent" })))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, user) = app
        .send("PUT", &uri, Some(&token), Some(json!({ "role": "admin", "name": "Root" })))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(user["role"], "admin");
}

#[tokio::test]
async fn weekly_summary_reports_the_previous_week() {
    let app = TestApp::new().await;
    let director = app.user("director@test.local", Role::SalesDirector).await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let quotation = app.create_quotation(&app.token(&agent), None).await;
    app.send(
        "POST",
        &format!("/api/quotations/{}/approve", quotation["id"]),
        Some(&app.token(&app.admin().await)),
        None,
    )
    .await;

    let now = Utc::now();
    app.state.notifier.scan(now).await.unwrap();
    app.state.notifier.scan(now + Duration::days(7)).await.unwrap();

    let (_, list) = app
        .send("GET", "/api/notifications", Some(&app.token(&director)), None)
        .await;
    let mut messages: Vec<_> = list
        .as_array()
        .unwrap()
        .iter()
        .filter(|n| n["kind"] == "weekly_summary")
        .map(|n| n["message"].as_str().unwrap().to_string())
        .collect();
    messages.sort();
    assert_eq!(
        messages,
        vec![
            "Last week: 0 won, 0 lost, 0 still pending",
            "Last week: 1 won, 0 lost, 0 still pending",
        ]
    );
}

#[tokio::test]
async fn child_rows_load_past_the_bound_parameter_limit() {
    let app = TestApp::new().await;
    let agent = app.user("agent@test.local", Role::SalesAgent).await;
    let first = app.create_quotation(&app.token(&agent), None).await;
    let second = app.create_quotation(&app.token(&agent), None).await;

    let mut ids: Vec<i64> = (1000..2200).collect();
    ids.push(second["id"].as_i64().unwrap());
    ids.insert(0, first["id"].as_i64().unwrap());

    let commodities: Vec<Commodity> = fetch_by_ids(
        &app.pool,
        "SELECT * FROM quotation_commodities WHERE quotation_id IN (",
        &ids,
        "quotation_id, position",
    )
    .await
    .unwrap();
    let owners: Vec<i64> = commodities.iter().map(|c| c.quotation_id).collect();
    assert_eq!(owners, vec![first["id"].as_i64().unwrap(), second["id"].as_i64().unwrap()]);

    let (status, list) = app
        .send("GET", "/api/quotations", Some(&app.token(&agent)), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(list.as_array().unwrap().iter().all(|q| q["commodities"].as_array().unwrap().len() == 1));
}
