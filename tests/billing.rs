//! Checkout, subscription lookup and cancellation against a mocked
//! Mercado Pago API.

mod common;

use common::*;
use tower::ServiceExt;

#[tokio::test]
async fn test_checkout_is_owner_only() {
    let (_dir, state) = test_state();
    let (company, _owner, _owner_key) = create_test_company(&state, "Vendas Sul");
    let (_manager, manager_key) = add_seller(
        &state,
        &company.id,
        "Marcos Dias",
        "marcos@vendassul.example",
        SellerRole::Manager,
    );
    let app = company_app(state);

    let response = app
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &manager_key,
            Some(serde_json::json!({ "plan": "starter" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Requires the owner role");
}

#[tokio::test]
async fn test_checkout_rejects_the_free_plan() {
    let (_dir, state) = test_state();
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    let response = app
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &owner_key,
            Some(serde_json::json!({ "plan": "free" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = body_json(response).await;
    assert_eq!(body["details"], "The free plan cannot be purchased");
}

#[tokio::test]
async fn test_checkout_without_billing_configured() {
    let (_dir, state) = test_state();
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    let response = app
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &owner_key,
            Some(serde_json::json!({ "plan": "starter" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 503);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Billing is not configured");
}

#[tokio::test]
async fn test_checkout_creates_a_pending_subscription() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, mut state) = test_state();
    attach_mercadopago(&mut state, &server.url());
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    let mock = server
        .mock("POST", "/preapproval")
        .match_header("authorization", "Bearer TEST-access-token")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "pre_123",
                "status": "pending",
                "init_point": "https://mp.example/checkout/pre_123"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &owner_key,
            Some(serde_json::json!({ "plan": "starter" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["init_point"], "https://mp.example/checkout/pre_123");
    assert_eq!(body["preapproval_id"], "pre_123");
    mock.assert_async().await;

    // Pending grants nothing yet
    let response = app
        .oneshot(authed_request(
            "GET",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let view = body_json(response).await;
    assert_eq!(view["subscription"]["status"], "pending");
    assert_eq!(view["subscription"]["plan"], "starter");
    assert_eq!(view["subscription"]["mp_preapproval_id"], "pre_123");
    assert_eq!(view["effective_plan"], "free");
}

#[tokio::test]
async fn test_checkout_conflicts_with_a_live_subscription() {
    let server = mockito::Server::new_async().await;
    let (_dir, mut state) = test_state();
    attach_mercadopago(&mut state, &server.url());
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    activate_plan(&state, &company.id, Plan::Starter);
    let app = company_app(state);

    let response = app
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &owner_key,
            Some(serde_json::json!({ "plan": "pro" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body = body_json(response).await;
    assert_eq!(
        body["details"],
        "The company already has a subscription; cancel it first"
    );
}

#[tokio::test]
async fn test_recheckout_replaces_an_abandoned_pending_one() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, mut state) = test_state();
    attach_mercadopago(&mut state, &server.url());
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    server
        .mock("POST", "/preapproval")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "pre_first",
                "status": "pending",
                "init_point": "https://mp.example/checkout/pre_first"
            })
            .to_string(),
        )
        .create_async()
        .await;
    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &owner_key,
            Some(serde_json::json!({ "plan": "starter" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    // Second checkout abandons the first: the stale preapproval gets a
    // best-effort provider cancel and the local row is replaced
    let cancel_mock = server
        .mock("PUT", "/preapproval/pre_first")
        .with_status(200)
        .with_body(serde_json::json!({ "id": "pre_first", "status": "cancelled" }).to_string())
        .create_async()
        .await;
    server
        .mock("POST", "/preapproval")
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": "pre_second",
                "status": "pending",
                "init_point": "https://mp.example/checkout/pre_second"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &owner_key,
            Some(serde_json::json!({ "plan": "pro" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["preapproval_id"], "pre_second");
    cancel_mock.assert_async().await;

    let response = app
        .oneshot(authed_request(
            "GET",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    let view = body_json(response).await;
    assert_eq!(view["subscription"]["mp_preapproval_id"], "pre_second");
    assert_eq!(view["subscription"]["plan"], "pro");
    assert_eq!(view["subscription"]["status"], "pending");
}

#[tokio::test]
async fn test_checkout_without_an_init_point_is_an_upstream_error() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, mut state) = test_state();
    attach_mercadopago(&mut state, &server.url());
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    server
        .mock("POST", "/preapproval")
        .with_status(200)
        .with_body(serde_json::json!({ "id": "pre_x", "status": "pending" }).to_string())
        .create_async()
        .await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "POST",
            "/billing/checkout",
            &owner_key,
            Some(serde_json::json!({ "plan": "starter" })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 502);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Upstream provider error");

    // Nothing was recorded locally
    let response = app
        .oneshot(authed_request(
            "GET",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    let view = body_json(response).await;
    assert!(view.get("subscription").is_none());
}

#[tokio::test]
async fn test_get_subscription_is_owner_only() {
    let (_dir, state) = test_state();
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let (_seller, seller_key) = add_seller(
        &state,
        &company.id,
        "Ana Lima",
        "ana@vendassul.example",
        SellerRole::Seller,
    );
    let app = company_app(state);

    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/billing/subscription",
            &seller_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = app
        .oneshot(authed_request(
            "GET",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let view = body_json(response).await;
    assert!(view.get("subscription").is_none());
    assert_eq!(view["effective_plan"], "free");
}

#[tokio::test]
async fn test_cancel_subscription() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, mut state) = test_state();
    attach_mercadopago(&mut state, &server.url());
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let subscription = activate_plan(&state, &company.id, Plan::Starter);
    let app = company_app(state);

    let cancel_mock = server
        .mock(
            "PUT",
            format!("/preapproval/{}", subscription.mp_preapproval_id).as_str(),
        )
        .with_status(200)
        .with_body(
            serde_json::json!({
                "id": subscription.mp_preapproval_id,
                "status": "cancelled"
            })
            .to_string(),
        )
        .create_async()
        .await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["status"], "cancelled");
    cancel_mock.assert_async().await;

    // No paid time on record, so access degrades immediately
    let response = app
        .clone()
        .oneshot(authed_request(
            "GET",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    let view = body_json(response).await;
    assert_eq!(view["subscription"]["status"], "cancelled");
    assert_eq!(view["effective_plan"], "free");

    let response = app
        .oneshot(authed_request(
            "DELETE",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 409);
    let body = body_json(response).await;
    assert_eq!(body["details"], "The subscription is already cancelled");
}

#[tokio::test]
async fn test_cancel_keeps_local_state_when_the_provider_fails() {
    let mut server = mockito::Server::new_async().await;
    let (_dir, mut state) = test_state();
    attach_mercadopago(&mut state, &server.url());
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let subscription = activate_plan(&state, &company.id, Plan::Starter);
    let app = company_app(state);

    server
        .mock(
            "PUT",
            format!("/preapproval/{}", subscription.mp_preapproval_id).as_str(),
        )
        .with_status(500)
        .with_body("internal error")
        .create_async()
        .await;

    let response = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 502);

    // The owner can retry; nothing was cancelled locally
    let response = app
        .oneshot(authed_request(
            "GET",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    let view = body_json(response).await;
    assert_eq!(view["subscription"]["status"], "active");
    assert_eq!(view["effective_plan"], "starter");
}

#[tokio::test]
async fn test_cancel_without_a_subscription() {
    let server = mockito::Server::new_async().await;
    let (_dir, mut state) = test_state();
    attach_mercadopago(&mut state, &server.url());
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    let response = app
        .oneshot(authed_request(
            "DELETE",
            "/billing/subscription",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body = body_json(response).await;
    assert_eq!(body["details"], "No subscription for this company");
}
