//! Metas (monthly goals), the period leaderboard and the dashboard.

mod common;

use common::*;
use tower::ServiceExt;

fn current_period() -> String {
    chrono::Utc::now().format("%Y-%m").to_string()
}

// ============ Metas ============

#[tokio::test]
async fn test_upsert_company_meta_replaces_existing() {
    let (_dir, state) = test_state();
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "period": "2025-06",
                "target_value_cents": 500_000,
                "target_deals": 10
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let meta = body_json(response).await;
    assert_eq!(meta["period"], "2025-06");
    assert_eq!(meta["target_value_cents"], 500_000);
    assert!(meta.get("seller_id").is_none());
    let first_id = meta["id"].as_str().unwrap().to_string();

    // Upserting the same period again keeps one row and the new targets
    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "period": "2025-06",
                "target_value_cents": 800_000,
                "target_deals": 12
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .oneshot(authed_request(
            "GET",
            "/metas?period=2025-06",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    let metas = body_json(response).await;
    let items = metas.as_array().unwrap();
    assert_eq!(items.len(), 1);
    assert_eq!(items[0]["id"], first_id.as_str());
    assert_eq!(items[0]["target_value_cents"], 800_000);
    assert_eq!(items[0]["target_deals"], 12);
}

#[tokio::test]
async fn test_upsert_meta_requires_manager() {
    let (_dir, state) = test_state();
    let (company, _owner, _owner_key) = create_test_company(&state, "Vendas Sul");
    let (_seller, seller_key) = add_seller(
        &state,
        &company.id,
        "Ana Lima",
        "ana@vendassul.example",
        SellerRole::Seller,
    );
    let app = company_app(state);

    let response = app
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &seller_key,
            Some(serde_json::json!({
                "period": "2025-06",
                "target_value_cents": 100_000,
                "target_deals": 5
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 403);
}

#[tokio::test]
async fn test_upsert_meta_validation() {
    let (_dir, state) = test_state();
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    // Month 13 does not exist
    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "period": "2025-13",
                "target_value_cents": 100_000,
                "target_deals": 5
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Invalid period, expected YYYY-MM");

    // Negative targets
    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "period": "2025-06",
                "target_value_cents": -1,
                "target_deals": 5
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);

    // Per-seller meta for a seller that does not exist
    let response = app
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "seller_id": "sel_nope",
                "period": "2025-06",
                "target_value_cents": 100_000,
                "target_deals": 5
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Seller not found");
}

#[tokio::test]
async fn test_list_metas_filters_by_period() {
    let (_dir, state) = test_state();
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let (seller, _key) = add_seller(
        &state,
        &company.id,
        "Ana Lima",
        "ana@vendassul.example",
        SellerRole::Seller,
    );
    let app = company_app(state);

    for body in [
        serde_json::json!({ "period": "2025-05", "target_value_cents": 100_000, "target_deals": 2 }),
        serde_json::json!({ "period": "2025-06", "target_value_cents": 200_000, "target_deals": 4 }),
        serde_json::json!({ "seller_id": seller.id, "period": "2025-06", "target_value_cents": 50_000, "target_deals": 1 }),
    ] {
        let response = app
            .clone()
            .oneshot(authed_request("PUT", "/metas", &owner_key, Some(body)))
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/metas", &owner_key, None))
        .await
        .unwrap();
    let all = body_json(response).await;
    assert_eq!(all.as_array().unwrap().len(), 3);

    // Period filter: company-wide meta sorts before per-seller metas
    let response = app
        .oneshot(authed_request(
            "GET",
            "/metas?period=2025-06",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    let june = body_json(response).await;
    let items = june.as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert!(items[0].get("seller_id").is_none());
    assert_eq!(items[1]["seller_id"], seller.id.as_str());
}

#[tokio::test]
async fn test_metas_progress_tracks_won_deals() {
    let (_dir, state) = test_state();
    let (company, owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state.clone());

    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "period": current_period(),
                "target_value_cents": 100_000,
                "target_deals": 2
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    create_won_deal(&state, &company.id, &owner.id, "Contrato A", 60_000);

    // Defaults to the current period
    let response = app
        .clone()
        .oneshot(authed_request("GET", "/metas/progress", &owner_key, None))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let progress = body_json(response).await;
    let entry = &progress.as_array().unwrap()[0];
    assert_eq!(entry["won_deals"], 1);
    assert_eq!(entry["won_value_cents"], 60_000);
    assert_eq!(entry["value_attainment_pct"], 60.0);
    assert_eq!(entry["deals_attainment_pct"], 50.0);
    assert_eq!(entry["hit"], false);

    // A second win pushes the value target over the line
    create_won_deal(&state, &company.id, &owner.id, "Contrato B", 40_000);

    let response = app
        .oneshot(authed_request("GET", "/metas/progress", &owner_key, None))
        .await
        .unwrap();
    let progress = body_json(response).await;
    let entry = &progress.as_array().unwrap()[0];
    assert_eq!(entry["won_value_cents"], 100_000);
    assert_eq!(entry["value_attainment_pct"], 100.0);
    assert_eq!(entry["hit"], true);
}

#[tokio::test]
async fn test_get_meta_scopes_progress_to_its_seller() {
    let (_dir, state) = test_state();
    let (company, owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let (seller, _key) = add_seller(
        &state,
        &company.id,
        "Ana Lima",
        "ana@vendassul.example",
        SellerRole::Seller,
    );
    let app = company_app(state.clone());

    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "seller_id": seller.id,
                "period": current_period(),
                "target_value_cents": 50_000,
                "target_deals": 1
            })),
        ))
        .await
        .unwrap();
    let meta = body_json(response).await;
    let meta_id = meta["id"].as_str().unwrap().to_string();

    // The owner's win must not count toward Ana's meta
    create_won_deal(&state, &company.id, &owner.id, "Contrato do dono", 70_000);
    create_won_deal(&state, &company.id, &seller.id, "Contrato da Ana", 50_000);

    let response = app
        .oneshot(authed_request(
            "GET",
            &format!("/metas/{}", meta_id),
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let progress = body_json(response).await;
    assert_eq!(progress["seller_id"], seller.id.as_str());
    assert_eq!(progress["won_deals"], 1);
    assert_eq!(progress["won_value_cents"], 50_000);
    assert_eq!(progress["hit"], true);
}

#[tokio::test]
async fn test_delete_meta() {
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
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "period": "2025-06",
                "target_value_cents": 100_000,
                "target_deals": 2
            })),
        ))
        .await
        .unwrap();
    let meta = body_json(response).await;
    let meta_id = meta["id"].as_str().unwrap().to_string();

    // Plain sellers cannot delete metas
    let response = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            &format!("/metas/{}", meta_id),
            &seller_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 403);

    let response = app
        .clone()
        .oneshot(authed_request(
            "DELETE",
            &format!("/metas/{}", meta_id),
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["success"], true);

    let response = app
        .oneshot(authed_request(
            "GET",
            &format!("/metas/{}", meta_id),
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body = body_json(response).await;
    assert_eq!(body["details"], "Meta not found");
}

// ============ Rankings ============

#[tokio::test]
async fn test_rankings_require_starter_plan() {
    let (_dir, state) = test_state();
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state.clone());

    let response = app
        .clone()
        .oneshot(authed_request("GET", "/rankings", &owner_key, None))
        .await
        .unwrap();
    assert_eq!(response.status(), 402);
    let body = body_json(response).await;
    assert_eq!(body["error"], "Plan limit reached");
    assert_eq!(body["details"], "Rankings require the Starter plan or higher");

    activate_plan(&state, &company.id, Plan::Starter);

    let response = app
        .oneshot(authed_request("GET", "/rankings", &owner_key, None))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn test_rankings_score_and_order() {
    let (_dir, state) = test_state();
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    activate_plan(&state, &company.id, Plan::Starter);
    let (ana, _) = add_seller(
        &state,
        &company.id,
        "Ana Lima",
        "ana@vendassul.example",
        SellerRole::Seller,
    );
    let (bruno, _) = add_seller(
        &state,
        &company.id,
        "Bruno Costa",
        "bruno@vendassul.example",
        SellerRole::Seller,
    );

    // Ana: two wins totaling R$1.500,00, one completed call, meta hit
    create_won_deal(&state, &company.id, &ana.id, "Contrato A", 100_000);
    create_won_deal(&state, &company.id, &ana.id, "Contrato B", 50_000);
    let call = create_test_agendamento(&state, &company.id, &ana.id, now());
    {
        let conn = state.db.get().unwrap();
        queries::set_agendamento_status(
            &conn,
            &company.id,
            &call.id,
            AgendamentoStatus::Completed,
            false,
        )
        .unwrap();
        queries::upsert_meta(
            &conn,
            &company.id,
            &UpsertMeta {
                seller_id: Some(ana.id.clone()),
                period: current_period(),
                target_value_cents: 150_000,
                target_deals: 2,
            },
        )
        .unwrap();
        // Bruno's meta stays out of reach
        queries::upsert_meta(
            &conn,
            &company.id,
            &UpsertMeta {
                seller_id: Some(bruno.id.clone()),
                period: current_period(),
                target_value_cents: 400_000,
                target_deals: 3,
            },
        )
        .unwrap();
    }

    // Bruno: one big win, no calls
    create_won_deal(&state, &company.id, &bruno.id, "Contrato C", 300_000);

    let app = company_app(state);
    let response = app
        .oneshot(authed_request("GET", "/rankings", &owner_key, None))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["period"], current_period());

    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 3);

    // Ana: 2 * 50 + 150_000 / 10_000 + 1 * 10 + 200
    assert_eq!(entries[0]["rank"], 1);
    assert_eq!(entries[0]["seller_name"], "Ana Lima");
    assert_eq!(entries[0]["points"], 325);
    assert_eq!(entries[0]["won_deals"], 2);
    assert_eq!(entries[0]["won_value_cents"], 150_000);
    assert_eq!(entries[0]["completed_calls"], 1);
    assert_eq!(entries[0]["meta_hit"], true);

    // Bruno: 1 * 50 + 300_000 / 10_000, meta missed
    assert_eq!(entries[1]["rank"], 2);
    assert_eq!(entries[1]["seller_name"], "Bruno Costa");
    assert_eq!(entries[1]["points"], 80);
    assert_eq!(entries[1]["meta_hit"], false);

    // The owner shows up with zeros; no per-seller meta means no bonus
    assert_eq!(entries[2]["rank"], 3);
    assert_eq!(entries[2]["seller_name"], "Vendas Sul Owner");
    assert_eq!(entries[2]["points"], 0);
    assert_eq!(entries[2]["meta_hit"], false);
}

#[tokio::test]
async fn test_rankings_tie_breaks() {
    let (_dir, state) = test_state();
    let (company, _owner, owner_key) = create_test_company(&state, "Empate Ltda");
    activate_plan(&state, &company.id, Plan::Starter);
    let (carla, _) = add_seller(
        &state,
        &company.id,
        "Carla Souza",
        "carla@empate.example",
        SellerRole::Seller,
    );
    let (diego, _) = add_seller(
        &state,
        &company.id,
        "Diego Ramos",
        "diego@empate.example",
        SellerRole::Seller,
    );
    add_seller(
        &state,
        &company.id,
        "Beatriz Nunes",
        "beatriz@empate.example",
        SellerRole::Seller,
    );

    // 51 points each; Carla wins the tie on won value
    create_won_deal(&state, &company.id, &carla.id, "Contrato A", 19_999);
    create_won_deal(&state, &company.id, &diego.id, "Contrato B", 10_000);

    let app = company_app(state);
    let response = app
        .oneshot(authed_request("GET", "/rankings", &owner_key, None))
        .await
        .unwrap();
    let body = body_json(response).await;
    let entries = body["entries"].as_array().unwrap();

    let names: Vec<&str> = entries
        .iter()
        .map(|e| e["seller_name"].as_str().unwrap())
        .collect();
    // Points desc, then won value desc, then name asc for the zero rows
    assert_eq!(
        names,
        vec!["Carla Souza", "Diego Ramos", "Beatriz Nunes", "Empate Ltda Owner"]
    );
    assert_eq!(entries[0]["points"], 51);
    assert_eq!(entries[1]["points"], 51);
    let ranks: Vec<i64> = entries.iter().map(|e| e["rank"].as_i64().unwrap()).collect();
    assert_eq!(ranks, vec![1, 2, 3, 4]);
}

#[tokio::test]
async fn test_rankings_empty_period_lists_every_active_seller() {
    let (_dir, state) = test_state();
    let (company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    activate_plan(&state, &company.id, Plan::Starter);
    add_seller(
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
            "/rankings?period=2020-01",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["period"], "2020-01");
    let entries = body["entries"].as_array().unwrap();
    assert_eq!(entries.len(), 2);
    assert!(entries.iter().all(|e| e["points"] == 0));

    let response = app
        .oneshot(authed_request(
            "GET",
            "/rankings?period=2020-1",
            &owner_key,
            None,
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
}

// ============ Dashboard ============

#[tokio::test]
async fn test_dashboard_on_free_plan_has_empty_podium() {
    let (_dir, state) = test_state();
    let (_company, _owner, owner_key) = create_test_company(&state, "Vendas Sul");
    let app = company_app(state);

    let response = app
        .oneshot(authed_request("GET", "/dashboard", &owner_key, None))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;
    assert_eq!(body["period"], current_period());
    assert_eq!(body["effective_plan"], "free");
    assert!(body.get("subscription_status").is_none());
    assert!(body.get("company_meta").is_none());
    assert_eq!(body["won_deals"], 0);
    assert_eq!(body["upcoming_calls"], 0);
    assert_eq!(body["pipeline"]["stages"].as_array().unwrap().len(), 6);
    assert_eq!(body["top_sellers"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_dashboard_aggregates_the_month() {
    let (_dir, state) = test_state();
    let (company, owner, owner_key) = create_test_company(&state, "Vendas Sul");
    activate_plan(&state, &company.id, Plan::Starter);
    let (ana, _) = add_seller(
        &state,
        &company.id,
        "Ana Lima",
        "ana@vendassul.example",
        SellerRole::Seller,
    );
    add_seller(
        &state,
        &company.id,
        "Bruno Costa",
        "bruno@vendassul.example",
        SellerRole::Seller,
    );
    add_seller(
        &state,
        &company.id,
        "Carla Souza",
        "carla@vendassul.example",
        SellerRole::Seller,
    );

    create_won_deal(&state, &company.id, &ana.id, "Contrato A", 150_000);
    create_test_deal(&state, &company.id, &owner.id, "Contrato aberto", 80_000);

    // One call tomorrow, one past the seven-day window, one already done
    create_test_agendamento(&state, &company.id, &ana.id, now() + 86_400);
    create_test_agendamento(&state, &company.id, &ana.id, now() + 10 * 86_400);
    let done = create_test_agendamento(&state, &company.id, &ana.id, now() + 3_600);
    {
        let conn = state.db.get().unwrap();
        queries::set_agendamento_status(
            &conn,
            &company.id,
            &done.id,
            AgendamentoStatus::Completed,
            false,
        )
        .unwrap();
    }

    let app = company_app(state);
    let response = app
        .clone()
        .oneshot(authed_request(
            "PUT",
            "/metas",
            &owner_key,
            Some(serde_json::json!({
                "period": current_period(),
                "target_value_cents": 300_000,
                "target_deals": 2
            })),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);

    let response = app
        .oneshot(authed_request("GET", "/dashboard", &owner_key, None))
        .await
        .unwrap();
    assert_eq!(response.status(), 200);
    let body = body_json(response).await;

    assert_eq!(body["effective_plan"], "starter");
    assert_eq!(body["subscription_status"], "active");
    assert_eq!(body["won_deals"], 1);
    assert_eq!(body["won_value_cents"], 150_000);
    assert_eq!(body["upcoming_calls"], 1);
    assert_eq!(body["pipeline"]["open_count"], 1);
    assert_eq!(body["pipeline"]["open_value_cents"], 80_000);

    let company_meta = &body["company_meta"];
    assert_eq!(company_meta["value_attainment_pct"], 50.0);
    assert_eq!(company_meta["hit"], false);

    // Podium keeps the top three of four active sellers
    let top = body["top_sellers"].as_array().unwrap();
    assert_eq!(top.len(), 3);
    assert_eq!(top[0]["seller_id"], ana.id.as_str());
    assert_eq!(top[0]["rank"], 1);
}
