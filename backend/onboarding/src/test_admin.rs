//! Admin console tests: login, review and decisions, driven through the router.

use axum::http::StatusCode;

use crate::db;
use crate::models::AdminStatus;
use crate::test_support::*;

/// Register a user and carry them through the card upload.
async fn user_with_card_upload(app: &TestApp, email: &str) -> String {
    let mut client = app.client();
    client.register(email).await;
    client
        .post_form("/submit_payment_method", &[("payment_method", "card")])
        .await;
    let response = client
        .post_multipart(
            "/upload_card_details",
            CARD_FIELDS,
            &[("recto_photo", "front.png", PNG), ("verso_photo", "back.png", PNG)],
        )
        .await;
    assert_redirect(&response, "/waiting_page");
    app.last_user_id().await
}

async fn admin(app: &TestApp) -> Client {
    let mut client = app.client();
    assert_redirect(&client.login_admin().await, "/admin_dashboard");
    client
}

#[tokio::test]
async fn console_requires_an_admin_session() {
    let app = TestApp::new().await;
    let user_id = user_with_card_upload(&app, "jane@example.com").await;
    let mut client = app.client();

    assert_redirect(&client.get("/admin_dashboard").await, "/admin_login");
    assert_redirect(
        &client.get(&format!("/admin_user_details/{user_id}")).await,
        "/admin_login",
    );
    let response = client
        .post_form(
            &format!("/admin_update_user_status/{user_id}"),
            &[("action", "validate")],
        )
        .await;
    assert_redirect(&response, "/admin_login");

    let record = db::get_user(&app.state.pool, &user_id).await.unwrap().unwrap();
    let photo = record
        .payment_details
        .as_ref()
        .and_then(|d| d.artifacts().first().map(|(_, name)| name.to_string()))
        .unwrap();
    assert_redirect(&client.get(&format!("/uploads/{photo}")).await, "/admin_login");

    // A user session is not an admin session.
    let mut user = app.client();
    user.register("other@example.com").await;
    assert_redirect(&user.get("/admin_dashboard").await, "/admin_login");
}

#[tokio::test]
async fn wrong_credentials_are_refused() {
    let app = TestApp::new().await;
    let mut client = app.client();

    let response = client
        .post_form(
            "/admin_login",
            &[("username", ADMIN_USERNAME), ("password", "guess")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await["code"], "invalid_credentials");

    let response = client
        .post_form("/admin_login", &[("username", "intruder"), ("password", ADMIN_PASSWORD)])
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = client
        .post_form("/admin_login", &[("username", ""), ("password", ADMIN_PASSWORD)])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    assert_redirect(&client.get("/admin_dashboard").await, "/admin_login");
}

#[tokio::test]
async fn dashboard_lists_users_in_registration_order() {
    let app = TestApp::new().await;
    for email in ["first@example.com", "second@example.com", "third@example.com"] {
        app.client().register(email).await;
    }
    let mut client = admin(&app).await;

    let response = client.get("/admin_dashboard").await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["count"], 3);
    let emails: Vec<_> = body["users"]
        .as_array()
        .unwrap()
        .iter()
        .map(|u| u["email"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(emails, ["first@example.com", "second@example.com", "third@example.com"]);
    assert!(body["users"][0]["id"].is_string());
    assert_eq!(body["users"][0]["admin_status"], "pending");
}

#[tokio::test]
async fn details_link_artifacts_the_admin_can_fetch() {
    let app = TestApp::new().await;
    let user_id = user_with_card_upload(&app, "jane@example.com").await;
    let mut client = admin(&app).await;

    let response = client.get(&format!("/admin_user_details/{user_id}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = json(response).await;
    assert_eq!(body["id"], user_id.as_str());
    assert_eq!(body["status"], "card_details_submitted");

    let artifacts = body["artifacts"].as_array().unwrap();
    assert_eq!(artifacts.len(), 2);
    assert_eq!(artifacts[0]["field"], "recto_photo");
    let url = artifacts[0]["url"].as_str().unwrap().to_string();
    assert!(url.starts_with("/uploads/"));

    let response = client.get(&url).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_bytes(response).await, PNG);
}

#[tokio::test]
async fn details_link_complementary_payment_artifacts() {
    let app = TestApp::new().await;
    let mut user = app.client();
    user.register("jane@example.com").await;
    user.post_form("/submit_payment_method", &[("payment_method", "card")])
        .await;
    user.post_multipart(
        "/upload_card_details",
        CARD_FIELDS,
        &[("recto_photo", "front.png", PNG), ("verso_photo", "back.png", PNG)],
    )
    .await;
    let response = user
        .post_multipart(
            "/submit_complementary_payment",
            CARD_FIELDS,
            &[
                ("recto_photo", "front2.png", &b"comp-recto"[..]),
                ("verso_photo", "back2.png", &b"comp-verso"[..]),
            ],
        )
        .await;
    assert_redirect(&response, "/receipt");
    let user_id = app.last_user_id().await;

    let mut client = admin(&app).await;
    let body = json(client.get(&format!("/admin_user_details/{user_id}")).await).await;
    let complementary: Vec<_> = body["artifacts"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["stage"] == "complementary_payment")
        .cloned()
        .collect();
    assert_eq!(complementary.len(), 2);
    assert!(complementary[0]["filename"]
        .as_str()
        .unwrap()
        .contains("_comp_card_recto_"));
    assert!(complementary[1]["filename"]
        .as_str()
        .unwrap()
        .contains("_comp_card_verso_"));

    let recto = client.get(complementary[0]["url"].as_str().unwrap()).await;
    assert_eq!(recto.status(), StatusCode::OK);
    assert_eq!(body_bytes(recto).await, b"comp-recto");
    let verso = client.get(complementary[1]["url"].as_str().unwrap()).await;
    assert_eq!(body_bytes(verso).await, b"comp-verso");
}

#[tokio::test]
async fn details_of_unknown_user_is_not_found() {
    let app = TestApp::new().await;
    let mut client = admin(&app).await;

    let response = client.get("/admin_user_details/nobody").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["code"], "not_found");
}

#[tokio::test]
async fn validation_updates_status_and_tells_the_user() {
    let app = TestApp::new().await;
    let user_id = user_with_card_upload(&app, "jane@example.com").await;
    let mut client = admin(&app).await;

    let response = client
        .post_form(
            &format!("/admin_update_user_status/{user_id}"),
            &[("action", "validate")],
        )
        .await;
    assert_redirect(&response, "/admin_dashboard");

    let record = db::get_user(&app.state.pool, &user_id).await.unwrap().unwrap();
    assert_eq!(record.admin_status, AdminStatus::Validated);

    let sent = app.notifier.sent_to("jane@example.com");
    assert_eq!(sent.len(), 1);
    assert!(sent[0].subject.contains("validated"));
    assert!(sent[0].body.starts_with("Dear Jane,"));
}

#[tokio::test]
async fn rejection_can_follow_validation() {
    let app = TestApp::new().await;
    let user_id = user_with_card_upload(&app, "jane@example.com").await;
    let mut client = admin(&app).await;
    let uri = format!("/admin_update_user_status/{user_id}");

    client.post_form(&uri, &[("action", "validate")]).await;
    client.post_form(&uri, &[("action", "reject")]).await;

    let record = db::get_user(&app.state.pool, &user_id).await.unwrap().unwrap();
    assert_eq!(record.admin_status, AdminStatus::Rejected);
    assert_eq!(app.notifier.sent_to("jane@example.com").len(), 2);
}

#[tokio::test]
async fn decision_for_unknown_user_changes_nothing() {
    let app = TestApp::new().await;
    user_with_card_upload(&app, "jane@example.com").await;
    let before = app.notifier.sent().len();
    let snapshot = serde_json::to_value(db::load(&app.state.pool).await.unwrap()).unwrap();
    let mut client = admin(&app).await;

    let response = client
        .post_form("/admin_update_user_status/ghost", &[("action", "reject")])
        .await;
    assert_redirect(&response, "/admin_dashboard");
    assert_eq!(app.notifier.sent().len(), before);

    let after = serde_json::to_value(db::load(&app.state.pool).await.unwrap()).unwrap();
    assert_eq!(snapshot, after);
    assert_eq!(db::count_users(&app.state.pool).await.unwrap(), 1);
}

#[tokio::test]
async fn unknown_action_is_a_bad_request() {
    let app = TestApp::new().await;
    let user_id = user_with_card_upload(&app, "jane@example.com").await;
    let mut client = admin(&app).await;

    let response = client
        .post_form(
            &format!("/admin_update_user_status/{user_id}"),
            &[("action", "delete")],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let record = db::get_user(&app.state.pool, &user_id).await.unwrap().unwrap();
    assert_eq!(record.admin_status, AdminStatus::Pending);
}

#[tokio::test]
async fn logout_ends_the_admin_session() {
    let app = TestApp::new().await;
    let mut client = admin(&app).await;
    assert_eq!(client.get("/admin_dashboard").await.status(), StatusCode::OK);

    assert_redirect(&client.get("/admin_logout").await, "/admin_login");
    assert_redirect(&client.get("/admin_dashboard").await, "/admin_login");
}
