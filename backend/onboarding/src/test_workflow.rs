//! End-to-end tests of the user-facing flow, driven through the router.

use axum::http::StatusCode;

use crate::db;
use crate::models::{AdminStatus, PaymentDetails, PaymentMethod, WorkflowStatus};
use crate::test_support::*;
use crate::workflow::RECEIPT_CODE_LEN;

async fn registered(app: &TestApp, email: &str) -> (Client, String) {
    let mut client = app.client();
    let response = client.register(email).await;
    assert_redirect(&response, "/payment_choice");
    let user_id = app.last_user_id().await;
    (client, user_id)
}

async fn status_of(app: &TestApp, user_id: &str) -> WorkflowStatus {
    db::get_user(&app.state.pool, user_id)
        .await
        .unwrap()
        .unwrap()
        .status
}

#[tokio::test]
async fn card_flow_runs_to_completion() {
    let app = TestApp::new().await;
    let (mut client, user_id) = registered(&app, "jane@example.com").await;

    let page = json(client.get("/payment_choice").await).await;
    assert_eq!(page["currency"], "EUR");

    let response = client
        .post_form("/submit_payment_method", &[("payment_method", "card")])
        .await;
    assert_redirect(&response, "/dynamic_form_card");

    let response = client
        .post_multipart(
            "/upload_card_details",
            CARD_FIELDS,
            &[("recto_photo", "front.png", PNG), ("verso_photo", "back.jpg", PNG)],
        )
        .await;
    assert_redirect(&response, "/waiting_page");

    let waiting = json(client.get("/waiting_page").await).await;
    assert_eq!(waiting["status"], "card_details_submitted");

    let form = json(client.get("/complementary_payment").await).await;
    assert_eq!(form["payment_method"], "card");

    let response = client
        .post_multipart(
            "/submit_complementary_payment",
            CARD_FIELDS,
            &[("recto_photo", "front2.png", PNG), ("verso_photo", "back2.png", PNG)],
        )
        .await;
    assert_redirect(&response, "/receipt");

    let receipt = client.get("/receipt").await;
    assert_eq!(receipt.status(), StatusCode::OK);
    let receipt = json(receipt).await;
    let code = receipt["unique_code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), RECEIPT_CODE_LEN);
    assert!(code
        .chars()
        .all(|c| c.is_ascii_digit() || c.is_ascii_uppercase()));
    assert_eq!(receipt["payment_amount"], "50");
    assert_eq!(receipt["first_name"], "Jane");

    assert_redirect(&client.post_form("/submit_receipt", &[]).await, "/crypto_payment");

    let crypto = json(client.get("/crypto_payment").await).await;
    assert_eq!(crypto["ton_address"], "EQ-test-wallet");

    let response = client
        .post_multipart("/submit_crypto_payment", &[], &[("crypto_proof", "tx.pdf", &b"%PDF"[..])])
        .await;
    assert_redirect(&response, "/final_validation");

    let response = client
        .post_multipart("/submit_final_validation", FINAL_FIELDS, &[])
        .await;
    assert_redirect(&response, "/confirmation");

    let done = json(client.get("/confirmation").await).await;
    assert_eq!(done["status"], "final_validation_submitted");

    let record = db::get_user(&app.state.pool, &user_id).await.unwrap().unwrap();
    assert_eq!(record.status, WorkflowStatus::FinalValidationSubmitted);
    assert_eq!(record.admin_status, AdminStatus::Pending);
    assert_eq!(record.receipt_code.as_deref(), Some(code.as_str()));
    assert!(record.complementary_payment_confirmed);
    // Earlier steps survive later ones.
    assert!(matches!(record.payment_details, Some(PaymentDetails::Card(_))));
    assert!(record.crypto_payment_proof.is_some());
    assert_eq!(
        record.final_validation_details.as_ref().map(|d| d.final_photo.is_none()),
        Some(true)
    );

    // Four card photos plus the crypto proof, and no leftover partial files.
    let files = app.stored_files();
    assert_eq!(files.len(), 5);
    assert!(files
        .iter()
        .all(|p| !p.file_name().unwrap().to_string_lossy().starts_with('.')));
}

#[tokio::test]
async fn ticket_flow_stores_ticket_details() {
    let app = TestApp::new().await;
    let (mut client, user_id) = registered(&app, "luc@example.com").await;

    let response = client
        .post_form("/submit_payment_method", &[("payment_method", "ticket")])
        .await;
    assert_redirect(&response, "/dynamic_form_ticket");

    let response = client
        .post_multipart(
            "/upload_ticket_details",
            TICKET_FIELDS,
            &[("ticket_photo", "ticket.webp", PNG)],
        )
        .await;
    assert_redirect(&response, "/waiting_page");
    assert_eq!(status_of(&app, &user_id).await, WorkflowStatus::TicketDetailsSubmitted);

    let response = client
        .post_multipart(
            "/submit_complementary_payment",
            TICKET_FIELDS,
            &[("ticket_photo", "ticket2.jpg", PNG)],
        )
        .await;
    assert_redirect(&response, "/receipt");

    let record = db::get_user(&app.state.pool, &user_id).await.unwrap().unwrap();
    assert_eq!(record.payment_method, Some(PaymentMethod::Ticket));
    match &record.payment_details {
        Some(PaymentDetails::Ticket(ticket)) => {
            assert_eq!(ticket.code, "PCS-0001");
            assert!(ticket.ticket_photo.as_deref().unwrap().contains("_ticket_"));
        }
        other => panic!("expected ticket details, got {other:?}"),
    }
    match &record.complementary_payment_details {
        Some(PaymentDetails::Ticket(ticket)) => {
            assert!(ticket.ticket_photo.as_deref().unwrap().contains("_comp_ticket_"));
        }
        other => panic!("expected complementary ticket details, got {other:?}"),
    }
}

#[tokio::test]
async fn pages_without_a_session_redirect_to_registration() {
    let app = TestApp::new().await;
    let mut client = app.client();

    for uri in ["/payment_choice", "/dynamic_form_card", "/waiting_page", "/receipt", "/confirmation"] {
        assert_redirect(&client.get(uri).await, "/");
    }
    let response = client
        .post_form("/submit_payment_method", &[("payment_method", "card")])
        .await;
    assert_redirect(&response, "/");
}

#[tokio::test]
async fn stale_session_is_reported_then_cleared() {
    let app = TestApp::new().await;
    let (mut client, _) = registered(&app, "gone@example.com").await;

    db::save(&app.state.pool, &[]).await.unwrap();

    let response = client.get("/payment_choice").await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(json(response).await["code"], "session_invalid");

    assert_redirect(&client.get("/payment_choice").await, "/");
}

#[tokio::test]
async fn out_of_order_upload_is_rejected_without_storing() {
    let app = TestApp::new().await;
    let (mut client, user_id) = registered(&app, "hasty@example.com").await;

    let response = client
        .post_multipart(
            "/upload_card_details",
            CARD_FIELDS,
            &[("recto_photo", "front.png", PNG), ("verso_photo", "back.png", PNG)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(json(response).await["code"], "out_of_order");

    assert!(app.stored_files().is_empty());
    assert_eq!(status_of(&app, &user_id).await, WorkflowStatus::Registered);

    let response = client.get("/receipt").await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
}

#[tokio::test]
async fn upload_for_the_other_method_conflicts() {
    let app = TestApp::new().await;
    let (mut client, _) = registered(&app, "mixed@example.com").await;
    client
        .post_form("/submit_payment_method", &[("payment_method", "ticket")])
        .await;

    let response = client
        .post_multipart(
            "/upload_card_details",
            CARD_FIELDS,
            &[("recto_photo", "front.png", PNG), ("verso_photo", "back.png", PNG)],
        )
        .await;
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(app.stored_files().is_empty());
}

#[tokio::test]
async fn invalid_registration_is_a_bad_request() {
    let app = TestApp::new().await;
    let mut client = app.client();

    let response = client.register("not-an-email").await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await;
    assert_eq!(body["code"], "invalid_request");
    assert_eq!(body["field"], "email");

    assert_eq!(db::count_users(&app.state.pool).await.unwrap(), 0);
    assert!(app.notifier.sent().is_empty());
}

#[tokio::test]
async fn card_upload_requires_both_accepted_photos() {
    let app = TestApp::new().await;
    let (mut client, user_id) = registered(&app, "photos@example.com").await;
    client
        .post_form("/submit_payment_method", &[("payment_method", "card")])
        .await;

    let response = client
        .post_multipart("/upload_card_details", CARD_FIELDS, &[("recto_photo", "front.png", PNG)])
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["field"], "verso_photo");

    let response = client
        .post_multipart(
            "/upload_card_details",
            CARD_FIELDS,
            &[("recto_photo", "front.png", PNG), ("verso_photo", "back.exe", &b"MZ"[..])],
        )
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await["field"], "verso_photo");

    assert!(app.stored_files().is_empty());
    assert_eq!(status_of(&app, &user_id).await, WorkflowStatus::PaymentMethodChosen);
}

#[tokio::test]
async fn receipt_code_is_stable_across_views() {
    let app = TestApp::new().await;
    let (mut client, user_id) = registered(&app, "stable@example.com").await;
    client
        .post_form("/submit_payment_method", &[("payment_method", "ticket")])
        .await;
    for uri in ["/upload_ticket_details", "/submit_complementary_payment"] {
        client
            .post_multipart(uri, TICKET_FIELDS, &[("ticket_photo", "t.jpg", PNG)])
            .await;
    }

    let first = json(client.get("/receipt").await).await["unique_code"].clone();
    let second = json(client.get("/receipt").await).await["unique_code"].clone();
    assert_eq!(first, second);
    assert_eq!(status_of(&app, &user_id).await, WorkflowStatus::ReceiptGenerated);

    client.post_form("/submit_receipt", &[]).await;
    let third = json(client.get("/receipt").await).await["unique_code"].clone();
    assert_eq!(first, third);
    // Viewing the receipt again never moves the status back.
    assert_eq!(status_of(&app, &user_id).await, WorkflowStatus::ReceiptSubmitted);
}

#[tokio::test]
async fn each_registration_gets_its_own_id() {
    let app = TestApp::new().await;
    let (_, first) = registered(&app, "same@example.com").await;
    let (_, second) = registered(&app, "same@example.com").await;
    assert_ne!(first, second);
    assert_eq!(db::count_users(&app.state.pool).await.unwrap(), 2);
}

#[tokio::test]
async fn administrator_hears_about_each_step() {
    let app = TestApp::new().await;
    let (mut client, _) = registered(&app, "loud@example.com").await;
    client
        .post_form("/submit_payment_method", &[("payment_method", "card")])
        .await;

    let subjects: Vec<_> = app
        .notifier
        .sent_to(ADMIN_EMAIL)
        .into_iter()
        .map(|s| s.subject)
        .collect();
    assert_eq!(subjects, ["New registration", "Payment method selected"]);
    assert!(app.notifier.sent_to(ADMIN_EMAIL)[1]
        .body
        .contains("loud@example.com"));
}
