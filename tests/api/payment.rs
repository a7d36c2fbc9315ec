use crate::helpers::spawn_app;
use secrecy::ExposeSecret;
use serde_json::{json, Value};
use uuid::Uuid;

async fn settle_spawned_tasks() {
    tokio::time::sleep(std::time::Duration::from_millis(100)).await;
}

fn payment_field<'a>(body: &'a Value, field: &str) -> &'a Value {
    &body["data"]["payment"][field]
}

fn payment_id(body: &Value) -> Uuid {
    payment_field(body, "id")
        .as_str()
        .and_then(|id| Uuid::parse_str(id).ok())
        .expect("response carried no payment id")
}

fn mpesa_success_payload(checkout_ref: &str) -> Value {
    json!({
        "Body": {
            "stkCallback": {
                "CheckoutRequestID": checkout_ref,
                "ResultCode": 0,
                "ResultDesc": "The service request is processed successfully."
            }
        }
    })
}

#[actix_web::test]
async fn cash_payment_completes_and_marks_the_order_paid() {
    let app = spawn_app().await;
    let customer_id = Uuid::new_v4();
    let order = app.insert_order(customer_id);

    let response = app
        .post_initiate(customer_id, &json!({"orderId": order.id, "method": "cash"}))
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let body: Value = response.json().await.unwrap();
    assert_eq!(payment_field(&body, "status"), "completed");
    assert!(payment_field(&body, "processedAt").is_string());

    settle_spawned_tasks().await;
    assert_eq!(
        app.order_service.mark_paid_calls.lock().unwrap().as_slice(),
        &[order.id]
    );
}

#[actix_web::test]
async fn initiation_without_customer_header_is_rejected() {
    let app = spawn_app().await;
    let order = app.insert_order(Uuid::new_v4());

    let response = app
        .api_client
        .post(format!("{}/payment/initiate", app.address))
        .json(&json!({"orderId": order.id, "method": "cash"}))
        .send()
        .await
        .expect("Failed to execute request.");
    assert_eq!(response.status().as_u16(), 400);
}

#[actix_web::test]
async fn initiation_for_an_unknown_order_is_gone() {
    let app = spawn_app().await;

    let response = app
        .post_initiate(
            Uuid::new_v4(),
            &json!({"orderId": Uuid::new_v4(), "method": "cash"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 410);
}

#[actix_web::test]
async fn second_initiation_for_the_same_order_conflicts() {
    let app = spawn_app().await;
    let customer_id = Uuid::new_v4();
    let order = app.insert_order(customer_id);
    let body = json!({
        "orderId": order.id,
        "method": "mpesa",
        "methodParams": {"phoneNumber": "254712345678"}
    });

    let response = app.post_initiate(customer_id, &body).await;
    assert_eq!(response.status().as_u16(), 201);

    let response = app.post_initiate(customer_id, &body).await;
    assert_eq!(response.status().as_u16(), 409);
}

#[actix_web::test]
async fn mpesa_payment_settles_through_the_webhook() {
    let app = spawn_app().await;
    let customer_id = Uuid::new_v4();
    let order = app.insert_order(customer_id);

    let response = app
        .post_initiate(
            customer_id,
            &json!({
                "orderId": order.id,
                "method": "mpesa",
                "methodParams": {"phoneNumber": "0712345678"}
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(payment_field(&body, "status"), "processing");
    let checkout_ref = payment_field(&body, "providerRef")
        .as_str()
        .expect("no provider ref")
        .to_string();
    let id = payment_id(&body);

    let token = app
        .settings
        .providers
        .mpesa
        .webhook_token
        .expose_secret()
        .to_string();
    let response = app
        .post_webhook("mpesa", Some(&token), &mpesa_success_payload(&checkout_ref))
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.get_status(customer_id, id).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(payment_field(&body, "status"), "completed");

    settle_spawned_tasks().await;
    assert_eq!(
        app.order_service.mark_paid_calls.lock().unwrap().as_slice(),
        &[order.id]
    );

    // A replayed delivery acknowledges without a second settlement.
    let response = app
        .post_webhook("mpesa", Some(&token), &mpesa_success_payload(&checkout_ref))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    settle_spawned_tasks().await;
    assert_eq!(app.order_service.mark_paid_calls.lock().unwrap().len(), 1);
}

#[actix_web::test]
async fn webhook_with_a_bad_token_mutates_nothing() {
    let app = spawn_app().await;
    let customer_id = Uuid::new_v4();
    let order = app.insert_order(customer_id);

    let response = app
        .post_initiate(
            customer_id,
            &json!({
                "orderId": order.id,
                "method": "mpesa",
                "methodParams": {"phoneNumber": "254712345678"}
            }),
        )
        .await;
    let body: Value = response.json().await.unwrap();
    let checkout_ref = payment_field(&body, "providerRef").as_str().unwrap().to_string();
    let id = payment_id(&body);

    let response = app
        .post_webhook(
            "mpesa",
            Some("not-the-token"),
            &mpesa_success_payload(&checkout_ref),
        )
        .await;
    assert_eq!(response.status().as_u16(), 401);

    let response = app.get_status(customer_id, id).await;
    let body: Value = response.json().await.unwrap();
    assert_eq!(payment_field(&body, "status"), "processing");
}

#[actix_web::test]
async fn webhook_for_an_unknown_provider_is_rejected() {
    let app = spawn_app().await;
    let response = app.post_webhook("paypal", None, &json!({})).await;
    assert_eq!(response.status().as_u16(), 400);
}

#[actix_web::test]
async fn unmatched_webhook_is_acknowledged() {
    let app = spawn_app().await;
    let token = app
        .settings
        .providers
        .mpesa
        .webhook_token
        .expose_secret()
        .to_string();
    let response = app
        .post_webhook("mpesa", Some(&token), &mpesa_success_payload("CHK-NOBODY"))
        .await;
    assert_eq!(response.status().as_u16(), 200);
}

#[actix_web::test]
async fn status_is_scoped_to_the_owning_customer() {
    let app = spawn_app().await;
    let customer_id = Uuid::new_v4();
    let order = app.insert_order(customer_id);

    let response = app
        .post_initiate(customer_id, &json!({"orderId": order.id, "method": "cash"}))
        .await;
    let body: Value = response.json().await.unwrap();
    let id = payment_id(&body);

    let response = app.get_status(customer_id, id).await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.get_status(Uuid::new_v4(), id).await;
    assert_eq!(response.status().as_u16(), 410);
}

#[actix_web::test]
async fn bank_transfer_runs_the_confirmation_flow() {
    let app = spawn_app().await;
    let customer_id = Uuid::new_v4();
    let order = app.insert_order(customer_id);

    let response = app
        .post_initiate(
            customer_id,
            &json!({"orderId": order.id, "method": "bank_transfer"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(payment_field(&body, "status"), "pending");
    let reference = payment_field(&body, "providerDetails")["reference"]
        .as_str()
        .expect("no bank reference")
        .to_string();
    assert!(reference.starts_with("ABS-"));
    assert!(body["data"]["providerInstructions"]
        .as_str()
        .unwrap()
        .contains(&reference));
    let id = payment_id(&body);

    let response = app
        .post_confirm_bank_transfer(id, &json!({"reference": "ABS-WRONGREF"}))
        .await;
    assert_eq!(response.status().as_u16(), 400);

    let response = app
        .post_confirm_bank_transfer(
            id,
            &json!({"reference": reference, "evidence": "slip-2024-118"}),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(payment_field(&body, "status"), "pending_verification");

    let response = app
        .post_confirm_bank_transfer(id, &json!({"reference": reference}))
        .await;
    assert_eq!(response.status().as_u16(), 409);
}
