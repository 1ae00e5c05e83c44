mod common;

use common::spawn_app;

#[tokio::test]
async fn health_check_works() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/health_check"))
        .send()
        .await
        .expect("Failed to execute request");

    assert!(response.status().is_success());
    assert_eq!(Some(0), response.content_length());
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let app = spawn_app().await;

    let response = app
        .client
        .get(app.url("/health_check"))
        .header("x-request-id", "client-42")
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(response.headers()["x-request-id"], "client-42");

    // rejected requests too
    let response = app
        .client
        .get(app.url("/auth/me"))
        .send()
        .await
        .expect("Failed to execute request");
    assert_eq!(401, response.status().as_u16());
    assert!(response.headers().contains_key("x-request-id"));
}
