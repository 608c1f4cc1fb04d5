use color_eyre::Result;
use mocks::Upstream;
use pretty_assertions::assert_eq as pretty_assert_eq;
use serde_json::json;

use crate::server;

#[test_log::test(tokio::test)]
async fn every_payment_is_authorised() -> Result<()> {
    let server = server(Upstream::Payment)?;
    for body in [json!({ "amount": 10.5 }), json!({ "amount": 99999 }), json!({})] {
        let response = server.post("/paymentAuth").json(&body).await;
        response.assert_status_ok();
        pretty_assert_eq!(
            response.header("content-type").to_str()?,
            "application/json"
        );
        response.assert_json(&json!({ "authorised": true }));
    }
    Ok(())
}

#[test_log::test(tokio::test)]
async fn payment_only_accepts_post() -> Result<()> {
    let server = server(Upstream::Payment)?;
    server
        .get("/paymentAuth")
        .expect_failure()
        .await
        .assert_status(axum::http::StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}
