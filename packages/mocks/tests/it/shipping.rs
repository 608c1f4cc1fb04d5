use color_eyre::Result;
use mocks::Upstream;
use serde_json::json;

use crate::server;

#[test_log::test(tokio::test)]
async fn echoes_the_shipment() -> Result<()> {
    let server = server(Upstream::Shipping)?;
    let shipment = json!({
        "id": "57a98d98e4b00679b4a830b2",
        "name": "57a98d98e4b00679b4a830af",
    });
    let response = server.post("/shipping").json(&shipment).await;
    response.assert_status_ok();
    response.assert_json(&shipment);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn rejects_non_json_bodies() -> Result<()> {
    let server = server(Upstream::Shipping)?;
    let response = server
        .post("/shipping")
        .text("not json")
        .expect_failure()
        .await;
    assert!(response.status_code().is_client_error());
    Ok(())
}
