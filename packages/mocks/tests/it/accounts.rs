use color_eyre::Result;
use mocks::Upstream;
use pretty_assertions::assert_eq as pretty_assert_eq;
use serde_json::Value;
use simple_test_case::test_case;

use crate::server;

#[test_log::test(tokio::test)]
async fn customer_is_hal_with_embedded_resources() -> Result<()> {
    let server = server(Upstream::Accounts)?;

    let response = server.get("/customers/57a98d98e4b00679b4a830af").await;
    response.assert_status_ok();
    pretty_assert_eq!(
        response.header("content-type").to_str()?,
        "application/hal+json"
    );

    let customer = response.json::<Value>();
    pretty_assert_eq!(customer["id"], "57a98d98e4b00679b4a830af");
    pretty_assert_eq!(customer["username"], "testymctestface");
    pretty_assert_eq!(
        customer["_links"]["cards"]["href"],
        "http://user/customers/57a98d98e4b00679b4a830af/cards"
    );
    pretty_assert_eq!(
        customer["_embedded"]["address"]["street"],
        "Cleverstreet"
    );
    pretty_assert_eq!(
        customer["_embedded"]["card"]["_links"]["self"]["href"],
        "http://user/cards/57a98d98e4b00679b4a830af"
    );
    Ok(())
}

#[test_case("/addresses/1", "city", "Tinytown"; "address")]
#[test_case("/cards/1", "expires", "12/18"; "card")]
#[tokio::test]
async fn sub_resources(path: &str, field: &str, expected: &str) -> Result<()> {
    let server = server(Upstream::Accounts)?;
    let response = server.get(path).await;
    response.assert_status_ok();
    pretty_assert_eq!(
        response.header("content-type").to_str()?,
        "application/hal+json"
    );
    let body = response.json::<Value>();
    pretty_assert_eq!(body["id"], "1");
    pretty_assert_eq!(body[field], expected);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn repeated_calls_are_byte_identical() -> Result<()> {
    let server = server(Upstream::Accounts)?;
    let first = server.get("/customers/abc").await.as_bytes().clone();
    let second = server.get("/customers/abc").await.as_bytes().clone();
    pretty_assert_eq!(first, second);

    let other = server.get("/customers/xyz").await.as_bytes().clone();
    assert_ne!(first, other);
    Ok(())
}

#[test_log::test(tokio::test)]
async fn unknown_routes_are_not_found() -> Result<()> {
    let server = server(Upstream::Accounts)?;
    server
        .get("/carts/1")
        .expect_failure()
        .await
        .assert_status_not_found();
    server
        .post("/customers/1")
        .expect_failure()
        .await
        .assert_status(axum::http::StatusCode::METHOD_NOT_ALLOWED);
    Ok(())
}
