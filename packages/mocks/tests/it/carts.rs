use color_eyre::Result;
use mocks::Upstream;
use pretty_assertions::assert_eq as pretty_assert_eq;
use serde_json::{Value, json};

use crate::server;

#[test_log::test(tokio::test)]
async fn cart_links_to_items() -> Result<()> {
    let server = server(Upstream::Carts)?;
    let response = server.get("/carts/42").await;
    response.assert_status_ok();
    pretty_assert_eq!(
        response.header("content-type").to_str()?,
        "application/hal+json"
    );
    let cart = response.json::<Value>();
    pretty_assert_eq!(cart["id"], "42");
    pretty_assert_eq!(cart["_links"]["items"]["href"], "http://carts/carts/42/items");
    Ok(())
}

#[test_log::test(tokio::test)]
async fn items_are_plain_json() -> Result<()> {
    let server = server(Upstream::Carts)?;
    let response = server.get("/carts/42/items").await;
    response.assert_status_ok();
    pretty_assert_eq!(
        response.header("content-type").to_str()?,
        "application/json"
    );
    response.assert_json(&json!([{
        "id": "42",
        "quantity": 10,
        "unitPrice": 1.99,
        "itemId": "abc123",
    }]));
    Ok(())
}
