//! Canned payloads for the simulated upstreams.
//!
//! Every function here is a pure function of its path parameter, so a route
//! answers byte-identical JSON for the same request.

use serde_json::{Value, json};

use crate::Upstream;

fn href(upstream: Upstream, path: &str) -> Value {
    json!({ "href": format!("http://{}{path}", upstream.hostname()) })
}

/// `GET /customers/{id}`: a customer with its address and card embedded.
pub fn customer(id: &str) -> Value {
    let this = href(Upstream::Accounts, &format!("/customers/{id}"));
    json!({
        "id": id,
        "firstName": "Test",
        "lastName": "Test",
        "username": "testymctestface",
        "_links": {
            "self": this,
            "customer": this,
            "addresses": href(Upstream::Accounts, &format!("/customers/{id}/addresses")),
            "cards": href(Upstream::Accounts, &format!("/customers/{id}/cards")),
        },
        "_embedded": {
            "address": address(id),
            "card": card(id),
        },
    })
}

/// `GET /addresses/{id}`
pub fn address(id: &str) -> Value {
    let this = href(Upstream::Accounts, &format!("/addresses/{id}"));
    json!({
        "id": id,
        "number": "12",
        "street": "Cleverstreet",
        "city": "Tinytown",
        "postcode": "1923eq",
        "country": "Cambodia",
        "_links": { "self": this, "address": this },
    })
}

/// `GET /cards/{id}`
pub fn card(id: &str) -> Value {
    let this = href(Upstream::Accounts, &format!("/cards/{id}"));
    json!({
        "id": id,
        "longNum": "23232*****2131",
        "expires": "12/18",
        "ccv": "940",
        "_links": { "self": this, "card": this },
    })
}

/// `GET /carts/{id}`
pub fn cart(id: &str) -> Value {
    json!({
        "id": id,
        "_links": {
            "self": href(Upstream::Carts, &format!("/carts/{id}")),
            "items": href(Upstream::Carts, &format!("/carts/{id}/items")),
        },
    })
}

/// `GET /carts/{id}/items`
pub fn cart_items(id: &str) -> Value {
    json!([{
        "id": id,
        "quantity": 10,
        "unitPrice": 1.99,
        "itemId": "abc123",
    }])
}

/// `POST /paymentAuth`: every payment is approved.
pub fn payment_authorised() -> Value {
    json!({ "authorised": true })
}
