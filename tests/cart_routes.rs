mod common;

use std::sync::Arc;

use axum::{
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
    response::Response,
};
use common::{NewProduct, create_product, create_variant, seed_lookups, setup_state};
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::{Value, json};
use storefront_api::{entity::Guests, routes::create_app, state::AppState};
use tower::ServiceExt;

async fn call(state: &AppState, request: Request<Body>) -> anyhow::Result<(Response, Value)> {
    let response = create_app(state.clone()).oneshot(request).await?;
    let (parts, body) = response.into_parts();
    let bytes = to_bytes(body, usize::MAX).await?;
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((Response::from_parts(parts, Body::empty()), value))
}

fn set_cookie(response: &Response) -> Option<String> {
    response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|value| value.to_str().ok())
        .map(str::to_string)
}

fn json_post(uri: &str, cookie: Option<&str>, body: String) -> anyhow::Result<Request<Body>> {
    let mut builder = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    Ok(builder.body(Body::from(body))?)
}

// Guest cookies over HTTP: minted on errors too, never on count, cleared on merge.
#[tokio::test]
async fn guest_cookie_lifecycle_over_http() -> anyhow::Result<()> {
    let Some(database_url) = common::database_url() else {
        return Ok(());
    };
    let state = setup_state(&database_url, Arc::new(common::FakePayments::default())).await?;
    let l = seed_lookups(&state).await?;
    let runner = create_product(
        &state,
        NewProduct {
            name: "Runner",
            gender_id: l.men,
            brand_id: l.nike,
            category_id: l.running,
            published: true,
            age_days: 1,
        },
    )
    .await?;
    let black = create_variant(&state, runner, l.black, l.size_9, 5000, None).await?;

    // Counting never creates a guest session.
    let (response, body) = call(&state, Request::get("/api/cart/count").body(Body::empty())?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(set_cookie(&response).is_none());
    assert_eq!(body["data"]["count"], 0);
    assert_eq!(Guests::find().count(&state.orm).await?, 0);

    // A failed add still hands back the session it minted.
    let unknown = json!({ "item": { "kind": "variant", "id": uuid::Uuid::new_v4() } });
    let (response, body) = call(&state, json_post("/api/cart/items", None, unknown.to_string())?).await?;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body["success"], false);
    let minted = set_cookie(&response).expect("guest cookie on error");
    assert!(minted.starts_with("guest_session="));
    assert_eq!(Guests::find().count(&state.orm).await?, 1);
    let cookie = minted.split(';').next().unwrap_or_default().to_string();

    // A malformed body is a JSON 400 and reuses the session.
    let (response, body) =
        call(&state, json_post("/api/cart/items", Some(&cookie), "{".into())?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);
    assert!(set_cookie(&response).is_none());

    let add = json!({ "item": { "kind": "variant", "id": black }, "quantity": 2 });
    let (response, _) = call(&state, json_post("/api/cart/items", Some(&cookie), add.to_string())?).await?;
    assert_eq!(response.status(), StatusCode::OK);

    let (_, body) = call(
        &state,
        Request::get("/api/cart/count")
            .header(header::COOKIE, &cookie)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(body["data"]["count"], 2);

    // Registering carries the cart over and clears the cookie.
    let register = json!({
        "name": "Route Buyer",
        "email": "route@example.com",
        "password": "correct-horse"
    });
    let (response, body) = call(
        &state,
        json_post("/api/auth/register", Some(&cookie), register.to_string())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::CREATED);
    assert_eq!(body["data"]["merged_cart_items"], 1);
    let cleared = set_cookie(&response).expect("cleared cookie");
    assert!(cleared.contains("Max-Age=0"));
    assert_eq!(Guests::find().count(&state.orm).await?, 0);

    Ok(())
}
