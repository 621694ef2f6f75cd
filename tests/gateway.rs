#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::{to_bytes, Body},
    http::{Method, Request, StatusCode},
    Router,
};
use bytes::Bytes;
use serde_json::{json, Value};
use tower::ServiceExt;

use route_gateway::{
    create_memory_transport_with_hub,
    Envelope, Transport,
    gateway::{
        build_router,
        contracts::{
            methods, CreateRouteRequest, DeleteRouteRequest, GetAllRoutesRequest,
            GetAllRoutesResponse, GetRouteRequest, GetRouteResponse, OperationResponse, Route,
            RouteSummary, UpdateRouteRequest,
        },
        GatewayState, StaticTokenResolver,
    },
    MemoryHub, RpcClient, RpcConfig, RpcResponder,
};

const ROUTE_SERVICE: &str = "route-service";
const TOKEN: &str = "token-u1";
const USER: &str = "u1";

struct TestApp {
    router: Router,
    client: RpcClient,
}

fn route(id: &str, user_id: &str) -> Route {
    Route {
        id: id.to_string(),
        name: "Riverside".to_string(),
        creator_id: user_id.to_string(),
        creator_username: Some("someone".to_string()),
        city: Some("Prague".to_string()),
        country: Some("CZ".to_string()),
        rating: 3,
        places: vec![],
        route_coords: vec![50.08, 14.42],
        user_likes: true,
    }
}

/// Backend double: only route `r1` exists, and only friend `nobody` has no routes.
async fn spawn_route_service(hub: &Arc<MemoryHub>) {
    // ---
    let transport = create_memory_transport_with_hub("route-service", hub.clone())
        .await
        .unwrap();
    let responder = RpcResponder::new(transport, ROUTE_SERVICE);

    responder.register(methods::GET_ALL_ROUTES, |req: GetAllRoutesRequest| async move {
        let found = req.friend_id.as_deref() != Some("nobody");
        let r = route("r1", &req.user_id);
        Ok(GetAllRoutesResponse {
            found_routes: found,
            routes: if found {
                vec![RouteSummary {
                    id: r.id,
                    name: r.name,
                    creator_id: r.creator_id,
                    creator_username: r.creator_username,
                    city: r.city,
                    country: r.country,
                    rating: r.rating,
                    places: r.places,
                }]
            } else {
                vec![]
            },
        })
    });

    responder.register(methods::GET_ROUTE, |req: GetRouteRequest| async move {
        let found = req.id == "r1";
        Ok(GetRouteResponse {
            found_route: found,
            route: found.then(|| route(&req.id, &req.user_id)),
        })
    });

    responder.register(methods::CREATE_ROUTE, |req: CreateRouteRequest| async move {
        Ok(OperationResponse {
            successful: !req.route_name.is_empty() && req.user_id == USER,
        })
    });

    responder.register(methods::DELETE_ROUTE, |req: DeleteRouteRequest| async move {
        Ok(OperationResponse {
            successful: req.id == "r1",
        })
    });

    responder.register(methods::UPDATE_ROUTE, |req: UpdateRouteRequest| async move {
        Ok(OperationResponse {
            successful: req.id == "r1" && (req.like.is_some() || req.unlike.is_some()),
        })
    });

    responder.spawn().await.unwrap();
}

/// Backend double answering every request with the same raw JSON body.
async fn spawn_fixed_reply_service(hub: &Arc<MemoryHub>, body: Value) {
    // ---
    let transport = create_memory_transport_with_hub("fixed-reply", hub.clone())
        .await
        .unwrap();
    let mut requests = transport.subscribe(ROUTE_SERVICE.into()).await.unwrap();
    let payload = Bytes::from(body.to_string());

    tokio::spawn(async move {
        while let Some(request) = requests.inbox.recv().await {
            let (Some(reply_to), Some(id)) = (request.reply_to.clone(), request.correlation())
            else {
                continue;
            };
            transport
                .publish(Envelope::reply(reply_to, payload.clone(), &id))
                .await
                .unwrap();
        }
    });
}

async fn setup(routing_key: &str, request_timeout: Duration, base_path: &str) -> TestApp {
    // ---
    let hub = MemoryHub::new();
    spawn_route_service(&hub).await;
    gateway_on(hub, routing_key, request_timeout, base_path).await
}

async fn setup_fixed_reply(body: Value) -> TestApp {
    // ---
    let hub = MemoryHub::new();
    spawn_fixed_reply_service(&hub, body).await;
    gateway_on(hub, ROUTE_SERVICE, Duration::from_secs(2), "").await
}

async fn gateway_on(
    hub: Arc<MemoryHub>,
    routing_key: &str,
    request_timeout: Duration,
    base_path: &str,
) -> TestApp {
    // ---
    let transport = create_memory_transport_with_hub("gateway", hub).await.unwrap();
    let config = RpcConfig::memory("gateway", routing_key).with_request_timeout(request_timeout);
    let client = RpcClient::with_transport(transport, config).await.unwrap();

    let resolver = Arc::new(StaticTokenResolver::new().with_token(TOKEN, USER));
    let router = build_router(GatewayState::new(client.clone()), resolver, base_path);

    TestApp { router, client }
}

async fn setup_app() -> TestApp {
    setup(ROUTE_SERVICE, Duration::from_secs(2), "").await
}

async fn send(
    app: &TestApp,
    method: Method,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Option<Value>) {
    // ---
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();

    let json = if bytes.is_empty() {
        None
    } else {
        Some(serde_json::from_slice(&bytes).unwrap())
    };
    (status, json)
}

#[tokio::test]
async fn test_get_route_found() {
    // ---
    let app = setup_app().await;

    let (status, body) = send(&app, Method::GET, "/v1/route/r1", Some(TOKEN), None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.expect("route body");
    assert_eq!(body["Id"], "r1");
    assert_eq!(body["CreatorId"], USER);
    assert_eq!(body["UserLikes"], true);
    assert_eq!(body["RouteCoords"], json!([50.08, 14.42]));
}

#[tokio::test]
async fn test_get_route_not_found() {
    // ---
    let app = setup_app().await;

    let (status, body) = send(&app, Method::GET, "/v1/route/missing", Some(TOKEN), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("missing"));
}

#[tokio::test]
async fn test_list_routes() {
    // ---
    let app = setup_app().await;

    let (status, body) = send(&app, Method::GET, "/v1/routes?popular=true", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.unwrap().as_array().unwrap().len(), 1);

    let (status, _) = send(&app, Method::GET, "/v1/routes?friendId=nobody", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_create_route() {
    // ---
    let app = setup_app().await;
    let places = json!([{
        "placeId": "p1", "name": "Bridge", "latitude": 50.0, "longitude": 14.0
    }]);

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/route",
        Some(TOKEN),
        Some(json!({ "routeName": "Evening walk", "places": places })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body.is_none());

    let (status, body) = send(
        &app,
        Method::POST,
        "/v1/route",
        Some(TOKEN),
        Some(json!({ "routeName": "", "places": [] })),
    )
    .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    assert!(body.unwrap()["error"].is_string());
}

#[tokio::test]
async fn test_delete_route() {
    // ---
    let app = setup_app().await;

    let (status, _) = send(&app, Method::DELETE, "/v1/route/r1", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::DELETE, "/v1/route/r2", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_route() {
    // ---
    let app = setup_app().await;

    let (status, _) = send(
        &app,
        Method::PUT,
        "/v1/route/r1",
        Some(TOKEN),
        Some(json!({ "like": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(
        &app,
        Method::PUT,
        "/v1/route/r2",
        Some(TOKEN),
        Some(json!({ "unlike": true })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_update_with_like_and_unlike_never_reaches_backend() {
    // ---
    let app = setup_app().await;

    let (status, body) = send(
        &app,
        Method::PUT,
        "/v1/route/r1",
        Some(TOKEN),
        Some(json!({ "like": true, "unlike": false })),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body.unwrap()["error"].is_string());
    assert_eq!(app.client.stats().calls_started, 0);
}

#[tokio::test]
async fn test_no_reply_is_gateway_timeout() {
    // ---
    let app = setup("nobody-listens", Duration::from_millis(100), "").await;

    let (status, _) = send(&app, Method::GET, "/v1/route/r1", Some(TOKEN), None).await;

    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert_eq!(app.client.pending_len(), 0);
    assert_eq!(app.client.stats().timeouts, 1);
}

#[tokio::test]
async fn test_requests_without_identity_are_rejected() {
    // ---
    let app = setup_app().await;

    let (status, _) = send(&app, Method::GET, "/v1/route/r1", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, Method::GET, "/v1/route/r1", Some("wrong"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    assert_eq!(app.client.stats().calls_started, 0);
}

#[tokio::test]
async fn test_health_needs_no_token() {
    // ---
    let app = setup_app().await;

    let (status, _) = send(&app, Method::GET, "/health", None, None).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn test_base_path_prefixes_routes() {
    // ---
    let app = setup(ROUTE_SERVICE, Duration::from_secs(2), "/routes-api/").await;

    let (status, _) = send(&app, Method::GET, "/routes-api/v1/route/r1", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/routes-api/health", None, None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, Method::GET, "/v1/route/r1", Some(TOKEN), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_null_routes_from_backend_is_not_found() {
    // ---
    let app = setup_fixed_reply(json!({ "FoundRoutes": false, "Routes": null })).await;

    let (status, body) = send(&app, Method::GET, "/v1/routes", Some(TOKEN), None).await;

    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body.unwrap()["error"].is_string());
}

#[tokio::test]
async fn test_route_with_null_collections_is_returned() {
    // ---
    let app = setup_fixed_reply(json!({
        "FoundRoute": true,
        "Route": {
            "Id": "r1",
            "Name": "Loop",
            "CreatorId": USER,
            "CreatorUsername": null,
            "City": null,
            "Country": null,
            "Rating": 0,
            "Places": null,
            "RouteCoords": null,
            "UserLikes": false
        }
    }))
    .await;

    let (status, body) = send(&app, Method::GET, "/v1/route/r1", Some(TOKEN), None).await;

    assert_eq!(status, StatusCode::OK);
    let body = body.unwrap();
    assert_eq!(body["Id"], "r1");
    assert_eq!(body["Places"], json!([]));
    assert_eq!(body["RouteCoords"], json!([]));
}

#[tokio::test]
async fn test_transport_failure_is_bad_gateway() {
    // ---
    let app = setup_app().await;
    app.client.shutdown().await.unwrap();

    let (status, body) = send(&app, Method::GET, "/v1/route/r1", Some(TOKEN), None).await;

    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert!(body.unwrap()["error"].as_str().unwrap().contains("transport"));
    assert_eq!(app.client.stats().publish_failures, 1);
    assert_eq!(app.client.pending_len(), 0);
}
