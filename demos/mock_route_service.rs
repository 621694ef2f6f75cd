//! Mock route service.
//!
//! Serves the five route operations from an in-memory map through an
//! `RpcResponder`.
//!
//! With `RABBITMQ_URI` set, only the responder runs, consuming the queue named
//! by `RABBITMQ_ROUTING_KEY` (default `route-service`), so a separately started
//! `route-gateway` can talk to it through the broker.
//!
//! Without it, the responder and the gateway share the in-memory transport in
//! one process, listening on 127.0.0.1:8080 with the bearer token `dev-token`
//! mapped to `demo-user`:
//!
//! ```text
//! curl -H 'Authorization: Bearer dev-token' localhost:8080/v1/routes?popular=true
//! ```
//!
//! Run with: cargo run --example mock_route_service

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use route_gateway::{
    // ---
    create_transport,
    gateway::{
        build_router,
        contracts::{
            methods, CreateRouteRequest, DeleteRouteRequest, GetAllRoutesRequest,
            GetAllRoutesResponse, GetRouteRequest, GetRouteResponse, OperationResponse, Place,
            Route, RouteSummary, UpdateRouteRequest,
        },
        GatewayState, StaticTokenResolver,
    },
    Result, RpcClient, RpcConfig, RpcResponder,
};
use tracing_subscriber::{fmt as tracing_format, EnvFilter};

struct StoredRoute {
    route: Route,
    likes: HashSet<String>,
}

#[derive(Default)]
struct RouteStore {
    routes: Mutex<HashMap<String, StoredRoute>>,
}

impl RouteStore {
    fn seeded() -> Arc<Self> {
        // ---
        let store = Arc::new(Self::default());
        store.insert(
            "alice",
            "Old town walk",
            vec![Place {
                place_id: "p-1".into(),
                name: "Town hall".into(),
                photo_reference: None,
                latitude: 50.087,
                longitude: 14.421,
                rating: 4.6,
                number_of_ratings: 1200,
                types: vec!["tourist_attraction".into()],
            }],
        );
        store
    }

    fn insert(&self, creator_id: &str, name: &str, places: Vec<Place>) -> String {
        // ---
        let id = uuid::Uuid::new_v4().to_string();
        let route_coords = places
            .iter()
            .flat_map(|p| [p.latitude, p.longitude])
            .collect();

        let route = Route {
            id: id.clone(),
            name: name.to_string(),
            creator_id: creator_id.to_string(),
            creator_username: Some(creator_id.to_string()),
            city: None,
            country: None,
            rating: 0,
            places,
            route_coords,
            user_likes: false,
        };

        self.routes.lock().unwrap().insert(
            id.clone(),
            StoredRoute {
                route,
                likes: HashSet::new(),
            },
        );
        id
    }
}

fn summary(route: &Route) -> RouteSummary {
    RouteSummary {
        id: route.id.clone(),
        name: route.name.clone(),
        creator_id: route.creator_id.clone(),
        creator_username: route.creator_username.clone(),
        city: route.city.clone(),
        country: route.country.clone(),
        rating: route.rating,
        places: route.places.clone(),
    }
}

fn register_handlers(responder: &RpcResponder, store: Arc<RouteStore>) {
    // ---
    let s = store.clone();
    responder.register(methods::GET_ALL_ROUTES, move |req: GetAllRoutesRequest| {
        let store = s.clone();
        async move {
            let routes = store.routes.lock().unwrap();
            let owner = req.friend_id.as_deref().unwrap_or(&req.user_id);

            let mut found: Vec<RouteSummary> = routes
                .values()
                .filter(|r| req.popular == Some(true) || r.route.creator_id == owner)
                .map(|r| summary(&r.route))
                .collect();

            if req.popular == Some(true) {
                found.sort_by(|a, b| b.rating.cmp(&a.rating));
            }

            Ok(GetAllRoutesResponse {
                found_routes: !found.is_empty(),
                routes: found,
            })
        }
    });

    let s = store.clone();
    responder.register(methods::GET_ROUTE, move |req: GetRouteRequest| {
        let store = s.clone();
        async move {
            let routes = store.routes.lock().unwrap();
            let route = routes.get(&req.id).map(|stored| Route {
                user_likes: stored.likes.contains(&req.user_id),
                ..stored.route.clone()
            });

            Ok(GetRouteResponse {
                found_route: route.is_some(),
                route,
            })
        }
    });

    let s = store.clone();
    responder.register(methods::CREATE_ROUTE, move |req: CreateRouteRequest| {
        let store = s.clone();
        async move {
            if req.route_name.trim().is_empty() || req.places.is_empty() {
                return Ok(OperationResponse { successful: false });
            }
            let id = store.insert(&req.user_id, &req.route_name, req.places);
            tracing::info!(route_id = %id, user_id = %req.user_id, "route created");
            Ok(OperationResponse { successful: true })
        }
    });

    let s = store.clone();
    responder.register(methods::DELETE_ROUTE, move |req: DeleteRouteRequest| {
        let store = s.clone();
        async move {
            let mut routes = store.routes.lock().unwrap();
            let owned = routes
                .get(&req.id)
                .is_some_and(|r| r.route.creator_id == req.user_id);
            if owned {
                routes.remove(&req.id);
            }
            Ok(OperationResponse { successful: owned })
        }
    });

    let s = store;
    responder.register(methods::UPDATE_ROUTE, move |req: UpdateRouteRequest| {
        let store = s.clone();
        async move {
            let mut routes = store.routes.lock().unwrap();
            let Some(stored) = routes.get_mut(&req.id) else {
                return Ok(OperationResponse { successful: false });
            };

            if req.like == Some(true) {
                stored.likes.insert(req.user_id);
            } else if req.unlike == Some(true) {
                stored.likes.remove(&req.user_id);
            }
            stored.route.rating = stored.likes.len() as i32;

            Ok(OperationResponse { successful: true })
        }
    });
}

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    tracing_format()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(true)
        .with_line_number(true)
        .init();

    let routing_key =
        std::env::var("RABBITMQ_ROUTING_KEY").unwrap_or_else(|_| "route-service".to_string());

    let mut config = RpcConfig::memory("mock-route-service", routing_key.clone());
    config.transport_uri = std::env::var("RABBITMQ_URI").ok();
    if let Ok(exchange) = std::env::var("RABBITMQ_EXCHANGE_NAME") {
        config = config.with_exchange(exchange);
    }

    let transport = create_transport(&config).await?;

    let responder = RpcResponder::new(transport.clone(), routing_key);
    register_handlers(&responder, RouteStore::seeded());
    let serving = responder.spawn().await?;

    if config.transport_uri.is_some() {
        tracing::info!("serving route requests from the broker");
        serving.await.ok();
        return Ok(());
    }

    let config = config.with_reply_queue("responses/demo-gateway");
    let client = RpcClient::with_transport(transport, config).await?;
    let resolver = Arc::new(StaticTokenResolver::new().with_token("dev-token", "demo-user"));
    let router = build_router(GatewayState::new(client), resolver, "");

    let listener = tokio::net::TcpListener::bind("127.0.0.1:8080")
        .await
        .expect("bind 127.0.0.1:8080");
    tracing::info!("gateway listening on 127.0.0.1:8080");

    axum::serve(listener, router).await.expect("http server");
    Ok(())
}
