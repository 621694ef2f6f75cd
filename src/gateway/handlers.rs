//! Route CRUD handlers.
//!
//! Each handler builds one backend request from the caller identity and the
//! HTTP input, awaits the correlated reply, and maps it to a status code.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};

use super::{
    // ---
    auth::Identity,
    contracts::{
        methods, CreateRouteBody, CreateRouteRequest, DeleteRouteRequest, GetAllRoutesRequest,
        GetAllRoutesResponse, GetRouteRequest, GetRouteResponse, ListRoutesQuery,
        OperationResponse, Route, RouteSummary, UpdateRouteBody, UpdateRouteRequest,
    },
    error::ApiError,
    GatewayState,
};

type ApiResult<T> = std::result::Result<T, ApiError>;

/// `GET /v1/routes`
pub async fn list_routes(
    State(state): State<GatewayState>,
    identity: Identity,
    Query(query): Query<ListRoutesQuery>,
) -> ApiResult<Json<Vec<RouteSummary>>> {
    // ---
    tracing::info!(
        user_id = %identity.user_id,
        friend_id = ?query.friend_id,
        popular = ?query.popular,
        "list routes"
    );

    let request = GetAllRoutesRequest {
        user_id: identity.user_id,
        friend_id: query.friend_id,
        popular: query.popular,
    };

    let reply: GetAllRoutesResponse = state.client.call(methods::GET_ALL_ROUTES, &request).await?;

    if !reply.found_routes {
        return Err(ApiError::NotFound("no routes found".into()));
    }

    Ok(Json(reply.routes))
}

/// `GET /v1/route/:id`
pub async fn get_route(
    State(state): State<GatewayState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<Json<Route>> {
    // ---
    tracing::info!(user_id = %identity.user_id, route_id = %id, "get route");

    let request = GetRouteRequest {
        id: id.clone(),
        user_id: identity.user_id,
    };

    let reply: GetRouteResponse = state.client.call(methods::GET_ROUTE, &request).await?;

    match reply.route {
        Some(route) if reply.found_route => Ok(Json(route)),
        _ => Err(ApiError::NotFound(format!("route {id} not found"))),
    }
}

/// `POST /v1/route`
pub async fn create_route(
    State(state): State<GatewayState>,
    identity: Identity,
    Json(body): Json<CreateRouteBody>,
) -> ApiResult<StatusCode> {
    // ---
    tracing::info!(
        user_id = %identity.user_id,
        route_name = %body.route_name,
        places = body.places.len(),
        "create route"
    );

    let request = CreateRouteRequest {
        user_id: identity.user_id,
        route_name: body.route_name,
        places: body.places,
    };

    let reply: OperationResponse = state.client.call(methods::CREATE_ROUTE, &request).await?;

    succeeded(reply, StatusCode::INTERNAL_SERVER_ERROR, "route creation failed")
}

/// `DELETE /v1/route/:id`
pub async fn delete_route(
    State(state): State<GatewayState>,
    identity: Identity,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    // ---
    tracing::info!(user_id = %identity.user_id, route_id = %id, "delete route");

    let request = DeleteRouteRequest {
        id,
        user_id: identity.user_id,
    };

    let reply: OperationResponse = state.client.call(methods::DELETE_ROUTE, &request).await?;

    succeeded(reply, StatusCode::BAD_REQUEST, "route deletion failed")
}

/// `PUT /v1/route/:id`
///
/// `like` and `unlike` together are rejected without contacting the backend.
pub async fn update_route(
    State(state): State<GatewayState>,
    identity: Identity,
    Path(id): Path<String>,
    Json(body): Json<UpdateRouteBody>,
) -> ApiResult<StatusCode> {
    // ---
    if body.is_conflicting() {
        tracing::debug!(route_id = %id, "rejecting update with both like and unlike");
        return Err(ApiError::Validation(
            "like and unlike cannot both be set".into(),
        ));
    }

    tracing::info!(
        user_id = %identity.user_id,
        route_id = %id,
        like = ?body.like,
        unlike = ?body.unlike,
        "update route"
    );

    let request = UpdateRouteRequest {
        id,
        user_id: identity.user_id,
        like: body.like,
        unlike: body.unlike,
    };

    let reply: OperationResponse = state.client.call(methods::UPDATE_ROUTE, &request).await?;

    succeeded(reply, StatusCode::BAD_REQUEST, "route update failed")
}

/// `GET /health`
pub async fn health() -> StatusCode {
    StatusCode::OK
}

fn succeeded(reply: OperationResponse, failure: StatusCode, message: &str) -> ApiResult<StatusCode> {
    // ---
    if reply.successful {
        Ok(StatusCode::OK)
    } else {
        Err(ApiError::BackendFailure {
            status: failure,
            message: message.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;

    #[test]
    fn test_operation_failure_uses_given_status() {
        // ---
        let ok = succeeded(OperationResponse { successful: true }, StatusCode::BAD_REQUEST, "x");
        assert_eq!(ok.unwrap(), StatusCode::OK);

        let err = succeeded(
            OperationResponse { successful: false },
            StatusCode::INTERNAL_SERVER_ERROR,
            "route creation failed",
        )
        .unwrap_err();
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "route creation failed");
    }
}
