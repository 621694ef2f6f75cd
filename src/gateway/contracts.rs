//! Wire contracts.
//!
//! Messages exchanged with the route service use PascalCase JSON field names.
//! HTTP request bodies and query strings use camelCase; `Place` accepts both
//! spellings because it appears in both.

use serde::{Deserialize, Deserializer, Serialize};

/// Remote operation names understood by the route service.
pub mod methods {
    pub const GET_ALL_ROUTES: &str = "GetAllRoutes";
    pub const GET_ROUTE: &str = "GetRoute";
    pub const CREATE_ROUTE: &str = "CreateRoute";
    pub const DELETE_ROUTE: &str = "DeleteRoute";
    pub const UPDATE_ROUTE: &str = "UpdateRoute";
}

/// Treat an explicit `null` like a missing field. The route service sends
/// empty collections as `null`.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// === Models ===

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Place {
    #[serde(alias = "placeId")]
    pub place_id: String,
    #[serde(alias = "name", deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(default, alias = "photoReference")]
    pub photo_reference: Option<String>,
    #[serde(alias = "latitude")]
    pub latitude: f64,
    #[serde(alias = "longitude")]
    pub longitude: f64,
    #[serde(default, alias = "rating")]
    pub rating: f64,
    #[serde(default, alias = "numberOfRatings")]
    pub number_of_ratings: i32,
    #[serde(default, deserialize_with = "null_as_default", alias = "types")]
    pub types: Vec<String>,
}

/// Route as listed by `GetAllRoutes`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct RouteSummary {
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub creator_id: String,
    #[serde(default)]
    pub creator_username: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub rating: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub places: Vec<Place>,
}

/// Full route as returned by `GetRoute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Route {
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    pub creator_id: String,
    #[serde(default)]
    pub creator_username: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub country: Option<String>,
    #[serde(default)]
    pub rating: i32,
    #[serde(default, deserialize_with = "null_as_default")]
    pub places: Vec<Place>,
    #[serde(default, deserialize_with = "null_as_default")]
    pub route_coords: Vec<f64>,
    #[serde(default)]
    pub user_likes: bool,
}

// === HTTP bodies ===

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListRoutesQuery {
    pub friend_id: Option<String>,
    pub popular: Option<bool>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateRouteBody {
    pub route_name: String,
    #[serde(default, deserialize_with = "null_as_default")]
    pub places: Vec<Place>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRouteBody {
    pub like: Option<bool>,
    pub unlike: Option<bool>,
}

impl UpdateRouteBody {
    /// `like` and `unlike` are mutually exclusive.
    pub fn is_conflicting(&self) -> bool {
        self.like.is_some() && self.unlike.is_some()
    }
}

// === Route service messages ===

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetAllRoutesRequest {
    pub user_id: String,
    pub friend_id: Option<String>,
    pub popular: Option<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetAllRoutesResponse {
    pub found_routes: bool,
    #[serde(default, deserialize_with = "null_as_default")]
    pub routes: Vec<RouteSummary>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetRouteRequest {
    pub id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct GetRouteResponse {
    pub found_route: bool,
    #[serde(default)]
    pub route: Option<Route>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct CreateRouteRequest {
    pub user_id: String,
    pub route_name: String,
    pub places: Vec<Place>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DeleteRouteRequest {
    pub id: String,
    pub user_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UpdateRouteRequest {
    pub id: String,
    pub user_id: String,
    pub like: Option<bool>,
    pub unlike: Option<bool>,
}

/// Reply shape shared by the create, delete and update operations.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct OperationResponse {
    pub successful: bool,
}
