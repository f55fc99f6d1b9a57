pub mod common;
pub mod fetch;
pub mod snapshot;

// Re-export commonly used route types for convenience
pub use common::{success_return, ApiResponse, RouteResult, CORS};

use rocket::Route;

/// Get all application routes
pub fn get_all_routes() -> Vec<Route> {
    let mut routes = Vec::new();
    routes.extend(fetch::routes());
    routes.extend(snapshot::routes());
    routes
}
