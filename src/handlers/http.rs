//! Read-only HTTP listing of registered network records

use std::convert::Infallible;

use warp::http::StatusCode;
use warp::reply::Response;
use warp::{Rejection, Reply};

use crate::core::server::SharedServerManager;

// GET /api/network
pub async fn list_networks(manager: SharedServerManager) -> Result<Response, Infallible> {
    Ok(warp::reply::json(&manager.networks().records()).into_response())
}

// GET /api/network/:id
pub async fn get_network(
    id: String,
    manager: SharedServerManager,
) -> Result<Response, Infallible> {
    match manager.networks().get(&id) {
        Some(record) => Ok(warp::reply::json(&record).into_response()),
        None => Ok(not_found().into_response()),
    }
}

// Every unmatched route gets the same plain-text 404
pub async fn recover_not_found(_: Rejection) -> Result<impl Reply, Infallible> {
    Ok(not_found())
}

fn not_found() -> impl Reply {
    warp::reply::with_status("not found", StatusCode::NOT_FOUND)
}
