pub mod middleware;
pub mod models;
pub mod routes;
