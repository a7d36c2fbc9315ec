pub mod handlers;
pub mod routes;

pub use routes::util_route;
