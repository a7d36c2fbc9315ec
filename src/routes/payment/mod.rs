pub mod errors;
pub mod handlers;
pub mod models;
pub mod routes;
pub mod schemas;
pub mod state;
pub mod store;
pub mod utils;

pub use routes::payment_route;
