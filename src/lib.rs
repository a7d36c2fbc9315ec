pub mod configuration;
pub mod constants;
pub mod database;
pub mod errors;
pub mod openapi;
pub mod order_client;
pub mod providers;
pub mod routes;
pub mod schemas;
pub mod startup;
pub mod sweep;
pub mod telemetry;
pub mod utils;
