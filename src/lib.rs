pub mod app;
pub mod authz;
pub mod db;
pub mod docs;
pub mod errors;
pub mod events;
pub mod jwt;
pub mod models;
pub mod notify;
pub mod profiles;
pub mod routes;
pub mod session;

// Re-export commonly used items for tests
pub use app::create_app;
