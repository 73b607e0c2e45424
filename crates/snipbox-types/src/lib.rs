pub mod api;
pub mod models;
pub mod nav;
pub mod validate;
