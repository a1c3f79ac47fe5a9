pub mod auth;
pub mod breaker;
pub mod config;
pub mod context;
pub mod db;
pub mod error;
pub mod routes;
pub mod service;
pub mod store;
