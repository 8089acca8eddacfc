pub mod auth;
pub mod cache;
pub mod config;
pub mod db;
pub mod documents;
pub mod error;
pub mod models;
pub mod repo;
pub mod routes;
pub mod schema;
pub mod state;
pub mod storage;
