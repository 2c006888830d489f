pub mod app_state;
pub mod auth;
pub mod board;
pub mod config;
pub mod error;
pub mod models;
pub mod permissions;
pub mod project;
pub mod routes;
pub mod state_machine;
pub mod store;
pub mod task_client;
pub mod tasks;
