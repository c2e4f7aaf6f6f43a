pub mod app;
pub mod auth;
pub mod cli;
pub mod config;
pub mod crypto;
pub mod database;
pub mod dynamic;
pub mod error;
pub mod filter;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod types;
