pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod graphql;
pub mod handlers;
pub mod queue;
pub mod runtime;
pub mod shared;
pub mod template;
