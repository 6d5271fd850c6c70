pub mod aggregate;
pub mod auth;
pub mod catalog;
pub mod config;
pub mod error;
pub mod http;
pub mod models;
pub mod output;
pub mod realtime;
pub mod store;
pub mod tracker;
pub mod view;
