pub mod app;
pub mod builder;
pub mod config;
pub mod domain;
pub mod error;
pub mod metadata;
pub mod pacs;
pub mod store;
pub mod upload;
