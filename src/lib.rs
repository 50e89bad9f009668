pub mod api;
pub mod config;
pub mod database;
pub mod error;
pub mod interval;
pub mod logger;
pub mod model;
pub mod service;
pub mod session;
pub mod time;
