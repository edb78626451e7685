pub mod app;
pub mod composite;
pub mod config;
pub mod convert;
pub mod domain;
pub mod engine;
pub mod error;
pub mod expression;
pub mod flatten;
pub mod job;
pub mod output;
pub mod registry;
pub mod storage;
pub mod submit;
pub mod table;
pub mod throttle;
