#![allow(dead_code)]
#![allow(async_fn_in_trait)]

pub mod cloud;
pub mod config;
pub mod dispatch;
pub mod errors;
pub mod feeds;
pub mod fleet;
pub mod health;
pub mod models;
pub mod orchestrator;
