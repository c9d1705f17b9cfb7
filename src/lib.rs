pub mod activity;
pub mod bootstrap;
pub mod catalog;
pub mod common;
pub mod config;
pub mod session;
pub mod streak;
