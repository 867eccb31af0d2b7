pub mod api;
pub mod app;
pub mod cli;
pub mod config;
pub mod db;
pub mod dispatch;
pub mod flow;
pub mod global;
pub mod pipeline;
pub mod transcripts;
pub mod webhook;
