pub mod app;
pub mod commands;
pub mod config;
pub mod dispatch;
pub mod env;
pub mod info;
pub mod output;
pub mod prompt;
pub mod run;
pub mod runtime;
