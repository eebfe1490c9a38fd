pub mod audit;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod ena;
pub mod error;
pub mod index;
pub mod materializer;
pub mod merge;
pub mod orchestrator;
pub mod output;
pub mod project;
pub mod resolve;
