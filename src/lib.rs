pub mod config;
pub mod driver;
pub mod error;
pub mod hierarchy;
pub mod mapping;
pub mod merge;
pub mod platform;
pub mod resolver;
pub mod table;
