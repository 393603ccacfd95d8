pub mod api;
pub mod application;
pub mod builtins;
pub mod commands;
pub mod database;
pub mod dispatcher;
pub mod gateway;
pub mod localization;
pub mod registry;
pub mod stages;
pub mod stats;
pub mod telegram;

#[cfg(test)]
pub mod testing;

pub use api::*;
pub use application::*;
pub use commands::*;
pub use database::*;
pub use dispatcher::*;
pub use gateway::*;
pub use localization::*;
pub use registry::*;
pub use stages::*;
pub use stats::*;
pub use telegram::*;
