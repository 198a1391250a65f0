pub mod assemble;
pub mod cache;
pub mod config;
pub mod dates;
pub mod extract;
pub mod fetch;
pub mod harness;
pub mod listing;
pub mod model;
pub mod names;
pub mod normalize;
pub mod pipeline;
pub mod queries;
pub mod store;
