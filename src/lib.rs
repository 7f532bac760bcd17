pub mod config;
pub mod dataset;
pub mod fetch;
pub mod normalize;
pub mod pipeline;
pub mod predict;
pub mod publish;
pub mod schema;
pub mod training;
pub mod web;
