pub mod check;
pub mod config;
pub mod graph;
pub mod info;
pub mod probe;
pub mod render;
pub mod validate;
