pub mod catalog;
pub mod cli;
pub mod codec;
pub mod engine;
pub mod model;
pub mod output;
pub mod probe;
pub mod transport;
