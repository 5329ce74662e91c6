pub mod fetch;
pub mod metrics;
pub mod output;
pub mod parser;
