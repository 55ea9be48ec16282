pub mod answer;
pub mod config;
pub mod errors;

pub use answer::QueryResult;
pub use errors::EventFailure;
