//! External persistence collaborator

pub mod results;

pub use results::{ResultsClient, StoreError};
