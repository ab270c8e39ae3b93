pub mod types;

pub use types::TransactionId;
