pub mod error;
pub mod price;
pub mod retry;
pub mod text;

pub use error::{AppError, Result};
pub use retry::{retry, RetryPolicy};
