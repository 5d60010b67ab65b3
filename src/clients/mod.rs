pub mod openai;
pub mod rate_limit;
pub mod traits;

pub use openai::ChatCompletionsClient;
pub use rate_limit::RateLimiter;
pub use traits::{GenerationClient, GenerationError};
