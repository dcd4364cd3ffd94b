//! The four pipeline steps. Each one builds a prompt, validates the model's JSON and degrades
//! to a deterministic fallback before persisting its output.

pub mod parse;
pub mod pricing;
pub mod response;
pub mod sales;
pub mod technical;

pub use pricing::PricingAgent;
pub use response::{ResponseAgent, ResponseInput};
pub use sales::SalesAgent;
pub use technical::TechnicalAgent;
