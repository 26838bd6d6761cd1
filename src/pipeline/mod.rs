pub mod extraction;
pub mod structuring;
pub mod rules;
pub mod processor;
