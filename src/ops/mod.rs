pub mod ai;
pub mod generation;
pub mod prompt;
pub mod transform;
