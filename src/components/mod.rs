pub mod compare;
pub mod history;
