pub mod ids;
pub mod line;
pub mod request;
pub mod rule;
