pub mod aggregate;
pub mod cache;
