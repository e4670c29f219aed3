pub mod audit;
pub mod member;
pub mod speaker;
