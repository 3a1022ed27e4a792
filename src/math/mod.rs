pub mod expression;
pub mod fraction;
