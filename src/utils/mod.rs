pub mod jwt;
pub mod require_premium;
