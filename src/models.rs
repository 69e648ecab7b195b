pub mod audit;
pub mod commission;
pub mod finance;
