pub mod commission;
pub mod finance;
