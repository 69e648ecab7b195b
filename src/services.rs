pub mod aging;
pub mod commission_service;
pub mod payment_service;
pub mod settlement;
