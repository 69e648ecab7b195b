pub mod finance_repo;
pub use finance_repo::FinanceRepository;
pub mod commission_repo;
pub use commission_repo::CommissionRepository;
pub mod audit_repo;
pub use audit_repo::AuditRepository;
