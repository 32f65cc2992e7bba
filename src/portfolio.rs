pub mod aggregate;
pub mod brokerage;
pub mod holdings;
pub mod router;
pub mod sub_account;
