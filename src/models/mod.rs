pub mod kyc;
pub mod transaction;
pub mod user;
