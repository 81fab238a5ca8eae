pub mod auth;
pub mod deposit_service;
pub mod jwt;
pub mod kyc_service;
pub mod user_service;
