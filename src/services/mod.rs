pub mod dispatcher;
pub mod jwt;
pub mod msg91;
pub mod otp_flow;
pub mod rate_limit;
pub mod registry;
pub mod verifier;

#[cfg(test)]
pub mod testing;

pub use jwt::JwtService;
pub use rate_limit::RateLimiter;
pub use registry::{FlowHandle, FlowRegistry, RegistryError};
