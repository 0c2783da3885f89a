pub mod flow;
pub mod otp;

pub use flow::*;
pub use otp::*;
