pub mod config;
pub mod error;
pub mod link;
pub mod rtc;
pub mod runtime;
pub mod transfer;

pub use config::*;
pub use error::*;
pub use link::*;
pub use rtc::*;
pub use runtime::*;
pub use transfer::*;
