mod rtc_data_channel;
mod rtc_transport;

pub use rtc_data_channel::*;
pub use rtc_transport::*;
