mod channel;
mod frame;
mod measurement;

pub use channel::*;
pub use frame::*;
pub use measurement::*;
