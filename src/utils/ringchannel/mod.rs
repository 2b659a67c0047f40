mod buffer;
mod channel;
mod select;
mod timer;

pub use channel::*;

pub use select::ReadyList;
pub use select::Select;
pub use select::SelectToken;
pub use select::Selectable;

pub use timer::{after, never};
