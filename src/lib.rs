pub mod prioselect;
pub mod utils;

pub use prioselect::{select, ChannelId, Receivable, Selection};
