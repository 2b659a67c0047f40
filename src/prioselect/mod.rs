//! Priority-ordered select over an arbitrary number of channels.
//!
//! [`select`] waits on an ordered list of receivers and returns the first value available.
//! Receivers that already hold a value when the call is made are served in list order:
//! the earliest one in the list wins. Once no receiver is immediately ready, the call
//! blocks on all of them and returns whichever delivers first.
//!
//! ```
//! use std::time::Duration;
//! use prioselect::{select, utils::{capacity::Capacity, ringchannel::{after, channel}}};
//!
//! let (text_sender, text) = channel::<String>(Capacity::bounded(1));
//! let timeout = after(Duration::from_secs(5));
//!
//! text_sender.send("hello".to_string()).unwrap();
//!
//! // If both are ready, the text channel wins
//! let selection = select(&[&text, &timeout]).unwrap();
//! assert!(selection.is_from(&text));
//! assert_eq!(selection.downcast::<String>().unwrap(), "hello");
//! ```
//!
//! Only channel receivers can be selected on:
//!
//! ```compile_fail
//! prioselect::select(&[&42]);
//! ```

mod receivable;
mod selector;

pub use receivable::Receivable;
pub use selector::{select, Selection};

pub use crate::utils::ringchannel::ChannelId;
