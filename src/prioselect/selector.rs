use std::any::Any;

use log::{debug, trace};

use super::Receivable;
use crate::utils::ringchannel::{ChannelError, ChannelId, Select};

/// A value received by [`select`], along with the channel it came from.
#[derive(Debug)]
pub struct Selection {
    value: Box<dyn Any + Send>,
    channel: ChannelId,
    index: usize,
}

impl Selection {
    pub fn channel(&self) -> ChannelId {
        self.channel
    }

    /// Position of the source channel in the list passed to [`select`]
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn is_from(&self, channel: &dyn Receivable) -> bool {
        self.channel == channel.id()
    }

    /// Recovers the concrete value. The selection is given back if `T` is not the
    /// element type of the source channel.
    pub fn downcast<T: 'static>(self) -> Result<T, Selection> {
        let Selection {
            value,
            channel,
            index,
        } = self;

        value.downcast::<T>().map(|v| *v).map_err(|value| Selection {
            value,
            channel,
            index,
        })
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }

    pub fn into_value(self) -> Box<dyn Any + Send> {
        self.value
    }
}

/// Receives a value from the first ready channel in `channels`, in priority order
/// (index 0 first).
///
/// All channels but the last are polled without blocking, in order. If none of them
/// holds a value, the call blocks on all of them: from then on, whichever channel
/// delivers first wins, with no ordering among channels ready at the same time.
/// Closed channels are dropped from the wait as they are found.
///
/// Returns `None` if `channels` is empty, or if all of them are closed before
/// delivering a value. Exactly one value is consumed when `Some` is returned.
pub fn select(channels: &[&dyn Receivable]) -> Option<Selection> {
    let (_, polled) = channels.split_last()?;

    for (index, channel) in polled.iter().enumerate() {
        match channel.try_recv_any() {
            Ok(value) => {
                trace!("Channel {index} ready on first pass");
                return Some(Selection {
                    value,
                    channel: channel.id(),
                    index,
                });
            }
            Err(e) => trace!("Channel {index} not ready: {e}"),
        }
    }

    debug!(
        "No channel ready on first pass, waiting on {} channels",
        channels.len()
    );

    let mut select = Select::default();
    for channel in channels {
        select.add(channel.as_selectable());
    }

    loop {
        let index = select.ready();
        let channel = channels[index];

        match channel.try_recv_any() {
            Ok(value) => {
                trace!("Channel {index} delivered");
                return Some(Selection {
                    value,
                    channel: channel.id(),
                    index,
                });
            }
            Err(ChannelError::Closed) => {
                trace!("Channel {index} closed, removing it from the wait");
                select.remove(index);

                if select.num_active_subs() == 0 {
                    debug!("All channels closed");
                    return None;
                }
            }
            // Consumed by another receiver in the meantime
            Err(ChannelError::Empty) => {}
        }
    }
}
