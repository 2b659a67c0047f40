use thiserror::Error;

use std::sync::{Arc, Condvar, Mutex};

use super::{
    buffer::Buffer,
    select::{ReadyList, SelectToken, Selectable},
};
use crate::utils::capacity::Capacity;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("The channel was closed (no sender)")]
    Closed,

    #[error("No data available in channel")]
    Empty,
}

/// Identity of a channel, shared by all the receivers (and senders) of that channel.
/// Only meaningful while at least one handle to the channel is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelId(usize);

#[derive(Debug)]
pub struct Channel<T> {
    inner: Mutex<ChannelInner<T>>,
    cv: Condvar,
}

#[derive(Debug)]
struct ChannelInner<T> {
    buf: Buffer<T>,
    capacity: Capacity,
    num_senders: usize,
    num_receivers: usize,
    closed: bool,

    /// Select groups currently waiting on this channel
    watchers: Vec<(SelectToken, Arc<ReadyList>)>,
}

impl<T> ChannelInner<T> {
    fn notify_len(&self) {
        let len = self.buf.len();
        for (tk, ready_list) in self.watchers.iter() {
            ready_list.update(*tk, len);
        }
    }
}

impl<T> Channel<T> {
    fn new(capacity: Capacity, num_senders: usize) -> Self {
        Self {
            inner: Mutex::new(ChannelInner {
                buf: Buffer::new(capacity),
                capacity,
                num_senders,
                num_receivers: 1,
                closed: false,
                watchers: vec![],
            }),
            cv: Condvar::default(),
        }
    }

    fn write(&self, data: T) -> Result<(), ChannelError> {
        let mut inner = self.inner.lock().unwrap();

        if inner.closed {
            return Err(ChannelError::Closed);
        }

        inner.buf.push(data);
        inner.notify_len();

        self.cv.notify_one();
        Ok(())
    }

    fn close(&self) {
        let mut inner = self.inner.lock().unwrap();

        if inner.closed {
            return;
        }
        inner.closed = true;

        for (tk, ready_list) in inner.watchers.iter() {
            ready_list.close(*tk);
        }

        self.cv.notify_all();
    }

    fn add_sender(&self) {
        self.inner.lock().unwrap().num_senders += 1;
    }

    fn remove_sender(&self) {
        let last = {
            let mut inner = self.inner.lock().unwrap();
            inner.num_senders -= 1;
            inner.num_senders == 0
        };

        if last {
            self.close();
        }
    }

    fn add_receiver(&self) {
        self.inner.lock().unwrap().num_receivers += 1;
    }

    fn remove_receiver(&self) {
        self.inner.lock().unwrap().num_receivers -= 1;
    }

    fn id(this: &Arc<Channel<T>>) -> ChannelId {
        ChannelId(Arc::as_ptr(this) as *const () as usize)
    }
}

/// Receiving side of a channel.
/// Clones share the same queue: each value is delivered to exactly one receiver.
#[derive(Debug)]
pub struct Receiver<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Clone for Receiver<T> {
    fn clone(&self) -> Self {
        self.channel.add_receiver();

        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> Drop for Receiver<T> {
    fn drop(&mut self) {
        self.channel.remove_receiver();
    }
}

impl<T> Receiver<T> {
    /// Blocks until a value is available or the channel is closed and drained.
    pub fn recv(&self) -> Result<T, ChannelError> {
        let inner = self.channel.inner.lock().unwrap();

        let mut inner = self
            .channel
            .cv
            .wait_while(inner, |inner| inner.buf.is_empty() && !inner.closed)
            .unwrap();

        match inner.buf.dequeue() {
            Some(value) => {
                inner.notify_len();
                Ok(value)
            }
            None => Err(ChannelError::Closed),
        }
    }

    pub fn try_recv(&self) -> Result<T, ChannelError> {
        let mut inner = self.channel.inner.lock().unwrap();

        match inner.buf.dequeue() {
            Some(value) => {
                inner.notify_len();
                Ok(value)
            }
            None if inner.closed => Err(ChannelError::Closed),
            None => Err(ChannelError::Empty),
        }
    }

    pub fn len(&self) -> usize {
        self.channel.inner.lock().unwrap().buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.channel.inner.lock().unwrap().buf.is_empty()
    }

    /// True once the channel has been closed, even if values are still buffered
    pub fn is_closed(&self) -> bool {
        self.channel.inner.lock().unwrap().closed
    }

    pub fn capacity(&self) -> Capacity {
        self.channel.inner.lock().unwrap().capacity
    }

    pub fn id(&self) -> ChannelId {
        Channel::id(&self.channel)
    }
}

impl<T> Selectable for Receiver<T> {
    fn register(&self, token: SelectToken, ready_list: Arc<ReadyList>) {
        let mut inner = self.channel.inner.lock().unwrap();

        ready_list.update(token, inner.buf.len());
        if inner.closed {
            ready_list.close(token);
        }

        inner.watchers.push((token, ready_list));
    }

    fn unregister(&self, token: SelectToken, ready_list: &Arc<ReadyList>) {
        let mut inner = self.channel.inner.lock().unwrap();

        debug_assert!(
            inner
                .watchers
                .iter()
                .any(|(tk, rl)| *tk == token && Arc::ptr_eq(rl, ready_list))
        );

        inner
            .watchers
            .retain(|(tk, rl)| !(*tk == token && Arc::ptr_eq(rl, ready_list)));
    }
}

/// Sending side of a channel. The channel is closed when the last sender is dropped.
#[derive(Debug)]
pub struct Sender<T> {
    channel: Arc<Channel<T>>,
}

impl<T> Clone for Sender<T> {
    fn clone(&self) -> Self {
        self.channel.add_sender();

        Self {
            channel: self.channel.clone(),
        }
    }
}

impl<T> Drop for Sender<T> {
    fn drop(&mut self) {
        self.channel.remove_sender();
    }
}

impl<T> Sender<T> {
    /// Never blocks. If the channel is bounded and full, the oldest value is overwritten.
    pub fn send(&self, val: T) -> Result<(), ChannelError> {
        self.channel.write(val)
    }

    /// Closes the channel for every sender. Values already sent can still be received.
    pub fn close(&self) {
        self.channel.close();
    }

    pub fn is_closed(&self) -> bool {
        self.channel.inner.lock().unwrap().closed
    }

    /// False once every receiver has been dropped: nothing sent from now on can be read
    pub fn has_receivers(&self) -> bool {
        self.channel.inner.lock().unwrap().num_receivers > 0
    }

    pub fn id(&self) -> ChannelId {
        Channel::id(&self.channel)
    }
}

pub fn channel<T>(capacity: Capacity) -> (Sender<T>, Receiver<T>) {
    let channel = Arc::new(Channel::<T>::new(capacity, 1));

    let receiver = Receiver {
        channel: channel.clone(),
    };
    let sender = Sender { channel };

    (sender, receiver)
}

/// A receiver with no sender attached: it is never written to, and never closed.
pub(super) fn orphan_receiver<T>(capacity: Capacity) -> Receiver<T> {
    Receiver {
        channel: Arc::new(Channel::<T>::new(capacity, 0)),
    }
}
