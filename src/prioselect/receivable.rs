use std::any::Any;

use crate::utils::ringchannel::{ChannelError, ChannelId, Receiver, Selectable};

/// Type-erased receiving endpoint, as consumed by [`select`](super::select).
pub trait Receivable: Selectable + Send + Sync {
    fn id(&self) -> ChannelId;

    /// Non-blocking receive. The value is boxed so channels of different
    /// element types can be selected on together.
    fn try_recv_any(&self) -> Result<Box<dyn Any + Send>, ChannelError>;

    fn as_selectable(&self) -> &dyn Selectable;
}

impl<T: Send + 'static> Receivable for Receiver<T> {
    fn id(&self) -> ChannelId {
        Receiver::id(self)
    }

    fn try_recv_any(&self) -> Result<Box<dyn Any + Send>, ChannelError> {
        self.try_recv()
            .map(|value| Box::new(value) as Box<dyn Any + Send>)
    }

    fn as_selectable(&self) -> &dyn Selectable {
        self
    }
}

#[cfg(test)]
mod tests {
    use anyhow::Result;

    use super::*;
    use crate::utils::{capacity::Capacity, ringchannel::channel};

    fn assert_send_sync<T: Send + Sync + ?Sized>() {}

    #[test]
    fn test_receivable_is_send_sync() {
        assert_send_sync::<dyn Receivable>();
        assert_send_sync::<Receiver<String>>();
    }

    #[test]
    fn test_try_recv_any() -> Result<()> {
        let (s, r) = channel::<u8>(Capacity::bounded(1));
        let erased: &dyn Receivable = &r;

        assert_eq!(erased.id(), r.id());
        assert_eq!(erased.try_recv_any().err(), Some(ChannelError::Empty));

        s.send(7)?;
        let value = erased.try_recv_any()?;
        assert_eq!(value.downcast_ref::<u8>(), Some(&7));

        drop(s);
        assert_eq!(erased.try_recv_any().err(), Some(ChannelError::Closed));
        Ok(())
    }
}
