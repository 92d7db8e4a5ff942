//! Long-lived event sources.
//!
//! A [`SubscriptionSource`] describes something that keeps producing values:
//! a cached query, a paginated query, configuration changes. Wrapping it in a
//! [`Subscription`] erases the source type so subscriptions with different
//! sources can be mapped onto one message type and collected together.

pub mod http;

use std::any::TypeId;
use std::sync::Arc;

use futures::StreamExt;
use futures::stream::BoxStream;

/// Identity of a subscription, used to tell whether two subscriptions watch
/// the same thing.
///
/// Two ids are equal only when both the source type and its hash match, so
/// queries with the same key but different value types stay distinct.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId {
    type_id: TypeId,
    hash: u64,
}

impl SubscriptionId {
    #[must_use]
    pub fn of<T: 'static>(hash: u64) -> Self {
        Self {
            type_id: TypeId::of::<T>(),
            hash,
        }
    }
}

/// A source of values that a [`Subscription`] can run.
pub trait SubscriptionSource: Send + 'static {
    type Output: Send + 'static;

    /// Starts a fresh stream of values.
    fn stream(&self) -> BoxStream<'static, Self::Output>;

    fn id(&self) -> SubscriptionId;
}

/// A type-erased subscription producing values of type `T`.
///
/// # Example
///
/// ```rust,ignore
/// use rest_queries::subscription::Subscription;
///
/// let sub = Subscription::new(Query::get(&"posts", descriptor, client, clients))
///     .map(Message::PostsQuery);
/// ```
pub struct Subscription<T> {
    id: SubscriptionId,
    spawn: Box<dyn Fn() -> BoxStream<'static, T> + Send>,
}

impl<T: Send + 'static> Subscription<T> {
    pub fn new<S>(source: S) -> Self
    where
        S: SubscriptionSource<Output = T>,
    {
        let id = source.id();
        Self {
            id,
            spawn: Box::new(move || source.stream()),
        }
    }

    /// Transforms every value produced by the subscription.
    #[must_use]
    pub fn map<F, U>(self, f: F) -> Subscription<U>
    where
        F: Fn(T) -> U + Send + Sync + 'static,
        U: Send + 'static,
    {
        let spawn = self.spawn;
        let f = Arc::new(f);
        Subscription {
            id: self.id,
            spawn: Box::new(move || {
                let f = f.clone();
                spawn().map(move |value| f(value)).boxed()
            }),
        }
    }

    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Starts the underlying stream. Every call starts a new one.
    pub fn stream(&self) -> BoxStream<'static, T> {
        (self.spawn)()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::stream;

    struct Numbers(Vec<i32>);

    impl SubscriptionSource for Numbers {
        type Output = i32;

        fn stream(&self) -> BoxStream<'static, i32> {
            stream::iter(self.0.clone()).boxed()
        }

        fn id(&self) -> SubscriptionId {
            SubscriptionId::of::<Self>(self.0.len() as u64)
        }
    }

    #[tokio::test]
    async fn test_subscription_stream() {
        let sub = Subscription::new(Numbers(vec![1, 2, 3]));
        let values: Vec<_> = sub.stream().collect().await;
        assert_eq!(values, vec![1, 2, 3]);

        // Each call starts over
        let again: Vec<_> = sub.stream().collect().await;
        assert_eq!(again, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_subscription_map_keeps_id() {
        let sub = Subscription::new(Numbers(vec![1, 2]));
        let id = sub.id();

        let mapped = sub.map(|n| format!("n={n}"));
        assert_eq!(mapped.id(), id);

        let values: Vec<_> = mapped.stream().collect().await;
        assert_eq!(values, vec!["n=1".to_string(), "n=2".to_string()]);
    }

    #[test]
    fn test_subscription_id_includes_type() {
        struct Other;
        assert_eq!(SubscriptionId::of::<Numbers>(1), SubscriptionId::of::<Numbers>(1));
        assert_ne!(SubscriptionId::of::<Numbers>(1), SubscriptionId::of::<Other>(1));
        assert_ne!(SubscriptionId::of::<Numbers>(1), SubscriptionId::of::<Numbers>(2));
    }
}
