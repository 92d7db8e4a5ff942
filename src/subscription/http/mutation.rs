//! HTTP writes.
//!
//! Mutations are one-off operations, so they are commands rather than
//! subscriptions. [`Mutation::mutate`] wraps any async producer;
//! [`RestMutation`] binds a resolved endpoint to POST, PUT, PATCH or DELETE.
//! After a successful write, invalidate the affected query keys so active
//! queries refetch.
//!
//! # Example
//!
//! ```rust,ignore
//! use rest_queries::prelude::*;
//!
//! enum Message {
//!     Created(Result<Post, QueryError>),
//! }
//!
//! fn update(&mut self, msg: Message) -> Command<Message> {
//!     match msg {
//!         Message::Create(draft) => {
//!             let descriptor = self.endpoints.query_config("jsonPlaceholder", Some("posts"))?;
//!             RestMutation::post(descriptor, &self.clients)
//!                 .mutate(draft)
//!                 .map(Message::Created)
//!         }
//!         Message::Created(Ok(_)) => self.query_client.invalidate(&"posts"),
//!         Message::Created(Err(_)) => Command::none(),
//!     }
//! }
//! ```

use std::marker::PhantomData;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::Command;
use crate::endpoints::QueryDescriptor;

use super::client::{ClientRegistry, HttpClient, Method};
use super::query::QueryError;

/// The state of a mutation result.
#[derive(Debug, Clone)]
pub enum MutationState<T> {
    /// Mutation is idle (not yet started).
    Idle,
    /// Mutation is in progress.
    Loading,
    /// Mutation succeeded with a result.
    Success(T),
    /// Mutation failed with an error.
    Error(QueryError),
}

/// A mutation result containing the current state.
#[derive(Debug, Clone)]
pub struct MutationResult<T> {
    /// The current state of the mutation.
    pub state: MutationState<T>,
}

impl<T> MutationResult<T> {
    pub const fn idle() -> Self {
        Self {
            state: MutationState::Idle,
        }
    }

    pub const fn loading() -> Self {
        Self {
            state: MutationState::Loading,
        }
    }

    /// Returns the result data if the mutation succeeded, otherwise `None`.
    pub const fn data(&self) -> Option<&T> {
        match &self.state {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    /// Returns the error if the mutation failed, otherwise `None`.
    pub const fn error_value(&self) -> Option<&QueryError> {
        match &self.state {
            MutationState::Error(e) => Some(e),
            _ => None,
        }
    }

    /// Returns `true` if the mutation is currently loading.
    pub const fn is_loading(&self) -> bool {
        matches!(self.state, MutationState::Loading)
    }

    /// Returns `true` if the mutation succeeded.
    pub const fn is_success(&self) -> bool {
        matches!(self.state, MutationState::Success(_))
    }

    /// Returns `true` if the mutation failed.
    pub const fn is_error(&self) -> bool {
        matches!(self.state, MutationState::Error(_))
    }
}

impl<T> Default for MutationResult<T> {
    fn default() -> Self {
        Self::idle()
    }
}

impl<T> From<Result<T, QueryError>> for MutationResult<T> {
    fn from(result: Result<T, QueryError>) -> Self {
        let state = match result {
            Ok(data) => MutationState::Success(data),
            Err(e) => MutationState::Error(e),
        };
        Self { state }
    }
}

/// A mutation for performing data modifications with any async producer.
///
/// Mutations are one-off operations that return a `Command`. Unlike queries,
/// they don't maintain state or cache results.
pub struct Mutation<I, O> {
    _phantom: PhantomData<(I, O)>,
}

impl<I, O> Mutation<I, O>
where
    I: Send + 'static,
    O: Send + 'static,
{
    /// Executes a mutation and returns a `Command`.
    ///
    /// The returned command produces `Result<O, QueryError>` which can be mapped
    /// to your application's message type using [`Command::map`].
    ///
    /// # Arguments
    ///
    /// * `input` - The input data for the mutation
    /// * `mutator` - An async function that performs the mutation
    pub fn mutate<F>(input: I, mutator: F) -> Command<Result<O, QueryError>>
    where
        F: FnOnce(I) -> BoxFuture<'static, Result<O, QueryError>> + Send + 'static,
    {
        Command::future(async move { mutator(input).await })
    }
}

/// A write bound to one resolved endpoint.
///
/// POST, PUT and PATCH send the variables as the JSON body. DELETE sends no
/// body; put any path parameters into the descriptor's URL before building
/// the mutation.
pub struct RestMutation<I, O> {
    method: Method,
    descriptor: Arc<QueryDescriptor>,
    http: HttpClient,
    _phantom: PhantomData<fn(I) -> O>,
}

impl<I, O> RestMutation<I, O>
where
    I: Serialize + Send + 'static,
    O: DeserializeOwned + Send + 'static,
{
    fn with_method(method: Method, descriptor: QueryDescriptor, clients: &ClientRegistry) -> Self {
        Self {
            method,
            http: clients.get(descriptor.base_url.as_str()),
            descriptor: Arc::new(descriptor),
            _phantom: PhantomData,
        }
    }

    pub fn post(descriptor: QueryDescriptor, clients: &ClientRegistry) -> Self {
        Self::with_method(Method::Post, descriptor, clients)
    }

    pub fn put(descriptor: QueryDescriptor, clients: &ClientRegistry) -> Self {
        Self::with_method(Method::Put, descriptor, clients)
    }

    pub fn patch(descriptor: QueryDescriptor, clients: &ClientRegistry) -> Self {
        Self::with_method(Method::Patch, descriptor, clients)
    }

    /// Sends the request with `variables` and decodes the response.
    pub fn mutate(&self, variables: I) -> Command<Result<O, QueryError>> {
        let method = self.method;
        let http = self.http.clone();
        let descriptor = self.descriptor.clone();

        Mutation::mutate(variables, move |variables| {
            Box::pin(async move {
                let body = if method == Method::Delete {
                    None
                } else {
                    let body = serde_json::to_value(&variables)
                        .map_err(|e| QueryError::Decode(e.to_string()))?;
                    Some(body)
                };
                http.send::<O>(method, &descriptor.url, body, descriptor.request_config.as_ref())
                    .await
            })
        })
    }

    pub const fn method(&self) -> Method {
        self.method
    }

    pub fn descriptor(&self) -> &QueryDescriptor {
        &self.descriptor
    }
}

impl<O> RestMutation<(), O>
where
    O: DeserializeOwned + Send + 'static,
{
    pub fn delete(descriptor: QueryDescriptor, clients: &ClientRegistry) -> Self {
        Self::with_method(Method::Delete, descriptor, clients)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mutation_result_data() {
        let result = MutationResult {
            state: MutationState::Success(42),
        };
        assert_eq!(result.data(), Some(&42));

        let result: MutationResult<i32> = MutationResult::idle();
        assert_eq!(result.data(), None);

        let result: MutationResult<i32> = MutationResult::loading();
        assert_eq!(result.data(), None);

        let result: MutationResult<i32> = Err(QueryError::FetchError("error".to_string())).into();
        assert_eq!(result.data(), None);
        assert_eq!(
            result.error_value(),
            Some(&QueryError::FetchError("error".to_string()))
        );
    }

    #[test]
    fn test_mutation_result_predicates() {
        let idle: MutationResult<i32> = MutationResult::default();
        assert!(!idle.is_loading());
        assert!(!idle.is_success());
        assert!(!idle.is_error());

        let loading: MutationResult<i32> = MutationResult::loading();
        assert!(loading.is_loading());
        assert!(!loading.is_success());
        assert!(!loading.is_error());

        let success: MutationResult<i32> = Ok(42).into();
        assert!(!success.is_loading());
        assert!(success.is_success());
        assert!(!success.is_error());

        let error: MutationResult<i32> = Err(QueryError::NetworkError("down".to_string())).into();
        assert!(!error.is_loading());
        assert!(!error.is_success());
        assert!(error.is_error());
    }

    #[tokio::test]
    async fn test_mutate_runs_producer() {
        let cmd = Mutation::mutate(20, |n: i32| Box::pin(async move { Ok::<_, QueryError>(n + 1) }));
        let results = cmd.run().await;
        assert_eq!(results, vec![Ok(21)]);
    }
}
