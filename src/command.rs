use futures::{
    FutureExt, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// A one-shot side effect that eventually produces messages.
///
/// Mutations and cache operations return commands instead of running
/// immediately, so the caller decides when and where they are driven. A
/// command is a lazy stream of messages: nothing happens until the stream is
/// polled.
///
/// # Examples
///
/// ```
/// use rest_queries::command::Command;
///
/// enum Message {
///     GotResult(i32),
/// }
///
/// let cmd = Command::future(async { 42 }).map(Message::GotResult);
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Msg>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// Create a command that does nothing.
    ///
    /// ```
    /// use rest_queries::command::Command;
    ///
    /// let cmd: Command<i32> = Command::none();
    /// assert!(cmd.is_none());
    /// ```
    pub fn none() -> Self {
        Self { stream: None }
    }

    /// Create a command from a future that produces a message.
    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().boxed()),
        }
    }

    /// Batch multiple commands into a single command.
    ///
    /// All commands run concurrently and the order in which messages arrive
    /// is not guaranteed. `Command::none()` entries are dropped.
    ///
    /// ```
    /// use rest_queries::command::Command;
    ///
    /// let cmd = Command::batch(vec![
    ///     Command::future(async { 1 }),
    ///     Command::none(),
    ///     Command::future(async { 2 }),
    /// ]);
    /// assert!(!cmd.is_none());
    /// ```
    pub fn batch(commands: impl IntoIterator<Item = Command<Msg>>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Create a command that runs `future` for its effect and produces no
    /// message.
    pub fn effect(future: impl Future<Output = ()> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().filter_map(|()| async { None }).boxed()),
        }
    }

    /// Convert every message this command produces.
    ///
    /// ```
    /// use rest_queries::command::Command;
    ///
    /// let cmd: Command<String> = Command::future(async { 7 }).map(|n| n.to_string());
    /// ```
    pub fn map<U: Send + 'static>(self, f: impl Fn(Msg) -> U + Send + 'static) -> Command<U> {
        Command {
            stream: self.stream.map(|stream| stream.map(f).boxed()),
        }
    }

    /// `true` when the command has nothing to run.
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }

    /// Hands the command over for driving. `Command::none()` becomes an empty
    /// stream.
    pub fn into_stream(self) -> BoxStream<'static, Msg> {
        self.stream.unwrap_or_else(|| stream::empty().boxed())
    }

    /// Drives the command to completion and collects its messages.
    pub async fn run(self) -> Vec<Msg> {
        self.into_stream().collect().await
    }
}
