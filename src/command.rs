use futures::{
    FutureExt, Stream, StreamExt,
    stream::{self, BoxStream, select_all},
};

/// What a command asks the runtime to do.
pub enum Action<Msg> {
    /// Deliver a message to [`Application::update`](crate::application::Application::update).
    Message(Msg),

    /// Stop the event loop. Subscriptions are torn down before the runtime returns.
    Quit,
}

impl<Msg> Action<Msg> {
    /// Maps the message, leaving `Quit` untouched.
    pub fn map<U>(self, f: impl FnOnce(Msg) -> U) -> Action<U> {
        match self {
            Self::Message(msg) => Action::Message(f(msg)),
            Self::Quit => Action::Quit,
        }
    }
}

/// A side effect returned from `new` or `update`, run by the runtime.
///
/// A command is a stream of [`Action`]s. The runtime spawns it and forwards
/// every action it yields, in order, until the stream ends.
///
/// # Examples
///
/// ```
/// use tasklist::command::Command;
///
/// enum Message {
///     Loaded(usize),
/// }
///
/// let cmd = Command::perform(async { 42 }, Message::Loaded);
/// ```
pub struct Command<Msg: Send + 'static> {
    pub(crate) stream: Option<BoxStream<'static, Action<Msg>>>,
}

impl<Msg: Send + 'static> Command<Msg> {
    /// A command that does nothing.
    #[must_use]
    pub fn none() -> Self {
        Self { stream: None }
    }

    #[must_use]
    pub const fn is_none(&self) -> bool {
        self.stream.is_none()
    }

    /// Runs `future` and converts its output into a message.
    pub fn perform<A>(
        future: impl Future<Output = A> + Send + 'static,
        f: impl FnOnce(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::future(future.map(f))
    }

    pub fn future(future: impl Future<Output = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(future.into_stream().map(Action::Message).boxed()),
        }
    }

    /// Delivers `msg` on the next turn of the event loop.
    pub fn message(msg: Msg) -> Self {
        Self::effect(Action::Message(msg))
    }

    /// Performs a single action.
    ///
    /// ```
    /// use tasklist::command::{Action, Command};
    ///
    /// let quit: Command<()> = Command::effect(Action::Quit);
    /// ```
    pub fn effect(action: Action<Msg>) -> Self {
        Self {
            stream: Some(stream::once(async move { action }).boxed()),
        }
    }

    /// Runs several commands concurrently. Arrival order across commands is not
    /// guaranteed; `none` commands are dropped.
    pub fn batch(commands: impl IntoIterator<Item = Self>) -> Self {
        let streams: Vec<_> = commands.into_iter().filter_map(|cmd| cmd.stream).collect();

        if streams.is_empty() {
            Self::none()
        } else {
            Self {
                stream: Some(select_all(streams).boxed()),
            }
        }
    }

    /// Delivers each stream item as a message.
    pub fn stream(stream: impl Stream<Item = Msg> + Send + 'static) -> Self {
        Self {
            stream: Some(stream.map(Action::Message).boxed()),
        }
    }

    pub fn run<A>(
        stream: impl Stream<Item = A> + Send + 'static,
        f: impl Fn(A) -> Msg + Send + 'static,
    ) -> Self {
        Self::stream(stream.map(f))
    }

    /// Converts the messages of this command, typically into a parent message type.
    ///
    /// ```
    /// use tasklist::command::Command;
    ///
    /// enum Message {
    ///     Count(i32),
    /// }
    ///
    /// let cmd: Command<Message> = Command::future(async { 1 }).map(Message::Count);
    /// ```
    pub fn map<U, F>(self, f: F) -> Command<U>
    where
        U: Send + 'static,
        F: Fn(Msg) -> U + Send + 'static,
    {
        Command {
            stream: self
                .stream
                .map(|stream| stream.map(move |action| action.map(&f)).boxed()),
        }
    }
}
