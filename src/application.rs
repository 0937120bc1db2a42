use ratatui::Frame;

use crate::{command::Command, subscription::Subscription};

/// An application in the Elm style: state, messages, a view and subscriptions.
///
/// State only changes in [`update`](Application::update). Everything
/// asynchronous goes through the returned [`Command`] or through the
/// [`Subscription`]s derived from the current state.
///
/// # Example
///
/// ```
/// use ratatui::{Frame, widgets::Paragraph};
/// use tasklist::{application::Application, command::Command, subscription::Subscription};
///
/// enum Message {
///     Typed(char),
///     Cleared,
/// }
///
/// struct SearchBox {
///     text: String,
/// }
///
/// impl Application for SearchBox {
///     type Message = Message;
///     type Flags = String;
///
///     fn new(text: String) -> (Self, Command<Message>) {
///         (SearchBox { text }, Command::none())
///     }
///
///     fn update(&mut self, msg: Message) -> Command<Message> {
///         match msg {
///             Message::Typed(c) => self.text.push(c),
///             Message::Cleared => self.text.clear(),
///         }
///         Command::none()
///     }
///
///     fn view(&self, frame: &mut Frame<'_>) {
///         frame.render_widget(Paragraph::new(self.text.as_str()), frame.area());
///     }
///
///     fn subscriptions(&self) -> Vec<Subscription<Message>> {
///         vec![]
///     }
/// }
/// ```
pub trait Application: Sized {
    type Message: Send + 'static;

    /// Data handed to [`new`](Application::new). Use `()` when none is needed.
    type Flags: Clone + Send;

    /// Builds the initial state and the command to run at startup.
    fn new(flags: Self::Flags) -> (Self, Command<Self::Message>);

    fn update(&mut self, msg: Self::Message) -> Command<Self::Message>;

    /// Renders the current state. Called at least once per frame, so it must
    /// not mutate anything.
    fn view(&self, frame: &mut Frame<'_>);

    /// The subscriptions the current state needs.
    ///
    /// Called after every update. Subscriptions are compared by id with the
    /// running ones: new ids start, missing ids are cancelled, and unchanged ids
    /// keep running.
    fn subscriptions(&self) -> Vec<Subscription<Self::Message>>;
}
