//! The outcome of a completed run.

use crate::message::Message;
use crate::usage::RunUsage;

/// A successful agent run: the typed output plus the run's record.
#[derive(Debug, Clone, PartialEq)]
pub struct RunResult<O> {
    /// The validated final output.
    pub output: O,
    /// Total usage for the run's delegation tree.
    pub usage: RunUsage,
    /// Number of steps the run took.
    pub steps: usize,
    messages: Vec<Message>,
    new_messages_start: usize,
}

impl<O> RunResult<O> {
    pub(crate) fn new(
        output: O,
        messages: Vec<Message>,
        new_messages_start: usize,
        usage: RunUsage,
        steps: usize,
    ) -> Self {
        Self {
            output,
            usage,
            steps,
            messages,
            new_messages_start,
        }
    }

    /// The full message history, including any prior history passed in.
    #[must_use]
    pub fn all_messages(&self) -> &[Message] {
        &self.messages
    }

    /// Only the messages produced by this run.
    ///
    /// Suitable as `message_history` for a follow-up run together with the
    /// prior history.
    #[must_use]
    pub fn new_messages(&self) -> &[Message] {
        &self.messages[self.new_messages_start..]
    }

    /// Consume the result, keeping the full history.
    #[must_use]
    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }

    /// Consume the result, keeping only the output.
    pub fn into_output(self) -> O {
        self.output
    }
}
