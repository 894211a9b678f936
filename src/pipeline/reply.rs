//! What the avatar says back.

use crate::config::ReplyMode;

const ECHO_PREFIX: &str = "You said: ";

/// The AI side of a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    /// Text appended to the log as an AI message, if any.
    pub message: Option<String>,
    /// Text sent to speech synthesis.
    pub speech: String,
}

/// Build the reply to `user_text`.
///
/// `Direct` speaks the user's own words and adds nothing to the log;
/// `Echo` answers `"You said: <text>"` and speaks that.
pub fn compose_reply(mode: ReplyMode, user_text: &str) -> Reply {
    match mode {
        ReplyMode::Direct => Reply {
            message: None,
            speech: user_text.to_string(),
        },
        ReplyMode::Echo => {
            let text = format!("{ECHO_PREFIX}{user_text}");
            Reply {
                message: Some(text.clone()),
                speech: text,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn direct_speaks_user_text() {
        let reply = compose_reply(ReplyMode::Direct, "hello there");
        assert_eq!(reply.message, None);
        assert_eq!(reply.speech, "hello there");
    }

    #[test]
    fn echo_prefixes_and_logs() {
        let reply = compose_reply(ReplyMode::Echo, "hello there");
        assert_eq!(reply.message.as_deref(), Some("You said: hello there"));
        assert_eq!(reply.speech, "You said: hello there");
    }
}
