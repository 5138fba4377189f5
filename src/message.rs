//! Line protocol definitions
//!
//! Inbound lines decode once into a closed `Command` enum; outbound
//! lines are either a `Reply` token for the sender or a `Notice` that is
//! broadcast to other sessions.

use std::fmt;

use crate::error::ProtocolError;

/// Client → Server command, one per line
///
/// The first whitespace-delimited token selects the verb. Anything that
/// is not `SIGNUP` or `LOGIN` is chat text and is kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Register a new account
    Signup { username: String, password: String },
    /// Authenticate and bind the session's identity
    Login { username: String, password: String },
    /// Chat payload, relayed to everyone else as-is
    Chat { text: String },
}

impl Command {
    pub const SIGNUP: &'static str = "SIGNUP";
    pub const LOGIN: &'static str = "LOGIN";

    /// Decode a single line (without its terminator)
    ///
    /// Tokens after the password are ignored.
    pub fn parse(line: &str) -> Result<Self, ProtocolError> {
        let mut tokens = line.split_whitespace();
        let verb = match tokens.next() {
            Some(verb @ (Self::SIGNUP | Self::LOGIN)) => verb,
            _ => {
                return Ok(Command::Chat {
                    text: line.to_string(),
                })
            }
        };

        let (Some(username), Some(password)) = (tokens.next(), tokens.next()) else {
            let verb = if verb == Self::SIGNUP {
                Self::SIGNUP
            } else {
                Self::LOGIN
            };
            return Err(ProtocolError::MissingArguments { verb });
        };

        let username = username.to_string();
        let password = password.to_string();
        Ok(if verb == Self::SIGNUP {
            Command::Signup { username, password }
        } else {
            Command::Login { username, password }
        })
    }
}

/// Server → Client reply token, sent to the requesting session only
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    SignupSuccess,
    SignupFailed,
    LoginSuccess,
    LoginFailed,
    /// Credentials were fine but recording the online status failed
    StatusUpdateFailed,
    /// LOGIN on a session that already has an identity
    AlreadyLoggedIn,
    /// The credential store could not answer
    ServiceUnavailable,
}

impl Reply {
    /// Wire token for this reply
    pub fn as_str(&self) -> &'static str {
        match self {
            Reply::SignupSuccess => "SIGNUP_SUCCESS",
            Reply::SignupFailed => "SIGNUP_FAILED",
            Reply::LoginSuccess => "LOGIN_SUCCESS",
            Reply::LoginFailed => "LOGIN_FAILED",
            Reply::StatusUpdateFailed => "STATUS_UPDATE_FAILED",
            Reply::AlreadyLoggedIn => "ALREADY_LOGGED_IN",
            Reply::ServiceUnavailable => "SERVICE_UNAVAILABLE",
        }
    }
}

impl fmt::Display for Reply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Server-generated broadcast lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Sent to everyone after a successful SIGNUP
    SignedUp { username: String },
    /// Sent to everyone but the sender after a successful LOGIN
    Joined { username: String },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::SignedUp { username } => write!(f, "{} has signed up", username),
            Notice::Joined { username } => write!(f, "{} has joined the chat", username),
        }
    }
}
