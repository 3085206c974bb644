//! Request pipeline: request line -> tokens -> command -> response.

use crate::command::Services;
use crate::error::CommandError;
use crate::factory::CommandFactory;
use crate::session::Session;
use cryptowallet_protocol::{ProtocolError, Request, Response};

/// Runs request lines for the reactor.
pub struct CommandHandler {
    factory: CommandFactory,
}

impl CommandHandler {
    pub fn new(services: Services) -> Self {
        Self {
            factory: CommandFactory::new(services),
        }
    }

    /// Handles one request line and returns the response to write back.
    ///
    /// Every failure becomes an error response; the caller decides whether to
    /// close the connection by checking [`Session::is_closing`].
    pub fn handle_line(&self, session: &mut Session, line: &str) -> Response {
        session.record_request();

        match self.run(session, line) {
            Ok(text) => {
                tracing::debug!("{} ok: {}", session.id, first_word_after_marker(line));
                Response::ok(text)
            }
            Err(e) => self.error_response(session, e),
        }
    }

    /// Builds the response for a line the decoder rejected.
    pub fn handle_protocol_error(&self, session: &mut Session, err: ProtocolError) -> Response {
        session.record_request();
        self.error_response(session, err.into())
    }

    fn run(&self, session: &mut Session, line: &str) -> Result<String, CommandError> {
        let request = Request::parse(line)?;
        let command = self.factory.create(&request.verb, &request.args, session)?;
        command.execute()
    }

    fn error_response(&self, session: &Session, err: CommandError) -> Response {
        let code = err.error_code();
        tracing::debug!("{} {}: {}", session.id, code, err);
        Response::error(code, err.to_string())
    }
}

/// Verb of a request line, for logs. Arguments (passwords) are never logged.
fn first_word_after_marker(line: &str) -> &str {
    line.split_whitespace().nth(1).unwrap_or("")
}
