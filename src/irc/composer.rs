use std::net::SocketAddr;

use crate::config::{ServiceConfig, Target};

use super::formatter;

/// Addressing information of one accepted connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionAddrs {
    pub local: SocketAddr,
    pub remote: SocketAddr,
}

/// The ordered, fully terminated lines to send on one connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessagePlan {
    lines: Vec<String>,
}

impl MessagePlan {
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Build the message plan for a session.
///
/// Introduction lines are sent as NOTICEs first. What follows depends on
/// the target:
/// - none: `ERROR :This service is unavailable`
/// - explicit: `RPL_REDIR` naming the target, then the ERROR line
/// - implicit: `RPL_BOUNCE` naming the target, or the session's local
///   address when no host is configured; no ERROR line
pub fn compose(config: &ServiceConfig, session: &SessionAddrs) -> MessagePlan {
    let eol = config.line_ending.as_str();
    let server = config.server_name.as_str();

    let mut lines: Vec<String> = Vec::with_capacity(config.introduction.len() + 2);
    lines.extend(
        config
            .introduction
            .iter()
            .map(|text| formatter::notice(server, text)),
    );

    match config.target {
        None => lines.push(formatter::error_unavailable()),
        Some(Target::Explicit { ref host, port }) => {
            lines.push(formatter::rpl_redir(server, host, port));
            lines.push(formatter::error_unavailable());
        }
        Some(Target::Implicit { ref host, port }) => {
            let host = match host {
                Some(h) => h.clone(),
                None => session.local.ip().to_string(),
            };
            lines.push(formatter::rpl_bounce(server, &host, port));
        }
    }

    for line in &mut lines {
        line.push_str(eol);
    }

    MessagePlan { lines }
}
