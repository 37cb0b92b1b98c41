use super::message::IrcMessage;
use super::numerics::*;

/// Helpers to build the lines the redirect service sends. All functions
/// return formatted strings without a terminator; the composer appends
/// the configured line ending.

const UNAVAILABLE_TEXT: &str = "This service is unavailable";
const REDIRECT_TEXT: &str = "Port redirect";

/// :irc.example.org NOTICE * :text
pub fn notice(server_name: &str, text: &str) -> String {
    IrcMessage::server_reply(
        server_name,
        NOTICE,
        vec![UNREGISTERED_TARGET.into()],
        text,
    )
    .format()
}

/// :irc.example.org 010 * host port :Port redirect
pub fn rpl_redir(server_name: &str, host: &str, port: u16) -> String {
    IrcMessage::server_reply(
        server_name,
        RPL_REDIR,
        vec![UNREGISTERED_TARGET.into(), host.into(), port.to_string()],
        REDIRECT_TEXT,
    )
    .format()
}

/// :irc.example.org 005 * :Try server host, port port
pub fn rpl_bounce(server_name: &str, host: &str, port: u16) -> String {
    IrcMessage::server_reply(
        server_name,
        RPL_BOUNCE,
        vec![UNREGISTERED_TARGET.into()],
        format!("Try server {}, port {}", host, port),
    )
    .format()
}

/// ERROR :This service is unavailable
pub fn error_unavailable() -> String {
    IrcMessage {
        prefix: None,
        command: ERROR.into(),
        params: vec![],
        trailing: Some(UNAVAILABLE_TEXT.into()),
    }
    .format()
}
