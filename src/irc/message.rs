/// An outbound IRC protocol message per RFC 2812.
///
/// Wire format: `[:prefix] COMMAND [middle...] [:trailing]`
///
/// Examples:
///   `:irc.example.org NOTICE * :Hello`
///   `:irc.example.org 010 * irc.example.net 6669 :Port redirect`
///   `ERROR :This service is unavailable`
///
/// The trailing parameter is always written with its leading colon, even
/// when it is empty or has no spaces, so clients see the text verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrcMessage {
    pub prefix: Option<String>,
    pub command: String,
    pub params: Vec<String>,
    pub trailing: Option<String>,
}

impl IrcMessage {
    /// Create a message sent on behalf of the server.
    pub fn server_reply(
        server_name: &str,
        command: &str,
        params: Vec<String>,
        trailing: impl Into<String>,
    ) -> Self {
        IrcMessage {
            prefix: Some(server_name.to_string()),
            command: command.to_string(),
            params,
            trailing: Some(trailing.into()),
        }
    }

    /// Format this message to IRC wire format (without line terminator).
    pub fn format(&self) -> String {
        let mut out = String::with_capacity(512);

        if let Some(ref prefix) = self.prefix {
            out.push(':');
            out.push_str(prefix);
            out.push(' ');
        }

        out.push_str(&self.command);

        for param in &self.params {
            out.push(' ');
            out.push_str(param);
        }

        if let Some(ref trailing) = self.trailing {
            out.push_str(" :");
            out.push_str(trailing);
        }

        out
    }
}

impl std::fmt::Display for IrcMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.format())
    }
}
