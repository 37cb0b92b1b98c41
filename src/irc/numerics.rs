/// IRC numeric reply codes used by the redirect service.

// Connection registration
/// `RPL_BOUNCE` per RFC 2812: "Try server <server name>, port <port number>".
pub const RPL_BOUNCE: &str = "005";
/// `RPL_REDIR`: "<hostname> <port> :Please use this Server/Port instead".
pub const RPL_REDIR: &str = "010";

// Commands
pub const NOTICE: &str = "NOTICE";
pub const ERROR: &str = "ERROR";

/// Target used for messages sent before a client has registered a nick.
pub const UNREGISTERED_TARGET: &str = "*";
