pub mod composer;
pub mod connection;
pub mod formatter;
pub mod listener;
pub mod message;
pub mod numerics;
