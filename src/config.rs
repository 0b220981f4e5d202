//! Server configuration
//!
//! Every option can come from the command line or the environment.

use std::num::NonZeroUsize;

use clap::Parser;

use crate::hub::HubConfig;

/// Default server address
pub const DEFAULT_ADDR: &str = "127.0.0.1:8080";

/// Community chat server options
#[derive(Debug, Clone, Parser)]
#[command(name = "community_chat", version, about)]
pub struct ServerConfig {
    /// Address to listen on
    #[arg(long, env = "CHAT_ADDR", default_value = DEFAULT_ADDR)]
    pub addr: String,

    /// Live messages a client may lag behind before it is disconnected
    #[arg(long, env = "CHAT_MAILBOX_CAPACITY", default_value = "64")]
    pub mailbox_capacity: NonZeroUsize,

    /// Pending commands per hub before senders wait
    #[arg(long, env = "CHAT_HUB_BUFFER", default_value = "256")]
    pub hub_buffer: NonZeroUsize,

    /// Origins allowed to open a WebSocket (repeatable; empty allows any)
    #[arg(
        long = "allowed-origin",
        env = "CHAT_ALLOWED_ORIGINS",
        value_delimiter = ','
    )]
    pub allowed_origins: Vec<String>,
}

impl ServerConfig {
    /// Channel sizing handed to every hub
    pub fn hub_config(&self) -> HubConfig {
        HubConfig {
            mailbox_capacity: self.mailbox_capacity.get(),
            command_buffer: self.hub_buffer.get(),
        }
    }

    /// Whether a handshake carrying `origin` may proceed
    pub fn origin_allowed(&self, origin: Option<&str>) -> bool {
        if self.allowed_origins.is_empty() {
            return true;
        }
        origin.is_some_and(|origin| {
            self.allowed_origins
                .iter()
                .any(|allowed| allowed.eq_ignore_ascii_case(origin))
        })
    }
}
