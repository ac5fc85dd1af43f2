//! Client-side plumbing for the XMTP agent tools.
//!
//! The XMTP protocol engine itself (MLS sessions, encryption, the local
//! encrypted database) lives in a helper process hosting the vendor SDK. This
//! crate owns everything on the near side of that seam: environment
//! configuration, the domain types the tools trade in, the [`XmtpApi`]
//! capability trait, and [`SidecarXmtp`], the production client that drives
//! the helper over newline-delimited JSON.

pub mod api;
pub mod config;
pub mod error;
pub mod sidecar;
pub mod time;
pub mod types;

pub use api::XmtpApi;
pub use config::{Config, ConfigError, XmtpEnv};
pub use error::XmtpError;
pub use sidecar::SidecarXmtp;
pub use types::{
    AgentIdentity, ConsentState, Conversation, ConversationId, ConversationKind, EthAddress,
    InboxId, InvalidAddress, Message, MessageContent, XmtpEvent,
};
