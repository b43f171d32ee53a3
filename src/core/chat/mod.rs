//! Chat server identity bridge
//!
//! Lets a chat server delegate login to this service through its REST
//! authenticator protocol.

pub mod bridge;

pub use bridge::{
    BridgeError, BridgeRequest, BridgeResponse, ChatBridge, ChatRecord, NewAccount,
    chat_bridge_router,
};
