//! Wire messages exchanged between a `SignalingClient` and `SignalingService`.
//!
//! Carried as `bincode`-serialized payloads inside `Connection::send_prefix_size`
//! frames, the same length-prefixing scheme the rest of the transport layer
//! uses for variable-length data.

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum SignalingRequest {
    RequestContext {
        name: String,
    },
    RequestVaddr {
        context_id: u32,
        data_uri: String,
        ctrl_uri: String,
    },
    LookupVaddr {
        context_id: u32,
        vaddr: u32,
    },
    LeaveContext {
        name: String,
    },
}

#[derive(Serialize, Deserialize, Debug, Clone)]
pub enum SignalingResponse {
    ContextId(u32),
    Vaddr(u32),
    /// `("", "")` is the "not yet registered, retry" sentinel.
    Uris(String, String),
    Ack,
}
