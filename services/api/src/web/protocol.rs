//! services/api/src/web/protocol.rs
//!
//! Defines the WebSocket message protocol between a client and the API server.
//! Every frame is a JSON object tagged by `type`.

use job_board_core::access::Access;
use job_board_core::connectivity::{BannerState, OfflineNotice};
use job_board_core::domain::{FetchError, Principal, QueryCondition, Role};
use serde::{Deserialize, Serialize};
use serde_json::Value;

//=========================================================================================
// Messages Sent FROM the Client TO the Server
//=========================================================================================

#[derive(Deserialize, Debug)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    SignUp {
        email: String,
        password: String,
        role: Role,
    },
    Login {
        email: String,
        password: String,
    },
    SignInWithGoogle,
    Logout,
    /// Picks a role after a social sign-in left it pending.
    SelectRole { role: Role },
    /// Reads a collection. `conditions` are `[field, op, value]` triples.
    FetchCollection {
        request_id: String,
        collection: String,
        #[serde(default)]
        conditions: Vec<QueryCondition>,
    },
    FetchDocument {
        request_id: String,
        collection: String,
        id: String,
    },
    ClearError,
}

//=========================================================================================
// Messages Sent FROM the Server TO the Client
//=========================================================================================

#[derive(Serialize, Debug, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// The current session; sent on connect and on every change.
    Session {
        principal: Option<Principal>,
        loading: bool,
    },
    Connectivity {
        online: bool,
        banner: BannerState,
    },
    /// A sign-up, login or role selection was rejected.
    AuthFailed { code: String, message: String },
    Collection {
        request_id: String,
        documents: Vec<Value>,
        error: Option<FetchError>,
        notice: OfflineNotice,
    },
    Document {
        request_id: String,
        document: Option<Value>,
        error: Option<FetchError>,
        notice: OfflineNotice,
    },
    AccessDenied { request_id: String, access: Access },
    /// The client sent something the server could not understand.
    Error { message: String },
}
