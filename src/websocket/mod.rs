mod handler;
mod message;
pub mod session;

pub use handler::{ws_handler, WsQuery};
pub use message::{MessageKind, OutboundMessage, RoomMessage};
pub use session::{AdmittedSession, ExitReason, SessionContext, SessionRequest, SessionSummary};
