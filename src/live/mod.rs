//! # Live Examiner Session
//!
//! The real-time half of the speaking module: a bidirectional streaming
//! connection to the remote speech service, and the state machine that turns
//! its message stream into a practice session.
//!
//! ## Key Components:
//! - **Messages**: typed wire format plus the server-frame parser
//! - **Transport**: connection lifecycle, outbound frame queue, inbound
//!   event dispatch
//! - **Session**: per-session dispatch loop, turn/transcript aggregation,
//!   countdown, grading, persistence

pub mod messages;
pub mod session;
pub mod transport;
