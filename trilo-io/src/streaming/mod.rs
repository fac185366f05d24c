//! Command channel and video relay for TriloIO

pub mod frame_buffer;
pub mod messages;
pub mod server;
pub mod session;
pub mod video_relay;
pub mod wire;

pub use frame_buffer::{Frame, FrameBuffer};
pub use messages::{Command, ProtocolError, Reply, Status};
pub use server::{CommandServer, ListenerWaker, ServerConfig, SessionInfo};
pub use session::{SessionEnd, SessionHandler, SessionState};
pub use video_relay::{MAX_DATAGRAM_PAYLOAD, VideoRelay};
pub use wire::{LineBuffer, MAX_LINE_LEN, encode_line};
