//! Pure pipeline core: segmentation, gate, protocol and turn state.
//! Nothing in here touches a device or a socket.

pub mod audio;
pub mod gate;
pub mod protocol;
pub mod state;
pub mod telemetry;
pub mod time;
