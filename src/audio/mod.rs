pub mod capture;
pub mod playback;
pub mod processing;
pub mod wav;
