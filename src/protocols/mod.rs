pub mod ftsp;
pub mod gtsp;
pub mod pulsesync;
