//! The boundary to the (out of scope) MAC layer: a single "send this frame
//! as a broadcast" call, matching
//! `sixlowpan_mac_send_ieee802154_frame(0, NULL, 8, ...)` in the original
//! source. A real 6LoWPAN/802.15.4 stack, or the simulation harness in
//! `tests/simulation_e2e.rs`, implements this trait; the protocol engines
//! never talk to a socket directly.

use anyhow::Result;

#[cfg_attr(test, mockall::automock)]
pub trait FrameSink: Send + Sync {
    fn send_broadcast(&self, payload: &[u8]) -> Result<()>;
}
