//! FTSP root arbitration: sequence-number driven, lower node id wins.
//!
//! Grounded on `_ftsp_send_beacon`/`ftsp_mac_read` in
//! `examples/original_source/sys/net/clocksync/ftsp/ftsp.c`.

pub const NO_ROOT: u16 = 0xFFFF;
pub const ROOT_TIMEOUT_INTERVALS: u32 = 3;
pub const IGNORE_ROOT_MSG_INTERVALS: u32 = 4;
pub const PREFERRED_ROOT: u16 = 1;

pub struct RootState {
    pub node_id: u16,
    pub root_id: u16,
    pub seq: u16,
    pub heart_beats: u32,
}

impl RootState {
    pub fn new(node_id: u16) -> Self {
        let root_id = if node_id == PREFERRED_ROOT { node_id } else { NO_ROOT };
        RootState { node_id, root_id, seq: 0, heart_beats: 0 }
    }

    pub fn is_root(&self) -> bool {
        self.root_id == self.node_id
    }

    /// Called once per beacon-interval tick, before sending. Declares self
    /// root if no root has been heard from within `ROOT_TIMEOUT_INTERVALS`.
    pub fn on_beacon_tick(&mut self) -> bool {
        if self.root_id == NO_ROOT {
            self.heart_beats += 1;
            if self.heart_beats >= ROOT_TIMEOUT_INTERVALS {
                self.seq = 0;
                self.root_id = self.node_id;
                return true;
            }
        } else if !self.is_root() && self.heart_beats >= ROOT_TIMEOUT_INTERVALS {
            self.heart_beats = 0;
            self.root_id = self.node_id;
            self.seq += 1;
            return true;
        }
        false
    }

    /// Process a received beacon's `(id, root, seq)` triple. Returns true if
    /// this beacon should be forwarded into the sync table.
    pub fn on_beacon_received(&mut self, _sender_id: u16, sender_root: u16, sender_seq: u16) -> bool {
        let recently_self_declared = self.heart_beats < IGNORE_ROOT_MSG_INTERVALS && self.is_root();

        let accepted = if sender_root < self.root_id && !recently_self_declared {
            self.root_id = sender_root;
            self.seq = sender_seq;
            true
        } else if self.root_id == sender_root && sender_seq > self.seq {
            self.seq = sender_seq;
            true
        } else {
            false
        };

        if accepted && self.root_id < self.node_id {
            self.heart_beats = 0;
        }
        accepted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn preferred_root_declares_itself_immediately() {
        let state = RootState::new(PREFERRED_ROOT);
        assert!(state.is_root());
    }

    #[test]
    fn non_root_times_out_to_self_when_no_root_heard() {
        let mut state = RootState::new(5);
        assert!(!state.is_root());
        for _ in 0..ROOT_TIMEOUT_INTERVALS {
            state.on_beacon_tick();
        }
        assert!(state.is_root());
    }

    #[test]
    fn lower_id_root_wins_tie_break() {
        // Node 10 currently believes node 50 is root (not itself, so the
        // recently-self-declared guard doesn't apply); a beacon claiming a
        // lower root id always preempts it.
        let mut state = RootState::new(10);
        state.root_id = 50;
        let accepted = state.on_beacon_received(3, 3, 7);
        assert!(accepted);
        assert_eq!(state.root_id, 3);
        assert_eq!(state.seq, 7);
    }

    #[test]
    fn root_field_is_compared_not_sender_id() {
        // Sender id 2 is lower than the current root (50), but it is
        // forwarding a beacon whose claimed root (60) is higher: the
        // candidate must be rejected on the root field, not accepted on the
        // sender's own (lower) id.
        let mut state = RootState::new(10);
        state.root_id = 50;
        let accepted = state.on_beacon_received(2, 60, 7);
        assert!(!accepted);
        assert_eq!(state.root_id, 50);
    }

    #[test]
    fn higher_root_candidate_rejected() {
        let mut state = RootState::new(2);
        state.root_id = 2;
        let accepted = state.on_beacon_received(9, 9, 1);
        assert!(!accepted);
        assert_eq!(state.root_id, 2);
    }

    #[test]
    fn newer_sequence_from_known_root_is_accepted() {
        let mut state = RootState::new(5);
        state.root_id = 1;
        state.seq = 3;
        assert!(state.on_beacon_received(1, 1, 4));
        assert_eq!(state.seq, 4);
        assert!(!state.on_beacon_received(1, 1, 4));
    }
}
