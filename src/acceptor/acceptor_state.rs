use std::fmt;

/// AcceptorState indicates the lifecycle state shared by every transport.
///
/// The happy path is `None → Accepting → Open → Closing → Closed`; a
/// rejected connection goes `None → Rejecting → Closed`; a server-side
/// listener may re-open with `Closed → Opening → Open`.
#[derive(Default, Debug, Copy, Clone, PartialEq, Eq)]
pub enum AcceptorState {
    /// Freshly constructed; neither accept nor reject has been called.
    #[default]
    None,

    /// accept() has begun; callbacks are being registered.
    Accepting,

    /// Fully connected; outbound calls pass the readiness check.
    Open,

    /// reject() has begun; the connection is being refused.
    Rejecting,

    /// close() has begun or the peer initiated a close; pending calls are
    /// being drained.
    Closing,

    /// Shut down; the pending-call table is empty.
    Closed,

    /// A server-side listener is binding (initial open or re-open).
    Opening,
}

const ACCEPTOR_STATE_NONE_STR: &str = "none";
const ACCEPTOR_STATE_ACCEPTING_STR: &str = "accepting";
const ACCEPTOR_STATE_OPEN_STR: &str = "open";
const ACCEPTOR_STATE_REJECTING_STR: &str = "rejecting";
const ACCEPTOR_STATE_CLOSING_STR: &str = "closing";
const ACCEPTOR_STATE_CLOSED_STR: &str = "closed";
const ACCEPTOR_STATE_OPENING_STR: &str = "opening";

impl From<&str> for AcceptorState {
    fn from(raw: &str) -> Self {
        match raw {
            ACCEPTOR_STATE_ACCEPTING_STR => AcceptorState::Accepting,
            ACCEPTOR_STATE_OPEN_STR => AcceptorState::Open,
            ACCEPTOR_STATE_REJECTING_STR => AcceptorState::Rejecting,
            ACCEPTOR_STATE_CLOSING_STR => AcceptorState::Closing,
            ACCEPTOR_STATE_CLOSED_STR => AcceptorState::Closed,
            ACCEPTOR_STATE_OPENING_STR => AcceptorState::Opening,
            _ => AcceptorState::None,
        }
    }
}

impl From<u8> for AcceptorState {
    fn from(v: u8) -> Self {
        match v {
            1 => AcceptorState::Accepting,
            2 => AcceptorState::Open,
            3 => AcceptorState::Rejecting,
            4 => AcceptorState::Closing,
            5 => AcceptorState::Closed,
            6 => AcceptorState::Opening,
            _ => AcceptorState::None,
        }
    }
}

impl From<AcceptorState> for u8 {
    fn from(state: AcceptorState) -> Self {
        match state {
            AcceptorState::None => 0,
            AcceptorState::Accepting => 1,
            AcceptorState::Open => 2,
            AcceptorState::Rejecting => 3,
            AcceptorState::Closing => 4,
            AcceptorState::Closed => 5,
            AcceptorState::Opening => 6,
        }
    }
}

impl fmt::Display for AcceptorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match *self {
            AcceptorState::None => ACCEPTOR_STATE_NONE_STR,
            AcceptorState::Accepting => ACCEPTOR_STATE_ACCEPTING_STR,
            AcceptorState::Open => ACCEPTOR_STATE_OPEN_STR,
            AcceptorState::Rejecting => ACCEPTOR_STATE_REJECTING_STR,
            AcceptorState::Closing => ACCEPTOR_STATE_CLOSING_STR,
            AcceptorState::Closed => ACCEPTOR_STATE_CLOSED_STR,
            AcceptorState::Opening => ACCEPTOR_STATE_OPENING_STR,
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_new_acceptor_state() {
        let tests = vec![
            ("none", AcceptorState::None),
            ("accepting", AcceptorState::Accepting),
            ("open", AcceptorState::Open),
            ("rejecting", AcceptorState::Rejecting),
            ("closing", AcceptorState::Closing),
            ("closed", AcceptorState::Closed),
            ("opening", AcceptorState::Opening),
        ];

        for (state_string, expected_state) in tests {
            assert_eq!(
                AcceptorState::from(state_string),
                expected_state,
                "testCase: {expected_state}",
            );
        }
    }

    #[test]
    fn test_acceptor_state_string() {
        let tests = vec![
            (AcceptorState::None, "none"),
            (AcceptorState::Accepting, "accepting"),
            (AcceptorState::Open, "open"),
            (AcceptorState::Rejecting, "rejecting"),
            (AcceptorState::Closing, "closing"),
            (AcceptorState::Closed, "closed"),
            (AcceptorState::Opening, "opening"),
        ];

        for (state, expected_string) in tests {
            assert_eq!(state.to_string(), expected_string)
        }
    }

    #[test]
    fn test_acceptor_state_u8_round_trip() {
        for v in 0..=6u8 {
            let state = AcceptorState::from(v);
            assert_eq!(u8::from(state), v);
        }
    }
}
