//! Real-time control channel.
//!
//! Blocks on a datagram endpoint, decodes divisor messages, and retunes the
//! shared period cell. Runs on its own thread so a slow or absent sender
//! never disturbs the output driver. A malformed message or a single failed
//! receive is logged and the channel keeps listening; only endpoint setup
//! failures are fatal, and those happen before the thread starts.

use crate::context::PulseContext;
use pulsegen_common::{PulseError, PulseResult};
use std::sync::mpsc;
use std::sync::Arc;
use tracing::{info, warn};

/// Maximum accepted control message length in bytes.
pub const CONTROL_MSG_MAX: usize = 128;

/// Blocking datagram endpoint for control messages.
///
/// `recv` fills `buf` and returns the datagram length. `Ok(0)` means the
/// endpoint is closed and the channel should exit; an `Err` is a transient
/// receive failure the channel logs and survives.
pub trait ControlEndpoint: Send {
    /// Block until a datagram arrives.
    fn recv(&mut self, buf: &mut [u8]) -> PulseResult<usize>;
}

/// Parse the leading decimal integer of a control payload as a divisor.
///
/// The payload is bounded at the first NUL; leading ASCII whitespace is
/// skipped. A payload with no digits, an overflowing value, or a divisor of
/// zero is rejected — division by zero must never reach the driver.
///
/// # Errors
///
/// Returns [`PulseError::InvalidDivisor`] describing the rejected payload.
pub fn parse_divisor(payload: &[u8]) -> PulseResult<u64> {
    let end = payload.iter().position(|&b| b == 0).unwrap_or(payload.len());
    let text = &payload[..end];

    let mut digits = text
        .iter()
        .skip_while(|b| b.is_ascii_whitespace())
        .peekable();

    let mut value: u64 = 0;
    let mut seen_digit = false;
    while let Some(&b) = digits.peek() {
        if !b.is_ascii_digit() {
            break;
        }
        digits.next();
        seen_digit = true;
        value = value
            .checked_mul(10)
            .and_then(|v| v.checked_add(u64::from(b - b'0')))
            .ok_or_else(|| PulseError::InvalidDivisor(preview(text)))?;
    }

    if !seen_digit {
        return Err(PulseError::InvalidDivisor(preview(text)));
    }
    if value == 0 {
        return Err(PulseError::InvalidDivisor("divisor must be nonzero".into()));
    }
    Ok(value)
}

/// Short printable preview of a rejected payload for diagnostics.
fn preview(text: &[u8]) -> String {
    let shown = &text[..text.len().min(32)];
    format!("unparsable payload {:?}", String::from_utf8_lossy(shown))
}

/// Control channel: one endpoint, one shared context.
pub struct ControlChannel<E: ControlEndpoint> {
    endpoint: E,
    ctx: Arc<PulseContext>,
}

impl<E: ControlEndpoint> ControlChannel<E> {
    /// Create a channel over an already-bound endpoint.
    pub fn new(endpoint: E, ctx: Arc<PulseContext>) -> Self {
        Self { endpoint, ctx }
    }

    /// Serve divisor messages until the endpoint closes or shutdown is
    /// requested. Never returns an error: runtime receive failures are
    /// contained here by contract.
    pub fn run(&mut self) {
        let mut buf = [0u8; CONTROL_MSG_MAX];

        loop {
            if self.ctx.shutdown_requested() {
                break;
            }

            buf.fill(0);
            match self.endpoint.recv(&mut buf) {
                Ok(0) => {
                    info!("control endpoint closed");
                    break;
                }
                Ok(len) => self.apply(&buf[..len.min(CONTROL_MSG_MAX)]),
                Err(e) => {
                    if self.ctx.shutdown_requested() {
                        break;
                    }
                    warn!(error = %e, "control receive failed, continuing");
                }
            }
        }

        info!("control channel stopped");
    }

    fn apply(&self, payload: &[u8]) {
        match parse_divisor(payload) {
            Ok(divisor) => {
                let (old, new) = self.ctx.period.divide(divisor);
                info!(divisor, old_period_ns = old, new_period_ns = new, "period retuned");
            }
            Err(e) => {
                warn!(error = %e, "control message rejected, period unchanged");
            }
        }
    }
}

/// In-memory endpoint backed by an mpsc queue, for tests and simulated runs.
pub struct MessageQueueEndpoint {
    rx: mpsc::Receiver<Vec<u8>>,
}

impl MessageQueueEndpoint {
    /// Create a sender/endpoint pair.
    #[must_use]
    pub fn pair() -> (mpsc::Sender<Vec<u8>>, Self) {
        let (tx, rx) = mpsc::channel();
        (tx, Self { rx })
    }
}

impl ControlEndpoint for MessageQueueEndpoint {
    fn recv(&mut self, buf: &mut [u8]) -> PulseResult<usize> {
        match self.rx.recv() {
            Ok(msg) => {
                let len = msg.len().min(buf.len());
                buf[..len].copy_from_slice(&msg[..len]);
                Ok(len)
            }
            // All senders dropped: the endpoint is closed, not failing.
            Err(mpsc::RecvError) => Ok(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_simple_divisor() {
        assert_eq!(parse_divisor(b"2").unwrap(), 2);
        assert_eq!(parse_divisor(b"10").unwrap(), 10);
    }

    #[test]
    fn test_parse_stops_at_nul_and_trailing_garbage() {
        assert_eq!(parse_divisor(b"4\0\0\0garbage").unwrap(), 4);
        assert_eq!(parse_divisor(b"3x").unwrap(), 3);
        assert_eq!(parse_divisor(b"  7\n").unwrap(), 7);
    }

    #[test]
    fn test_parse_rejects_zero() {
        assert!(matches!(
            parse_divisor(b"0"),
            Err(PulseError::InvalidDivisor(_))
        ));
    }

    #[test]
    fn test_parse_rejects_non_numeric() {
        assert!(parse_divisor(b"notanumber").is_err());
        assert!(parse_divisor(b"").is_err());
        assert!(parse_divisor(b"-2").is_err());
        assert!(parse_divisor(b"\0").is_err());
    }

    #[test]
    fn test_parse_rejects_overflow() {
        assert!(parse_divisor(b"99999999999999999999999").is_err());
    }

    #[test]
    fn test_channel_applies_divisor() {
        let ctx = Arc::new(PulseContext::new(100_000_000));
        let (tx, endpoint) = MessageQueueEndpoint::pair();
        let mut channel = ControlChannel::new(endpoint, Arc::clone(&ctx));

        tx.send(b"2".to_vec()).unwrap();
        drop(tx); // close after one message so run() returns

        channel.run();
        assert_eq!(ctx.period.get(), 50_000_000);
    }

    #[test]
    fn test_bad_messages_leave_period_unchanged() {
        let ctx = Arc::new(PulseContext::new(100_000_000));
        let (tx, endpoint) = MessageQueueEndpoint::pair();
        let mut channel = ControlChannel::new(endpoint, Arc::clone(&ctx));

        tx.send(b"0".to_vec()).unwrap();
        tx.send(b"notanumber".to_vec()).unwrap();
        tx.send(b"5".to_vec()).unwrap();
        drop(tx);

        // The two bad messages must not kill the channel; the good one
        // still lands.
        channel.run();
        assert_eq!(ctx.period.get(), 20_000_000);
    }
}
