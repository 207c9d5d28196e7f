//! Fixed-width ASCII wire format for [`Message`].
//!
//! A frame is five decimal fields, each right-justified and zero-padded to
//! [`FIELD_WIDTH`] bytes, concatenated without delimiters:
//!
//! ```text
//! sender(25) | task(25) | bid_time(25) | winning_bid(25) | winning_agent(25)
//! ```
//!
//! `winning_bid` uses the C `%g` general format with
//! [`BID_SIGNIFICANT_DIGITS`] significant digits. An unassigned winner is
//! sent as `-1`; padding zeros go before the sign (`000…0-1`).

use bytes::{BufMut, Bytes, BytesMut};

use crate::{AgentId, DecodeError, Message, TaskId};

pub const FIELD_WIDTH: usize = 25;
pub const FRAME_LEN: usize = 5 * FIELD_WIDTH;
pub const BID_SIGNIFICANT_DIGITS: usize = 10;

const NO_WINNER: i64 = -1;

pub fn encode(msg: &Message) -> Bytes {
    let mut buf = BytesMut::with_capacity(FRAME_LEN);
    put_field(&mut buf, &msg.sender.0.to_string());
    put_field(&mut buf, &msg.task.0.to_string());
    put_field(&mut buf, &msg.bid_time.to_string());
    put_field(&mut buf, &format_general(msg.winning_bid, BID_SIGNIFICANT_DIGITS));
    let winner = msg
        .winning_agent
        .map(|a| i64::from(a.0))
        .unwrap_or(NO_WINNER);
    put_field(&mut buf, &winner.to_string());
    buf.freeze()
}

fn put_field(buf: &mut BytesMut, value: &str) {
    debug_assert!(value.len() <= FIELD_WIDTH, "field overflow: {value}");
    for _ in value.len()..FIELD_WIDTH {
        buf.put_u8(b'0');
    }
    buf.put_slice(value.as_bytes());
}

pub fn decode(frame: &[u8]) -> Result<Message, DecodeError> {
    if frame.len() != FRAME_LEN {
        return Err(DecodeError::WrongLength {
            expected: FRAME_LEN,
            actual: frame.len(),
        });
    }

    let sender = parse_int(field(frame, 0, "sender")?, "sender")?;
    let task = parse_int(field(frame, 1, "task")?, "task")?;
    let bid_time = parse_int(field(frame, 2, "bid_time")?, "bid_time")?;
    let winning_bid = parse_bid(field(frame, 3, "winning_bid")?)?;
    let winner = parse_int(field(frame, 4, "winning_agent")?, "winning_agent")?;

    let sender = u32::try_from(sender).map_err(|_| out_of_range("sender", sender))?;
    let task = usize::try_from(task).map_err(|_| out_of_range("task", task))?;
    let winning_agent = match winner {
        NO_WINNER => None,
        w => Some(AgentId(
            u32::try_from(w).map_err(|_| out_of_range("winning_agent", w))?,
        )),
    };
    if winning_agent.is_none() && winning_bid != 0.0 {
        return Err(DecodeError::OutOfRange {
            field: "winning_bid",
            value: winning_bid.to_string(),
        });
    }

    Ok(Message {
        sender: AgentId(sender),
        task: TaskId(task),
        bid_time,
        winning_bid,
        winning_agent,
    })
}

fn field<'a>(frame: &'a [u8], idx: usize, name: &'static str) -> Result<&'a str, DecodeError> {
    let raw = &frame[idx * FIELD_WIDTH..(idx + 1) * FIELD_WIDTH];
    if !raw.is_ascii() {
        return Err(DecodeError::NotAscii { field: name });
    }
    std::str::from_utf8(raw).map_err(|_| DecodeError::NotAscii { field: name })
}

fn strip_padding(raw: &str) -> &str {
    raw.trim_start_matches('0')
}

fn parse_int(raw: &str, name: &'static str) -> Result<i64, DecodeError> {
    let digits = strip_padding(raw);
    if digits.is_empty() {
        return Ok(0);
    }
    digits.parse::<i64>().map_err(|_| DecodeError::NotNumeric {
        field: name,
        value: raw.to_string(),
    })
}

fn parse_bid(raw: &str) -> Result<f64, DecodeError> {
    let digits = strip_padding(raw);
    if digits.is_empty() {
        return Ok(0.0);
    }
    let value = digits.parse::<f64>().map_err(|_| DecodeError::NotNumeric {
        field: "winning_bid",
        value: raw.to_string(),
    })?;
    if !value.is_finite() || value < 0.0 {
        return Err(DecodeError::OutOfRange {
            field: "winning_bid",
            value: raw.to_string(),
        });
    }
    Ok(value)
}

fn out_of_range(field: &'static str, value: i64) -> DecodeError {
    DecodeError::OutOfRange {
        field,
        value: value.to_string(),
    }
}

/// C `%g` formatting: `precision` significant digits, scientific notation
/// when the exponent is below -4 or at least `precision`, trailing zeros
/// removed.
pub fn format_general(value: f64, precision: usize) -> String {
    if value == 0.0 {
        return "0".to_string();
    }
    if !value.is_finite() {
        return value.to_string();
    }
    let precision = precision.max(1);

    let sci = format!("{:.*e}", precision - 1, value);
    let Some((mantissa, exp)) = sci.split_once('e') else {
        return sci;
    };
    let exp: i32 = exp.parse().unwrap_or(0);

    if exp < -4 || exp >= precision as i32 {
        let sign = if exp < 0 { '-' } else { '+' };
        format!("{}e{}{:02}", strip_fraction_zeros(mantissa), sign, exp.abs())
    } else {
        let decimals = (precision as i32 - 1 - exp).max(0) as usize;
        strip_fraction_zeros(&format!("{:.*}", decimals, value)).to_string()
    }
}

fn strip_fraction_zeros(s: &str) -> &str {
    if s.contains('.') {
        s.trim_end_matches('0').trim_end_matches('.')
    } else {
        s
    }
}

/// Round a bid to exactly what a peer will decode from the wire.
pub fn quantize_bid(value: f64) -> f64 {
    format_general(value, BID_SIGNIFICANT_DIGITS)
        .parse()
        .unwrap_or(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn msg(winner: Option<u32>, bid: f64) -> Message {
        Message {
            sender: AgentId(2),
            task: TaskId(5),
            bid_time: 1_700_000_000_123_456_789,
            winning_bid: bid,
            winning_agent: winner.map(AgentId),
        }
    }

    #[test]
    fn frame_layout_is_fixed_width() {
        let frame = encode(&msg(Some(2), 7.0));
        assert_eq!(frame.len(), FRAME_LEN);
        let text = std::str::from_utf8(&frame).unwrap();
        assert_eq!(&text[0..25], "0000000000000000000000002");
        assert_eq!(&text[25..50], "0000000000000000000000005");
        assert_eq!(&text[50..75], "0000001700000000123456789");
        assert_eq!(&text[75..100], "0000000000000000000000007");
        assert_eq!(&text[100..125], "0000000000000000000000002");
    }

    #[test]
    fn unassigned_winner_is_minus_one() {
        let frame = encode(&msg(None, 0.0));
        let text = std::str::from_utf8(&frame).unwrap();
        assert_eq!(&text[100..125], "00000000000000000000000-1");
        assert_eq!(&text[75..100], "0000000000000000000000000");

        let back = decode(&frame).unwrap();
        assert_eq!(back.winning_agent, None);
        assert_eq!(back.winning_bid, 0.0);
    }

    #[test]
    fn decode_restores_message() {
        let original = msg(Some(9), 0.7734);
        let back = decode(&encode(&original)).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn general_format_matches_printf() {
        assert_eq!(format_general(7.0, 10), "7");
        assert_eq!(format_general(0.77, 10), "0.77");
        assert_eq!(format_general(1.0 / 3.0, 10), "0.3333333333");
        assert_eq!(format_general(123456.789, 10), "123456.789");
        assert_eq!(format_general(1e20, 10), "1e+20");
        assert_eq!(format_general(123456789012.0, 10), "1.23456789e+11");
        assert_eq!(format_general(0.0001, 10), "0.0001");
        assert_eq!(format_general(0.00001234, 10), "1.234e-05");
        assert_eq!(format_general(9999999999.5, 10), "1e+10");
    }

    #[test]
    fn quantized_bids_survive_the_wire() {
        let bid = quantize_bid(2.0 / 7.0);
        assert_eq!(bid, 0.2857142857);
        let back = decode(&encode(&msg(Some(1), bid))).unwrap();
        assert_eq!(back.winning_bid, bid);
    }

    #[test]
    fn rejects_wrong_length() {
        let err = decode(b"0001").unwrap_err();
        assert_eq!(
            err,
            DecodeError::WrongLength {
                expected: FRAME_LEN,
                actual: 4
            }
        );
    }

    #[test]
    fn rejects_non_numeric_field() {
        let mut frame = encode(&msg(Some(2), 1.5)).to_vec();
        frame[30] = b'x';
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::NotNumeric { field: "task", .. })
        ));
    }

    #[test]
    fn rejects_negative_sender_and_bad_winner() {
        let mut frame = encode(&msg(Some(2), 1.5)).to_vec();
        frame[23] = b'-';
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::OutOfRange { field: "sender", .. })
        ));

        let mut frame = encode(&msg(Some(2), 1.5)).to_vec();
        frame[122] = b'-';
        frame[123] = b'0';
        frame[124] = b'7';
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::OutOfRange {
                field: "winning_agent",
                ..
            })
        ));
    }

    #[test]
    fn rejects_bid_without_winner() {
        let mut frame = encode(&msg(None, 0.0)).to_vec();
        frame[99] = b'3';
        assert!(matches!(
            decode(&frame),
            Err(DecodeError::OutOfRange {
                field: "winning_bid",
                ..
            })
        ));
    }
}
