//! Byte-exact binary codec for request and reply frames.
//!
//! Framing is self-delimiting within one datagram; a frame never spans
//! datagrams. All multi-byte integers are big-endian. Strings are
//! length-prefixed with a `u16`; day lists with a single `u8` count.
//!
//! The decoder is the sole place raw opcode bytes are mapped to [`Request`]
//! variants, and the encoder is its inverse.

use std::fmt;

use crate::model::WeekTime;

pub const OP_QUERY: u8 = 1;
pub const OP_BOOK: u8 = 2;
pub const OP_CHANGE: u8 = 3;
pub const OP_MONITOR: u8 = 4;
pub const OP_CANCEL: u8 = 5;
pub const OP_ADD_PARTICIPANT: u8 = 6;
/// Unsolicited monitor callback; such frames carry `request_id == 0`.
pub const OP_CALLBACK: u8 = 100;

pub const MAX_STRING_LEN: usize = u16::MAX as usize;
pub const MAX_DAYS: usize = u8::MAX as usize;

/// A decoded request body. The request id travels beside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Request {
    Query {
        facility: String,
        days: Vec<u8>,
    },
    Book {
        facility: String,
        start: WeekTime,
        end: WeekTime,
    },
    Change {
        confirmation_id: String,
        offset_min: i32,
    },
    Monitor {
        facility: String,
        period_secs: u32,
    },
    Cancel {
        confirmation_id: String,
    },
    AddParticipant {
        confirmation_id: String,
        participant: String,
    },
}

impl Request {
    pub fn opcode(&self) -> u8 {
        match self {
            Request::Query { .. } => OP_QUERY,
            Request::Book { .. } => OP_BOOK,
            Request::Change { .. } => OP_CHANGE,
            Request::Monitor { .. } => OP_MONITOR,
            Request::Cancel { .. } => OP_CANCEL,
            Request::AddParticipant { .. } => OP_ADD_PARTICIPANT,
        }
    }
}

/// Every reply shares one shape: echoed opcode and request id, a signed
/// status (0 = success) and a human-readable data string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub opcode: u8,
    pub request_id: u64,
    pub status: i32,
    pub data: String,
}

#[derive(Debug)]
pub enum WireError {
    /// The frame ended before `field` could be read.
    Truncated { field: &'static str },
    /// A string declared more bytes than remain in the frame.
    BadLength { declared: usize, available: usize },
    /// A string field was not valid UTF-8.
    BadUtf8 { field: &'static str },
    /// The opcode byte is not a known operation. The already-parsed header
    /// is carried so the server can still echo a reply.
    UnknownOpcode { opcode: u8, request_id: u64 },
    /// Encoder input exceeded a wire limit.
    TooLong { field: &'static str, len: usize },
}

impl fmt::Display for WireError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WireError::Truncated { field } => write!(f, "frame truncated at {field}"),
            WireError::BadLength {
                declared,
                available,
            } => write!(
                f,
                "declared length {declared} exceeds {available} remaining bytes"
            ),
            WireError::BadUtf8 { field } => write!(f, "invalid UTF-8 in {field}"),
            WireError::UnknownOpcode { opcode, .. } => write!(f, "unknown opcode {opcode}"),
            WireError::TooLong { field, len } => {
                write!(f, "{field} too long for the wire: {len} bytes")
            }
        }
    }
}

impl std::error::Error for WireError {}

// ── Encoding ─────────────────────────────────────────────────────

fn put_str(buf: &mut Vec<u8>, field: &'static str, s: &str) -> Result<(), WireError> {
    if s.len() > MAX_STRING_LEN {
        return Err(WireError::TooLong {
            field,
            len: s.len(),
        });
    }
    buf.extend_from_slice(&(s.len() as u16).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

pub fn encode_request(request_id: u64, req: &Request) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(128);
    buf.push(req.opcode());
    buf.extend_from_slice(&request_id.to_be_bytes());

    match req {
        Request::Query { facility, days } => {
            put_str(&mut buf, "facility", facility)?;
            if days.len() > MAX_DAYS {
                return Err(WireError::TooLong {
                    field: "days",
                    len: days.len(),
                });
            }
            buf.push(days.len() as u8);
            buf.extend_from_slice(days);
        }
        Request::Book {
            facility,
            start,
            end,
        } => {
            put_str(&mut buf, "facility", facility)?;
            buf.extend_from_slice(&[
                start.day, start.hour, start.min, end.day, end.hour, end.min,
            ]);
        }
        Request::Change {
            confirmation_id,
            offset_min,
        } => {
            put_str(&mut buf, "confirmation id", confirmation_id)?;
            buf.extend_from_slice(&offset_min.to_be_bytes());
        }
        Request::Monitor {
            facility,
            period_secs,
        } => {
            put_str(&mut buf, "facility", facility)?;
            buf.extend_from_slice(&period_secs.to_be_bytes());
        }
        Request::Cancel { confirmation_id } => {
            put_str(&mut buf, "confirmation id", confirmation_id)?;
        }
        Request::AddParticipant {
            confirmation_id,
            participant,
        } => {
            put_str(&mut buf, "confirmation id", confirmation_id)?;
            put_str(&mut buf, "participant", participant)?;
        }
    }

    Ok(buf)
}

pub fn encode_reply(rep: &Reply) -> Result<Vec<u8>, WireError> {
    let mut buf = Vec::with_capacity(64 + rep.data.len());
    buf.push(rep.opcode);
    buf.extend_from_slice(&rep.request_id.to_be_bytes());
    buf.extend_from_slice(&rep.status.to_be_bytes());
    put_str(&mut buf, "reply data", &rep.data)?;
    Ok(buf)
}

// ── Decoding ─────────────────────────────────────────────────────

struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize, field: &'static str) -> Result<&'a [u8], WireError> {
        if self.pos + n > self.buf.len() {
            return Err(WireError::Truncated { field });
        }
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn u8(&mut self, field: &'static str) -> Result<u8, WireError> {
        Ok(self.take(1, field)?[0])
    }

    fn u32(&mut self, field: &'static str) -> Result<u32, WireError> {
        Ok(u32::from_be_bytes(self.take(4, field)?.try_into().unwrap()))
    }

    fn i32(&mut self, field: &'static str) -> Result<i32, WireError> {
        Ok(i32::from_be_bytes(self.take(4, field)?.try_into().unwrap()))
    }

    fn u64(&mut self, field: &'static str) -> Result<u64, WireError> {
        Ok(u64::from_be_bytes(self.take(8, field)?.try_into().unwrap()))
    }

    fn string(&mut self, field: &'static str) -> Result<String, WireError> {
        let len = u16::from_be_bytes(self.take(2, field)?.try_into().unwrap()) as usize;
        let available = self.buf.len() - self.pos;
        if len > available {
            return Err(WireError::BadLength {
                declared: len,
                available,
            });
        }
        let raw = self.take(len, field)?;
        String::from_utf8(raw.to_vec()).map_err(|_| WireError::BadUtf8 { field })
    }
}

pub fn decode_request(buf: &[u8]) -> Result<(u64, Request), WireError> {
    let mut r = Reader::new(buf);
    let opcode = r.u8("opcode")?;
    let request_id = r.u64("request id")?;

    let req = match opcode {
        OP_QUERY => {
            let facility = r.string("facility")?;
            let n = r.u8("day count")? as usize;
            let days = r.take(n, "day list")?.to_vec();
            Request::Query { facility, days }
        }
        OP_BOOK => {
            let facility = r.string("facility")?;
            let t = r.take(6, "booking times")?;
            Request::Book {
                facility,
                start: WeekTime {
                    day: t[0],
                    hour: t[1],
                    min: t[2],
                },
                end: WeekTime {
                    day: t[3],
                    hour: t[4],
                    min: t[5],
                },
            }
        }
        OP_CHANGE => Request::Change {
            confirmation_id: r.string("confirmation id")?,
            offset_min: r.i32("offset minutes")?,
        },
        OP_MONITOR => Request::Monitor {
            facility: r.string("facility")?,
            period_secs: r.u32("monitor period")?,
        },
        OP_CANCEL => Request::Cancel {
            confirmation_id: r.string("confirmation id")?,
        },
        OP_ADD_PARTICIPANT => Request::AddParticipant {
            confirmation_id: r.string("confirmation id")?,
            participant: r.string("participant")?,
        },
        other => {
            return Err(WireError::UnknownOpcode {
                opcode: other,
                request_id,
            });
        }
    };

    Ok((request_id, req))
}

pub fn decode_reply(buf: &[u8]) -> Result<Reply, WireError> {
    let mut r = Reader::new(buf);
    let opcode = r.u8("opcode")?;
    let request_id = r.u64("request id")?;
    if !matches!(opcode, OP_QUERY..=OP_ADD_PARTICIPANT | OP_CALLBACK) {
        return Err(WireError::UnknownOpcode { opcode, request_id });
    }
    let status = r.i32("status")?;
    let data = r.string("reply data")?;
    Ok(Reply {
        opcode,
        request_id,
        status,
        data,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(req: Request) {
        let bytes = encode_request(42, &req).unwrap();
        let (id, decoded) = decode_request(&bytes).unwrap();
        assert_eq!(id, 42);
        assert_eq!(decoded, req);
    }

    #[test]
    fn roundtrip_query() {
        roundtrip(Request::Query {
            facility: "RoomA".into(),
            days: vec![0, 3, 6],
        });
    }

    #[test]
    fn roundtrip_query_empty_days() {
        roundtrip(Request::Query {
            facility: "RoomA".into(),
            days: vec![],
        });
    }

    #[test]
    fn roundtrip_book() {
        roundtrip(Request::Book {
            facility: "Lab1".into(),
            start: WeekTime {
                day: 0,
                hour: 11,
                min: 0,
            },
            end: WeekTime {
                day: 0,
                hour: 12,
                min: 30,
            },
        });
    }

    #[test]
    fn roundtrip_change_negative_offset() {
        roundtrip(Request::Change {
            confirmation_id: "BKG-10000".into(),
            offset_min: -90,
        });
    }

    #[test]
    fn roundtrip_monitor() {
        roundtrip(Request::Monitor {
            facility: "RoomA".into(),
            period_secs: 600,
        });
    }

    #[test]
    fn roundtrip_cancel() {
        roundtrip(Request::Cancel {
            confirmation_id: "BKG-10000".into(),
        });
    }

    #[test]
    fn roundtrip_add_participant() {
        roundtrip(Request::AddParticipant {
            confirmation_id: "BKG-10000".into(),
            participant: "alice".into(),
        });
    }

    #[test]
    fn roundtrip_reply() {
        let rep = Reply {
            opcode: OP_BOOK,
            request_id: 7,
            status: -1,
            data: "Facility 'Ghost' not found".into(),
        };
        let bytes = encode_reply(&rep).unwrap();
        assert_eq!(decode_reply(&bytes).unwrap(), rep);
    }

    #[test]
    fn roundtrip_callback_reply() {
        let rep = Reply {
            opcode: OP_CALLBACK,
            request_id: 0,
            status: 0,
            data: "Facility=RoomA updated: New booking created: BKG-1".into(),
        };
        let bytes = encode_reply(&rep).unwrap();
        assert_eq!(decode_reply(&bytes).unwrap(), rep);
    }

    #[test]
    fn reply_status_is_twos_complement_big_endian() {
        let rep = Reply {
            opcode: OP_CANCEL,
            request_id: 1,
            status: -1,
            data: String::new(),
        };
        let bytes = encode_reply(&rep).unwrap();
        // status sits after opcode (1) + request id (8)
        assert_eq!(&bytes[9..13], &[0xff, 0xff, 0xff, 0xff]);
    }

    #[test]
    fn request_header_layout() {
        let bytes = encode_request(
            0x0102_0304_0506_0708,
            &Request::Cancel {
                confirmation_id: "x".into(),
            },
        )
        .unwrap();
        assert_eq!(bytes[0], OP_CANCEL);
        assert_eq!(&bytes[1..9], &[1, 2, 3, 4, 5, 6, 7, 8]);
        // u16 string length prefix
        assert_eq!(&bytes[9..11], &[0, 1]);
        assert_eq!(bytes[11], b'x');
    }

    #[test]
    fn decode_empty_frame() {
        assert!(matches!(
            decode_request(&[]),
            Err(WireError::Truncated { field: "opcode" })
        ));
    }

    #[test]
    fn decode_truncated_request_id() {
        assert!(matches!(
            decode_request(&[OP_CANCEL, 0, 0]),
            Err(WireError::Truncated { .. })
        ));
    }

    #[test]
    fn decode_truncated_payload() {
        let bytes = encode_request(
            1,
            &Request::Book {
                facility: "RoomA".into(),
                start: WeekTime {
                    day: 0,
                    hour: 9,
                    min: 0,
                },
                end: WeekTime {
                    day: 0,
                    hour: 10,
                    min: 0,
                },
            },
        )
        .unwrap();
        // chop the final time byte
        assert!(matches!(
            decode_request(&bytes[..bytes.len() - 1]),
            Err(WireError::Truncated {
                field: "booking times"
            })
        ));
    }

    #[test]
    fn decode_string_length_beyond_frame() {
        let mut bytes = vec![OP_CANCEL];
        bytes.extend_from_slice(&1u64.to_be_bytes());
        bytes.extend_from_slice(&100u16.to_be_bytes()); // declares 100 bytes
        bytes.extend_from_slice(b"short");
        assert!(matches!(
            decode_request(&bytes),
            Err(WireError::BadLength {
                declared: 100,
                available: 5
            })
        ));
    }

    #[test]
    fn decode_unknown_opcode_keeps_header() {
        let mut bytes = vec![99];
        bytes.extend_from_slice(&77u64.to_be_bytes());
        match decode_request(&bytes) {
            Err(WireError::UnknownOpcode { opcode, request_id }) => {
                assert_eq!(opcode, 99);
                assert_eq!(request_id, 77);
            }
            other => panic!("expected UnknownOpcode, got {other:?}"),
        }
    }

    #[test]
    fn decode_reply_rejects_unknown_opcode() {
        let rep = Reply {
            opcode: OP_QUERY,
            request_id: 5,
            status: 0,
            data: "ok".into(),
        };
        let mut bytes = encode_reply(&rep).unwrap();
        bytes[0] = 200;
        assert!(matches!(
            decode_reply(&bytes),
            Err(WireError::UnknownOpcode { opcode: 200, .. })
        ));
    }

    #[test]
    fn encode_rejects_oversized_day_list() {
        let req = Request::Query {
            facility: "RoomA".into(),
            days: vec![0; 256],
        };
        assert!(matches!(
            encode_request(1, &req),
            Err(WireError::TooLong { field: "days", .. })
        ));
    }

    #[test]
    fn decode_rejects_invalid_utf8() {
        let mut bytes = vec![OP_CANCEL];
        bytes.extend_from_slice(&1u64.to_be_bytes());
        bytes.extend_from_slice(&2u16.to_be_bytes());
        bytes.extend_from_slice(&[0xff, 0xfe]);
        assert!(matches!(
            decode_request(&bytes),
            Err(WireError::BadUtf8 { .. })
        ));
    }
}
