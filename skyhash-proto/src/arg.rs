//! Request arguments as a tagged variant.
//!
//! The set of variants is closed: every supported source type converts
//! into [`Arg`] through `From`, and everything an `Arg` can hold has a
//! defined wire encoding, so encoding itself cannot fail.

use chrono::{DateTime, SecondsFormat, Utc};
use std::net::{IpAddr, Ipv6Addr};

/// One argument of a request element.
#[derive(Debug, Clone, PartialEq)]
pub enum Arg {
    Str(String),
    Bytes(Vec<u8>),
    Int(i64),
    Uint(u64),
    /// Encoded as the shortest decimal that round-trips through `f32`.
    Float32(f32),
    /// Encoded as the shortest decimal that round-trips through `f64`.
    Float64(f64),
    /// Encoded as `1` or `0`.
    Bool(bool),
    /// Encoded as a zero-length payload.
    Nil,
    /// Encoded RFC 3339 with nanosecond precision.
    Timestamp(DateTime<Utc>),
    /// Encoded as the 16-byte canonical address (v4 mapped into v6).
    Ip(IpAddr),
    /// Caller-provided byte serialisation, written verbatim.
    Custom(Vec<u8>),
}

impl Arg {
    /// The payload bytes this argument puts on the wire, without the
    /// length header.
    pub(crate) fn payload(&self) -> Vec<u8> {
        match self {
            Arg::Str(s) => s.clone().into_bytes(),
            Arg::Bytes(b) | Arg::Custom(b) => b.clone(),
            Arg::Int(n) => n.to_string().into_bytes(),
            Arg::Uint(n) => n.to_string().into_bytes(),
            Arg::Float32(f) => f.to_string().into_bytes(),
            Arg::Float64(f) => f.to_string().into_bytes(),
            Arg::Bool(true) => b"1".to_vec(),
            Arg::Bool(false) => b"0".to_vec(),
            Arg::Nil => Vec::new(),
            Arg::Timestamp(ts) => ts
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .into_bytes(),
            Arg::Ip(addr) => {
                let v6: Ipv6Addr = match addr {
                    IpAddr::V4(v4) => v4.to_ipv6_mapped(),
                    IpAddr::V6(v6) => *v6,
                };
                v6.octets().to_vec()
            }
        }
    }

    /// A short, human-readable rendering used for command names in
    /// diagnostics.
    pub fn display_text(&self) -> String {
        match self {
            Arg::Str(s) => s.clone(),
            _ => String::from_utf8_lossy(&self.payload()).into_owned(),
        }
    }
}

impl From<&str> for Arg {
    fn from(s: &str) -> Arg {
        Arg::Str(s.to_owned())
    }
}

impl From<String> for Arg {
    fn from(s: String) -> Arg {
        Arg::Str(s)
    }
}

impl From<&String> for Arg {
    fn from(s: &String) -> Arg {
        Arg::Str(s.clone())
    }
}

impl From<Vec<u8>> for Arg {
    fn from(b: Vec<u8>) -> Arg {
        Arg::Bytes(b)
    }
}

impl From<&[u8]> for Arg {
    fn from(b: &[u8]) -> Arg {
        Arg::Bytes(b.to_vec())
    }
}

impl From<bool> for Arg {
    fn from(v: bool) -> Arg {
        Arg::Bool(v)
    }
}

impl From<f32> for Arg {
    fn from(v: f32) -> Arg {
        Arg::Float32(v)
    }
}

impl From<f64> for Arg {
    fn from(v: f64) -> Arg {
        Arg::Float64(v)
    }
}

impl From<DateTime<Utc>> for Arg {
    fn from(ts: DateTime<Utc>) -> Arg {
        Arg::Timestamp(ts)
    }
}

impl From<IpAddr> for Arg {
    fn from(addr: IpAddr) -> Arg {
        Arg::Ip(addr)
    }
}

macro_rules! int_arg {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Arg {
                Arg::Int(v as i64)
            }
        })*
    };
}

macro_rules! uint_arg {
    ($($t:ty),*) => {
        $(impl From<$t> for Arg {
            fn from(v: $t) -> Arg {
                Arg::Uint(v as u64)
            }
        })*
    };
}

int_arg!(i8, i16, i32, i64, isize);
uint_arg!(u8, u16, u32, u64, usize);
