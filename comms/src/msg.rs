//! The master-worker message set of the coordination protocol.
//!
//! Bodies with a bulk `f64` payload (deltas, parameters, reports) pad their
//! header to 8 bytes so the payload sits at an 8-aligned offset and can be
//! borrowed straight out of the receive buffer.

use std::{borrow::Cow, io};

use crate::{Deserialize, Serialize};

const KIND_NORMAL: u8 = 0;
const KIND_IMMEDIATE: u8 = 1;
const KIND_DELTA: u8 = 2;
const KIND_PARAMETER: u8 = 3;
const KIND_REPORT: u8 = 4;

const SUB_ONLINE: u8 = 0;
const SUB_WORKERS: u8 = 1;
const SUB_DATASET: u8 = 2;
const SUB_READY: u8 = 3;
const SUB_START: u8 = 4;
const SUB_TRAIN_PAUSE: u8 = 5;
const SUB_TRAIN_CONTINUE: u8 = 6;
const SUB_REQUEST_DELTA: u8 = 7;
const SUB_BATCH_SIZE: u8 = 8;
const SUB_REPORT_SIZE: u8 = 9;
const SUB_REPLY: u8 = 10;
const SUB_TERMINATE: u8 = 11;
const SUB_CLOSED: u8 = 12;

/// Codes carried inside [`Ctl::Reply`], naming the message being acked.
pub mod reply {
    pub const ONLINE: u8 = super::SUB_ONLINE;
    pub const WORKERS: u8 = super::SUB_WORKERS;
    pub const DATASET: u8 = super::SUB_DATASET;
    pub const TRAIN_PAUSE: u8 = super::SUB_TRAIN_PAUSE;
    pub const TRAIN_CONTINUE: u8 = super::SUB_TRAIN_CONTINUE;
    /// Delta acknowledgment, distinct from the control subtype space.
    pub const DELTA: u8 = 100;
}

/// Control verbs carried inside a [`Msg::Normal`] or [`Msg::Immediate`] wrapper.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Ctl {
    /// A worker announces itself, hinting the logical id it was launched with.
    Online { lid_hint: i32 },
    /// The master publishes the `(lid, nid)` roster.
    Workers(Vec<(u32, u32)>),
    /// A worker reports the shape of its dataset shard.
    Dataset { nx: u64, ny: u64, n_point: u64 },
    Ready,
    Start,
    TrainPause,
    TrainContinue,
    /// The master pulls the pending deltas.
    RequestDelta,
    BatchSize(u64),
    ReportSize(u64),
    /// Acknowledgment carrying one of the [`reply`] codes.
    Reply(u8),
    Terminate,
    Closed,
}

impl Ctl {
    fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Ctl::Online { lid_hint } => {
                buf.push(SUB_ONLINE);
                buf.extend_from_slice(&lid_hint.to_be_bytes());
            }
            Ctl::Workers(list) => {
                buf.push(SUB_WORKERS);
                buf.extend_from_slice(&(list.len() as u32).to_be_bytes());
                for &(lid, nid) in list {
                    buf.extend_from_slice(&lid.to_be_bytes());
                    buf.extend_from_slice(&nid.to_be_bytes());
                }
            }
            Ctl::Dataset { nx, ny, n_point } => {
                buf.push(SUB_DATASET);
                buf.extend_from_slice(&nx.to_be_bytes());
                buf.extend_from_slice(&ny.to_be_bytes());
                buf.extend_from_slice(&n_point.to_be_bytes());
            }
            Ctl::Ready => buf.push(SUB_READY),
            Ctl::Start => buf.push(SUB_START),
            Ctl::TrainPause => buf.push(SUB_TRAIN_PAUSE),
            Ctl::TrainContinue => buf.push(SUB_TRAIN_CONTINUE),
            Ctl::RequestDelta => buf.push(SUB_REQUEST_DELTA),
            Ctl::BatchSize(n) => {
                buf.push(SUB_BATCH_SIZE);
                buf.extend_from_slice(&n.to_be_bytes());
            }
            Ctl::ReportSize(n) => {
                buf.push(SUB_REPORT_SIZE);
                buf.extend_from_slice(&n.to_be_bytes());
            }
            Ctl::Reply(code) => {
                buf.push(SUB_REPLY);
                buf.push(*code);
            }
            Ctl::Terminate => buf.push(SUB_TERMINATE),
            Ctl::Closed => buf.push(SUB_CLOSED),
        }
    }

    fn decode(buf: &[u8]) -> io::Result<Self> {
        let (&sub, rest) = buf
            .split_first()
            .ok_or_else(|| bad_msg("empty control body"))?;

        let ctl = match sub {
            SUB_ONLINE => Ctl::Online {
                lid_hint: i32::from_be_bytes(take(rest, 0)?),
            },
            SUB_WORKERS => {
                let count = u32::from_be_bytes(take(rest, 0)?) as usize;
                let mut list = Vec::with_capacity(count);
                for i in 0..count {
                    let lid = u32::from_be_bytes(take(rest, 4 + i * 8)?);
                    let nid = u32::from_be_bytes(take(rest, 8 + i * 8)?);
                    list.push((lid, nid));
                }
                Ctl::Workers(list)
            }
            SUB_DATASET => Ctl::Dataset {
                nx: u64::from_be_bytes(take(rest, 0)?),
                ny: u64::from_be_bytes(take(rest, 8)?),
                n_point: u64::from_be_bytes(take(rest, 16)?),
            },
            SUB_READY => Ctl::Ready,
            SUB_START => Ctl::Start,
            SUB_TRAIN_PAUSE => Ctl::TrainPause,
            SUB_TRAIN_CONTINUE => Ctl::TrainContinue,
            SUB_REQUEST_DELTA => Ctl::RequestDelta,
            SUB_BATCH_SIZE => Ctl::BatchSize(u64::from_be_bytes(take(rest, 0)?)),
            SUB_REPORT_SIZE => Ctl::ReportSize(u64::from_be_bytes(take(rest, 0)?)),
            SUB_REPLY => Ctl::Reply(*rest.first().ok_or_else(|| bad_msg("reply without code"))?),
            SUB_TERMINATE => Ctl::Terminate,
            SUB_CLOSED => Ctl::Closed,
            x => return Err(bad_msg(&format!("unknown control subtype {x}"))),
        };

        Ok(ctl)
    }
}

/// One framed message of the protocol.
#[derive(Debug, Clone, PartialEq)]
pub enum Msg<'a> {
    /// Control message handled on the dispatcher.
    Normal(Ctl),
    /// Control message handled directly on the receive path.
    Immediate(Ctl),
    /// A weight update produced from `dp` datapoints.
    Delta { dp: u64, grad: Cow<'a, [f64]> },
    /// A full parameter vector.
    Parameter(Cow<'a, [f64]>),
    /// Worker telemetry: `[count, t_datapoint, t_delta, t_report]`.
    Report([f64; 4]),
}

impl Msg<'_> {
    /// Detaches the message from the receive buffer it may borrow from.
    pub fn into_owned(self) -> Msg<'static> {
        match self {
            Msg::Normal(c) => Msg::Normal(c),
            Msg::Immediate(c) => Msg::Immediate(c),
            Msg::Delta { dp, grad } => Msg::Delta {
                dp,
                grad: Cow::Owned(grad.into_owned()),
            },
            Msg::Parameter(w) => Msg::Parameter(Cow::Owned(w.into_owned())),
            Msg::Report(r) => Msg::Report(r),
        }
    }

    /// Whether this message must bypass the dispatcher queue.
    pub fn is_immediate(&self) -> bool {
        matches!(self, Msg::Immediate(..))
    }
}

impl<'a> Serialize<'a> for Msg<'a> {
    fn serialize(&'a self, buf: &mut Vec<u8>) -> Option<&'a [u8]> {
        match self {
            Msg::Normal(ctl) => {
                buf.push(KIND_NORMAL);
                ctl.encode(buf);
                None
            }
            Msg::Immediate(ctl) => {
                buf.push(KIND_IMMEDIATE);
                ctl.encode(buf);
                None
            }
            Msg::Delta { dp, grad } => {
                buf.push(KIND_DELTA);
                buf.resize(8, 0);
                buf.extend_from_slice(&dp.to_be_bytes());
                Some(bytemuck::cast_slice(grad.as_ref()))
            }
            Msg::Parameter(weights) => {
                buf.push(KIND_PARAMETER);
                buf.resize(8, 0);
                Some(bytemuck::cast_slice(weights.as_ref()))
            }
            Msg::Report(report) => {
                buf.push(KIND_REPORT);
                buf.resize(8, 0);
                buf.extend_from_slice(bytemuck::cast_slice(report));
                None
            }
        }
    }
}

impl<'buf> Deserialize<'buf> for Msg<'buf> {
    fn deserialize(buf: &'buf [u8]) -> io::Result<Self> {
        let (&kind, rest) = buf.split_first().ok_or_else(|| bad_msg("empty body"))?;

        let msg = match kind {
            KIND_NORMAL => Msg::Normal(Ctl::decode(rest)?),
            KIND_IMMEDIATE => Msg::Immediate(Ctl::decode(rest)?),
            KIND_DELTA => {
                if buf.len() < 16 {
                    return Err(bad_msg("short delta body"));
                }
                let dp = u64::from_be_bytes(take(buf, 8)?);
                Msg::Delta {
                    dp,
                    grad: float_payload(&buf[16..])?,
                }
            }
            KIND_PARAMETER => {
                if buf.len() < 8 {
                    return Err(bad_msg("short parameter body"));
                }
                Msg::Parameter(float_payload(&buf[8..])?)
            }
            KIND_REPORT => {
                if buf.len() < 8 + 32 {
                    return Err(bad_msg("short report body"));
                }
                let floats = float_payload(&buf[8..40])?;
                let mut report = [0.0; 4];
                report.copy_from_slice(&floats);
                Msg::Report(report)
            }
            x => return Err(bad_msg(&format!("unknown message kind {x}"))),
        };

        Ok(msg)
    }
}

/// Views an 8-aligned byte region as `f64`s, copying only if the caller
/// handed over an unaligned buffer.
fn float_payload(bytes: &[u8]) -> io::Result<Cow<'_, [f64]>> {
    if bytes.len() % 8 != 0 {
        return Err(bad_msg("float payload length not a multiple of 8"));
    }
    match bytemuck::try_cast_slice(bytes) {
        Ok(floats) => Ok(Cow::Borrowed(floats)),
        Err(_) => Ok(Cow::Owned(
            bytes
                .chunks_exact(8)
                .map(|c| f64::from_ne_bytes(c.try_into().unwrap()))
                .collect(),
        )),
    }
}

fn take<const N: usize>(buf: &[u8], at: usize) -> io::Result<[u8; N]> {
    buf.get(at..at + N)
        .and_then(|s| s.try_into().ok())
        .ok_or_else(|| bad_msg("truncated body"))
}

fn bad_msg(detail: &str) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, detail.to_string())
}
