//! Text protocol spoken by the board-resident bus server.
//!
//! One request line, one reply line. Replies carry no transaction id, so they
//! are matched to requests purely by order.
//!
//! ```text
//! rd AAAAA          -> 250 RD DDDD
//! wr AAAAA DDDD     -> 250 WR
//! df NNNNN QQQQQ    -> 250 DF n w1 .. wn
//! anything else     -> <status> <message>
//! ```
//!
//! `AAAAA` is [`Reg::wire_addr`]. FIFO word counts are decimal, everything else
//! is hex.

use nom::{
    IResult, Parser,
    bytes::complete::take_till1,
    character::complete::{digit1, space0, space1},
    combinator::{all_consuming, map_res},
    multi::many0,
    sequence::{preceded, terminated},
};

use crate::{BlockReply, BusError, Reg};

pub const OK: u16 = 250;
pub const READ_TAG: &str = "RD";
pub const WRITE_TAG: &str = "WR";
pub const BLOCK_TAG: &str = "DF";

pub fn read_command(reg: Reg) -> String {
    format!("rd {:05x}", reg.wire_addr())
}

pub fn write_command(reg: Reg, value: u16) -> String {
    format!("wr {:05x} {:04x}", reg.wire_addr(), value)
}

pub fn block_command(nwords: Reg, data: Reg) -> String {
    format!("df {:05x} {:05x}", nwords.wire_addr(), data.wire_addr())
}

#[derive(Debug, PartialEq, Eq)]
pub struct Reply<'a> {
    pub status: u16,
    pub fields: Vec<&'a str>,
}

fn status(input: &str) -> IResult<&str, u16> {
    preceded(space0, map_res(digit1, str::parse::<u16>)).parse(input)
}

fn field(input: &str) -> IResult<&str, &str> {
    preceded(space1, take_till1(char::is_whitespace)).parse(input)
}

fn reply(input: &str) -> IResult<&str, Reply<'_>> {
    let (input, status) = status(input)?;
    let (input, fields) = terminated(many0(field), space0).parse(input)?;
    Ok((input, Reply { status, fields }))
}

pub fn parse_reply(line: &str) -> Option<Reply<'_>> {
    all_consuming(reply)
        .parse(line.trim_end())
        .ok()
        .map(|(_, reply)| reply)
}

fn malformed(command: &str, line: &str) -> BusError {
    BusError::Malformed {
        command: command.to_owned(),
        reply: line.to_owned(),
    }
}

/// Parse a reply that must carry status [`OK`] and `tag`.
fn expect_ok<'a>(command: &str, line: &'a str, tag: &str) -> Result<Vec<&'a str>, BusError> {
    let reply = parse_reply(line).ok_or_else(|| malformed(command, line))?;
    if reply.status != OK {
        return Err(BusError::Rejected {
            command: command.to_owned(),
            status: reply.status,
            message: reply.fields.join(" "),
        });
    }
    match &reply.fields[..] {
        [t, rest @ ..] if *t == tag => Ok(rest.to_vec()),
        _ => Err(malformed(command, line)),
    }
}

fn hex_word(command: &str, line: &str, s: &str) -> Result<u16, BusError> {
    u16::from_str_radix(s, 16).map_err(|_| malformed(command, line))
}

pub fn parse_read(command: &str, line: &str) -> Result<u16, BusError> {
    match expect_ok(command, line, READ_TAG)?[..] {
        [value] => hex_word(command, line, value),
        _ => Err(malformed(command, line)),
    }
}

pub fn parse_write(command: &str, line: &str) -> Result<(), BusError> {
    match expect_ok(command, line, WRITE_TAG)?[..] {
        [] => Ok(()),
        _ => Err(malformed(command, line)),
    }
}

/// Only the syntax is checked. Status, tag and count are returned as-is so the
/// FIFO drain can judge them.
pub fn parse_block(command: &str, line: &str) -> Result<BlockReply, BusError> {
    let reply = parse_reply(line).ok_or_else(|| malformed(command, line))?;
    let tag = reply.fields.first().copied().unwrap_or_default().to_owned();
    if reply.status != OK {
        return Ok(BlockReply {
            status: reply.status,
            tag,
            declared: 0,
            words: Vec::new(),
        });
    }
    let [_, declared, words @ ..] = &reply.fields[..] else {
        return Err(malformed(command, line));
    };
    let declared = declared
        .parse::<usize>()
        .map_err(|_| malformed(command, line))?;
    let words = words
        .iter()
        .map(|w| hex_word(command, line, w))
        .collect::<Result<_, _>>()?;
    Ok(BlockReply {
        status: reply.status,
        tag,
        declared,
        words,
    })
}

pub fn format_read(value: u16) -> String {
    format!("{OK} {READ_TAG} {value:04x}")
}

pub fn format_write() -> String {
    format!("{OK} {WRITE_TAG}")
}

pub fn format_block(words: &[u16]) -> String {
    let mut line = format!("{OK} {BLOCK_TAG} {}", words.len());
    for w in words {
        line.push_str(&format!(" {w:04x}"));
    }
    line
}
