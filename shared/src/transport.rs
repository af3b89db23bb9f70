//! Line framing used on every connection.
//!
//! Each line is terminated by a single `0xFF` byte. Payload text is carried
//! as Latin-1 so every byte except the terminator round-trips.

use tokio::io::{self, AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

pub const TERMINATOR: u8 = 0xFF;

/// Longest line read in one piece. Longer input is split into several
/// lines, which the protocol layer then rejects or ignores.
pub const MAX_LINE_LEN: usize = 1024;

/// Frames `line` for the wire. Characters outside Latin-1, and the
/// terminator itself, are sent as `?`.
pub fn encode_line(line: &str) -> Vec<u8> {
    let mut bytes: Vec<u8> = line
        .chars()
        .map(|c| match u8::try_from(c) {
            Ok(b) if b != TERMINATOR => b,
            _ => b'?',
        })
        .collect();
    bytes.push(TERMINATOR);
    bytes
}

fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|b| *b as char).collect()
}

/// Reads the next line without its terminator. Returns `Ok(None)` once the
/// peer has closed the stream; a trailing partial line is discarded.
pub async fn read_line<R>(reader: &mut R) -> io::Result<Option<String>>
where
    R: AsyncBufRead + Unpin,
{
    let mut buf = Vec::new();
    let mut limited = (&mut *reader).take(MAX_LINE_LEN as u64);
    limited.read_until(TERMINATOR, &mut buf).await?;

    match buf.last() {
        Some(&TERMINATOR) => {
            buf.pop();
            Ok(Some(decode_latin1(&buf)))
        }
        _ if buf.len() >= MAX_LINE_LEN => Ok(Some(decode_latin1(&buf))),
        _ => Ok(None),
    }
}

/// Writes one framed line and flushes it.
pub async fn write_line<W>(writer: &mut W, line: &str) -> io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_line(line)).await?;
    writer.flush().await
}
