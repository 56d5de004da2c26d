use anyhow::{Context, Result};
use std::net::TcpListener;
use tokio::io::{AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::platform::LogStream;

/// Probe whether a local port is free by binding a listener on it.
///
/// The listener is released immediately; the bind is only a probe. Another
/// process can grab the port between the probe and the eventual use, so this
/// is a best-effort check, not a reservation.
pub fn probe_local_port(port: u16) -> std::io::Result<()> {
    let listener = TcpListener::bind(("127.0.0.1", port))?;
    drop(listener);
    Ok(())
}

/// Ask the OS for a currently free TCP port
pub fn get_free_port() -> Result<u16> {
    let listener =
        TcpListener::bind(("127.0.0.1", 0)).context("requesting an OS-assigned free port")?;
    let port = listener
        .local_addr()
        .context("reading auto-selected port")?
        .port();
    drop(listener);
    Ok(port)
}

/// Relay a remote log stream to a sink.
///
/// In follow mode the stream is pumped until the remote side ends it (or the
/// caller stops reading by cancelling the surrounding task). In non-follow
/// mode the stream is drained once and, when `tail` is non-negative, only the
/// last `tail` lines are written; `tail = -1` means everything.
pub async fn display_log<W>(follow: bool, mut rd: LogStream, sink: &mut W, tail: i64) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    if follow {
        tokio::io::copy(&mut rd, sink)
            .await
            .context("relaying log stream")?;
        sink.flush().await?;
        return Ok(());
    }

    let mut buf = Vec::new();
    rd.read_to_end(&mut buf).await.context("reading logs")?;

    if tail < 0 {
        sink.write_all(&buf).await?;
    } else {
        let text = String::from_utf8_lossy(&buf);
        let lines: Vec<&str> = text.lines().collect();
        let skip = lines.len().saturating_sub(tail as usize);
        for line in &lines[skip..] {
            sink.write_all(line.as_bytes()).await?;
            sink.write_all(b"\n").await?;
        }
    }
    sink.flush().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_free_port_is_bindable() {
        let port = get_free_port().unwrap();
        assert!(port > 0);
        probe_local_port(port).unwrap();
    }

    #[test]
    fn test_probe_fails_on_bound_port() {
        let listener = TcpListener::bind(("127.0.0.1", 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(probe_local_port(port).is_err());
    }

    #[tokio::test]
    async fn test_display_log_tail() {
        let data = b"one\ntwo\nthree\n".to_vec();
        let rd: LogStream = Box::new(std::io::Cursor::new(data));
        let mut out = Vec::new();
        display_log(false, rd, &mut out, 2).await.unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "two\nthree\n");
    }

    #[tokio::test]
    async fn test_display_log_all() {
        let data = b"alpha\nbeta\n".to_vec();
        let rd: LogStream = Box::new(std::io::Cursor::new(data));
        let mut out = Vec::new();
        display_log(false, rd, &mut out, -1).await.unwrap();
        assert_eq!(out, b"alpha\nbeta\n");
    }
}
