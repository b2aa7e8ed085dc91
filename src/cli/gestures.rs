use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt},
    sync::mpsc,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::viewport::Gesture;

/// One line of terminal input: `pan <dx>` or `zoom <dy> <cx>`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GestureCommand(pub Gesture);

impl FromStr for GestureCommand {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split_whitespace();
        let gesture = match parts.next() {
            Some("pan") => Gesture::Pan {
                delta_x: number(parts.next(), "dx")?,
            },
            Some("zoom") => Gesture::Zoom {
                delta_y: number(parts.next(), "dy")?,
                cursor_x: number(parts.next(), "cx")?,
            },
            Some(other) => bail!("unknown gesture {other}"),
            None => bail!("empty gesture"),
        };
        if let Some(extra) = parts.next() {
            bail!("unexpected argument {extra}");
        }
        Ok(GestureCommand(gesture))
    }
}

fn number(part: Option<&str>, name: &str) -> Result<f64> {
    let part = part.ok_or_else(|| anyhow!("missing {name}"))?;
    let value: f64 = part.parse().with_context(|| format!("invalid {name} {part}"))?;
    if !value.is_finite() {
        bail!("{name} must be finite");
    }
    Ok(value)
}

/// Forwards gestures read line by line from `input` until it ends, the view goes away or
/// shutdown is requested. Unparsable lines are skipped.
pub async fn read_gestures(
    input: impl AsyncBufRead + Unpin,
    gestures: mpsc::Sender<Gesture>,
    shutdown: CancellationToken,
) -> Result<()> {
    let mut lines = input.lines();
    loop {
        let line = tokio::select! {
            _ = shutdown.cancelled() => return Ok(()),
            line = lines.next_line() => line?,
        };
        let Some(line) = line else {
            debug!("Gesture input closed");
            return Ok(());
        };
        if line.trim().is_empty() {
            continue;
        }
        match line.parse::<GestureCommand>() {
            Ok(GestureCommand(gesture)) => {
                if gestures.send(gesture).await.is_err() {
                    return Ok(());
                }
            }
            Err(e) => warn!("Skipping gesture {line:?}: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::{io::BufReader, sync::mpsc};
    use tokio_util::sync::CancellationToken;

    use super::{read_gestures, GestureCommand};
    use crate::viewport::Gesture;

    #[test]
    fn parses_commands() {
        assert_eq!(
            "pan 25".parse::<GestureCommand>().unwrap().0,
            Gesture::Pan { delta_x: 25. }
        );
        assert_eq!(
            "  zoom -3 120.5 ".parse::<GestureCommand>().unwrap().0,
            Gesture::Zoom {
                delta_y: -3.,
                cursor_x: 120.5
            }
        );
    }

    #[test]
    fn rejects_garbage() {
        for line in ["", "pan", "pan x", "zoom 1", "zoom 1 2 3", "tilt 4", "pan NaN"] {
            assert!(line.parse::<GestureCommand>().is_err(), "{line}");
        }
    }

    #[tokio::test]
    async fn forwards_valid_lines() {
        let input = BufReader::new("pan 10\nwhat\n\nzoom 1 50\n".as_bytes());
        let (sender, mut receiver) = mpsc::channel(8);

        read_gestures(input, sender, CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(receiver.recv().await, Some(Gesture::Pan { delta_x: 10. }));
        assert_eq!(
            receiver.recv().await,
            Some(Gesture::Zoom {
                delta_y: 1.,
                cursor_x: 50.
            })
        );
        assert_eq!(receiver.recv().await, None);
    }
}
