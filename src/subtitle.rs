//! SRT subtitle parsing.
//!
//! The parser is tolerant: malformed blocks are skipped rather than failing
//! the whole file, and surviving cues are renumbered sequentially from 1 so
//! downstream code never sees gaps or duplicate indices.

/// One subtitle cue with absolute timeline bounds in milliseconds.
#[derive(Clone, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Cue {
    pub index: u32,
    pub start_ms: u64,
    pub end_ms: u64,
    pub text: String,
}

/// Parse SRT content into cues.
///
/// A block needs at least an index line and a `start --> end` range line;
/// multi-line text is preserved with `\n` joins, and a block without text
/// lines becomes an empty-text cue rather than being dropped.
pub fn parse_srt(content: &str) -> Vec<Cue> {
    // CRLF first, then stray CR-only endings.
    let normalized = content.replace("\r\n", "\n").replace('\r', "\n");
    let mut cues = Vec::new();

    for block in split_blocks(&normalized) {
        let lines: Vec<&str> = block.lines().collect();
        if lines.len() < 2 {
            continue;
        }
        let Some((start_ms, end_ms)) = parse_range_line(lines[1]) else {
            continue;
        };
        let text = lines[2..].join("\n");
        cues.push(Cue {
            index: cues.len() as u32 + 1,
            start_ms,
            end_ms,
            text,
        });
    }

    cues
}

fn split_blocks(content: &str) -> impl Iterator<Item = &str> {
    content.split("\n\n").map(str::trim).filter(|b| !b.is_empty())
}

fn parse_range_line(line: &str) -> Option<(u64, u64)> {
    let (start, end) = line.split_once("-->")?;
    let start_ms = parse_timestamp_ms(start.trim())?;
    let end_ms = parse_timestamp_ms(end.trim())?;
    Some((start_ms, end_ms))
}

/// `HH:MM:SS,mmm` (or `.` before the milliseconds) to absolute milliseconds.
/// A missing millisecond group defaults to 0.
pub fn parse_timestamp_ms(ts: &str) -> Option<u64> {
    let (clock, millis) = match ts.split_once([',', '.']) {
        Some((clock, millis)) => (clock, millis.trim().parse::<u64>().ok()?),
        None => (ts, 0),
    };

    let mut parts = clock.split(':');
    let hours = parts.next()?.trim().parse::<u64>().ok()?;
    let minutes = parts.next()?.trim().parse::<u64>().ok()?;
    let seconds = parts.next()?.trim().parse::<u64>().ok()?;
    if parts.next().is_some() {
        return None;
    }

    Some(((hours * 60 + minutes) * 60 + seconds) * 1000 + millis)
}
