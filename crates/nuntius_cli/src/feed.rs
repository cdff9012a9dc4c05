use std::{
    fs::File,
    io::{self, BufRead, BufReader},
    path::PathBuf,
    thread::{self, JoinHandle},
};

use anyhow::{Context, Result};
use crossbeam_channel::{Receiver, Sender};
use tracing::debug;

/// Where newline-delimited envelopes come from.
#[derive(Clone, Debug)]
pub enum Input {
    Stdin,
    File(PathBuf),
}

impl From<&str> for Input {
    fn from(value: &str) -> Self {
        match value {
            "-" => Input::Stdin,
            path => Input::File(PathBuf::from(path)),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FeedStats {
    pub records: usize,
    pub batches: usize,
}

/// Start the reader thread. Batches arrive on the returned receiver until the
/// input is exhausted, at which point the channel disconnects.
pub fn spawn(
    input: Input,
    batch_size: usize,
    channel_capacity: usize,
) -> Result<(Receiver<Vec<String>>, JoinHandle<Result<FeedStats>>)> {
    let (sender, receiver) = crossbeam_channel::bounded(channel_capacity);

    let reader: Box<dyn BufRead + Send> = match &input {
        Input::Stdin => Box::new(BufReader::new(io::stdin())),
        Input::File(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("failed to open {}", path.display()))?,
        )),
    };

    let handle = thread::Builder::new()
        .name("nuntius-feed".to_string())
        .spawn(move || read_batches(reader, batch_size, &sender))
        .context("failed to spawn feed reader")?;

    Ok((receiver, handle))
}

/// Group lines into batches of at most `batch_size`. Blank lines are ignored.
/// Lines are forwarded undecoded; the poller parses them and applies its
/// malformed-record policy.
pub fn read_batches<R: BufRead>(
    reader: R,
    batch_size: usize,
    sender: &Sender<Vec<String>>,
) -> Result<FeedStats> {
    let mut stats = FeedStats::default();
    let mut batch = Vec::with_capacity(batch_size);

    for (line_no, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read line {}", line_no + 1))?;
        if line.trim().is_empty() {
            continue;
        }

        stats.records += 1;
        batch.push(line);

        if batch.len() >= batch_size {
            let full = std::mem::replace(&mut batch, Vec::with_capacity(batch_size));
            if sender.send(full).is_err() {
                debug!("poller stopped, closing feed");
                return Ok(stats);
            }
            stats.batches += 1;
        }
    }

    if !batch.is_empty() && sender.send(batch).is_ok() {
        stats.batches += 1;
    }

    Ok(stats)
}
