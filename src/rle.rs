use anyhow::{Result, anyhow, bail};
use std::convert::Infallible;
use std::fmt::{self, Write};
use std::str::FromStr;
use winnow::{Parser, ascii::digit1, combinator::repeat, combinator::terminated};

use crate::index::BitmapIndex;

/// A stretch of `len` consecutive keys that are all enabled or all disabled.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Run {
    pub len: u64,
    pub enabled: bool,
}

impl Run {
    fn enabled(len: u64) -> Self {
        Self { len, enabled: true }
    }

    fn disabled(len: u64) -> Self {
        Self {
            len,
            enabled: false,
        }
    }

    // "<len><flag>" where the last digit is the flag and the rest, if any, the length.
    fn from_digits(digits: &str) -> Option<Self> {
        let (len, flag) = digits.split_at(digits.len() - 1);
        let enabled = match flag {
            "0" => false,
            "1" => true,
            _ => return None,
        };
        let len = if len.is_empty() {
            1
        } else {
            len.parse()
                .inspect_err(|_| tracing::debug!(len, "run length out of range"))
                .ok()?
        };
        Some(Self { len, enabled })
    }
}

impl fmt::Display for Run {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let flag = u8::from(self.enabled);
        if self.len > 1 {
            write!(f, "{len}{flag}", len = self.len)
        } else {
            write!(f, "{flag}")
        }
    }
}

fn run(input: &mut &str) -> winnow::Result<Run> {
    terminated(digit1, '.')
        .verify_map(Run::from_digits)
        .parse_next(input)
}

impl BitmapIndex {
    /// Alternating runs covering `0..=max enabled key`.
    #[must_use]
    pub fn runs(&self) -> Vec<Run> {
        let mut runs = Vec::new();
        let mut next_expected = 0;
        let mut enabled_run = 0;
        for key in self.enabled_keys() {
            if key != next_expected {
                if enabled_run > 0 {
                    runs.push(Run::enabled(enabled_run));
                    enabled_run = 0;
                }
                runs.push(Run::disabled(key - next_expected));
            }
            enabled_run += 1;
            // keys ascend, so only the last key can be u64::MAX
            next_expected = key.saturating_add(1);
        }
        if enabled_run > 0 {
            runs.push(Run::enabled(enabled_run));
        }
        runs
    }

    #[must_use]
    pub fn rle(&self) -> String {
        self.to_string()
    }

    #[must_use]
    pub fn encode(&self) -> String {
        self.rle()
    }

    /// Builds an index from RLE text, skipping anything that is not a token.
    #[must_use]
    pub fn from_rle(data: &str) -> Self {
        let mut index = Self::new();
        index.read_rle(data);
        index
    }

    /// # Panics
    ///
    /// Panics if `bucket_size` is zero.
    #[must_use]
    pub fn from_rle_with_bucket_size(data: &str, bucket_size: usize) -> Self {
        let mut index = Self::with_bucket_size(bucket_size);
        index.read_rle(data);
        index
    }

    /// Builds an index from RLE text that must consist only of tokens with
    /// non-zero run lengths.
    #[allow(clippy::missing_errors_doc)]
    pub fn from_rle_strict(data: &str) -> Result<Self> {
        let runs: Vec<Run> = repeat(0.., run).parse(data).map_err(|e| {
            tracing::debug!(%e, "rejected RLE data");
            anyhow!("invalid RLE data {data:?}: {e}")
        })?;
        if let Some(position) = runs.iter().position(|r| r.len == 0) {
            bail!("invalid RLE data {data:?}: token {position} has a zero run length");
        }
        let mut index = Self::new();
        index
            .apply_runs(runs)
            .map_err(|e| anyhow!("invalid RLE data {data:?}: {e}"))?;
        Ok(index)
    }

    fn read_rle(&mut self, mut data: &str) {
        let mut runs = Vec::new();
        let mut skipped = 0usize;
        while !data.is_empty() {
            let mut attempt = data;
            if let Ok(token) = run.parse_next(&mut attempt) {
                runs.push(token);
                data = attempt;
            } else {
                // Resuming inside a digit run cannot match, so skip all of it.
                let length = data.len();
                let rest = data.trim_start_matches(|c: char| c.is_ascii_digit());
                data = if rest.len() < length {
                    rest
                } else {
                    let mut chars = data.chars();
                    chars.next();
                    chars.as_str()
                };
                skipped += length - data.len();
            }
        }
        if skipped > 0 {
            tracing::debug!(skipped, "ignored bytes outside RLE tokens");
        }
        tracing::trace!(runs = runs.len(), "decoded RLE data");
        if let Err(e) = self.apply_runs(runs) {
            tracing::debug!(%e, "stopped decoding RLE data");
        }
    }

    /// Enables keys run by run. Stops at the first key past `u64::MAX`,
    /// keeping everything enabled before it.
    fn apply_runs(&mut self, runs: impl IntoIterator<Item = Run>) -> Result<()> {
        // `None` once the cursor has moved past u64::MAX
        let mut cursor = Some(0u64);
        for (position, Run { len, enabled }) in runs.into_iter().enumerate() {
            if enabled {
                for _ in 0..len {
                    let Some(key) = cursor else {
                        bail!("token {position} enables keys past the largest key");
                    };
                    self.enable(key);
                    cursor = key.checked_add(1);
                }
            } else if len > 0 {
                cursor = cursor.and_then(|key| key.checked_add(len));
            }
        }
        Ok(())
    }
}

impl fmt::Display for BitmapIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let runs = self.runs();
        for (i, run) in runs.iter().enumerate() {
            if i > 0 {
                f.write_char('.')?;
            }
            write!(f, "{run}")?;
        }
        f.write_char('.')
    }
}

impl FromStr for BitmapIndex {
    type Err = Infallible;

    fn from_str(data: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_rle(data))
    }
}
