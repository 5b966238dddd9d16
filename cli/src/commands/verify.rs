//! Output Verification
//!
//! Byte-wise comparison of the cluster output against the references, and
//! the context window printed on the first difference.

use std::fmt;

/// Bytes printed from the first differing index onwards.
pub const WINDOW: usize = 10;

/// One line of the context window: the byte at `index` in every output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowRow {
    pub index: usize,
    pub bytes: Vec<u8>,
}

/// First point where the outputs disagree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mismatch {
    pub len: usize,
    pub index: usize,
    pub rows: Vec<WindowRow>,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "output mismatch at byte {} of {}",
            self.index, self.len
        )
    }
}

impl std::error::Error for Mismatch {}

impl Mismatch {
    /// Print the window, one `wrong <len> <index> <bytes...>` line per index.
    pub fn print_window(&self, names: &[&str]) {
        println!("wrong len index {}", names.join(" "));
        for row in &self.rows {
            let bytes: Vec<String> = row.bytes.iter().map(|b| format!("{b:3}")).collect();
            println!("wrong {} {} {}", self.len, row.index, bytes.join(" "));
        }
    }
}

/// Compare every output against the first one.
///
/// Returns `None` when all outputs are byte-identical. Outputs of different
/// lengths disagree at the end of the shortest one.
pub fn find_mismatch(outputs: &[&[u8]]) -> Option<Mismatch> {
    let (first, rest) = outputs.split_first()?;
    let len = first.len();

    let index = rest
        .iter()
        .filter_map(|other| {
            first
                .iter()
                .zip(other.iter())
                .position(|(a, b)| a != b)
                .or_else(|| (other.len() != len).then(|| len.min(other.len())))
        })
        .min()?;

    let end = (index + WINDOW).min(outputs.iter().map(|o| o.len()).max().unwrap_or(len));
    let rows = (index..end)
        .map(|i| WindowRow {
            index: i,
            bytes: outputs.iter().map(|o| o.get(i).copied().unwrap_or(0)).collect(),
        })
        .collect();

    Some(Mismatch { len, index, rows })
}
