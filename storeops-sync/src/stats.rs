//! The mirror tool's final `--stats` block.

/// Counters from the final statistics block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TransferStats {
    pub files_transferred: u64,
    /// Total size of the source tree in bytes.
    pub total_file_size: u64,
    /// Bytes of file data actually sent.
    pub transferred_size: u64,
}

impl TransferStats {
    pub fn total_file_size_mb(&self) -> u64 {
        self.total_file_size / (1024 * 1024)
    }
}

/// Parse counters from the tool's output. Lines that are absent leave their
/// counter at zero. Both rsync 3.0 ("Number of files transferred") and 3.1+
/// ("Number of regular files transferred") spellings are accepted.
pub fn parse_stats(output: &str) -> TransferStats {
    let mut stats = TransferStats::default();
    for line in output.lines() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        let key = key.trim();
        match key {
            "Number of files transferred" | "Number of regular files transferred" => {
                stats.files_transferred = leading_number(value).unwrap_or(0);
            }
            "Total file size" => {
                stats.total_file_size = leading_number(value).unwrap_or(0);
            }
            "Total transferred file size" => {
                stats.transferred_size = leading_number(value).unwrap_or(0);
            }
            _ => {}
        }
    }
    stats
}

fn leading_number(value: &str) -> Option<u64> {
    value
        .split_whitespace()
        .next()
        .map(|n| n.replace(',', ""))
        .and_then(|n| n.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    const RSYNC_31: &str = "\
Number of files: 2,001 (reg: 1,900, dir: 101)
Number of created files: 3 (reg: 3)
Number of deleted files: 1 (reg: 1)
Number of regular files transferred: 12
Total file size: 5,368,709,120 bytes
Total transferred file size: 10,485,760 bytes
Literal data: 10,485,760 bytes
";

    #[test]
    fn parses_rsync_31_stats() {
        let stats = parse_stats(RSYNC_31);
        assert_eq!(stats.files_transferred, 12);
        assert_eq!(stats.total_file_size, 5_368_709_120);
        assert_eq!(stats.transferred_size, 10_485_760);
        assert_eq!(stats.total_file_size_mb(), 5_120);
    }

    #[test]
    fn parses_rsync_30_stats() {
        let stats = parse_stats("Number of files transferred: 4\nTotal file size: 1024 bytes\n");
        assert_eq!(stats.files_transferred, 4);
        assert_eq!(stats.total_file_size, 1024);
    }

    #[test]
    fn missing_block_is_all_zero() {
        assert_eq!(parse_stats("sending incremental file list\n"), TransferStats::default());
    }
}
