//! Common functionality shared across the crate.

use byte_unit::Byte;
use clap::Parser;
use clap_verbosity_flag::{InfoLevel, Verbosity};

/// Commonly used command line arguments.
#[derive(Parser, Debug)]
pub struct Args {
    /// Verbosity of the program
    #[clap(flatten)]
    pub verbose: Verbosity<InfoLevel>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            verbose: Verbosity::new(0, 0),
        }
    }
}

/// Helper to print the current memory resident set size via `tracing`.
pub fn trace_rss_now() {
    let me = procfs::process::Process::myself().unwrap();
    let page_size = procfs::page_size();
    tracing::debug!(
        "RSS now: {}",
        Byte::from_bytes((me.stat().unwrap().rss * page_size) as u128).get_appropriate_unit(true)
    );
}

/// Returns true if the given chromosome label refers to chrX, in any of its
/// common spellings.
pub fn is_chr_x(chrom: &str) -> bool {
    matches!(chrom, "X" | "x" | "chrX" | "chrx")
}

/// The version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    #[test]
    fn trace_rss_now_smoke() {
        super::trace_rss_now();
    }

    #[rstest::rstest]
    #[case("X", true)]
    #[case("chrX", true)]
    #[case("chrx", true)]
    #[case("1", false)]
    #[case("chr1", false)]
    fn is_chr_x(#[case] chrom: &str, #[case] expected: bool) {
        assert_eq!(expected, super::is_chr_x(chrom));
    }
}
