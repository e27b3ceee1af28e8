use clap::{Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "walletsweep-scheduler")]
#[command(about = "Extract a wallet's transaction history into partitioned and aggregate files", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Command {
    /// Partition [from_block, to_block), extract every chunk, then aggregate.
    Extract {
        wallet: String,
        chain_id: String,
        from_block: u64,
        to_block: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_extract_invocation() {
        let cli = Cli::try_parse_from([
            "walletsweep-scheduler",
            "extract",
            "0xabc",
            "1",
            "0",
            "2500",
        ])
        .unwrap();
        assert_eq!(
            cli.command,
            Command::Extract {
                wallet: "0xabc".to_string(),
                chain_id: "1".to_string(),
                from_block: 0,
                to_block: 2_500,
            }
        );
    }

    #[test]
    fn missing_positional_is_a_usage_error() {
        let err =
            Cli::try_parse_from(["walletsweep-scheduler", "extract", "0xabc", "1", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
        assert_ne!(err.exit_code(), 0);
    }

    #[test]
    fn block_numbers_must_be_unsigned() {
        let err = Cli::try_parse_from([
            "walletsweep-scheduler",
            "extract",
            "0xabc",
            "1",
            "-5",
            "100",
        ])
        .unwrap_err();
        assert_ne!(err.exit_code(), 0);

        let err = Cli::try_parse_from([
            "walletsweep-scheduler",
            "extract",
            "0xabc",
            "1",
            "ten",
            "100",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }
}
