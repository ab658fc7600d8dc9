use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Encephalic Server - cached read API over one EEG recording
#[derive(Parser)]
#[command(name = "encephalic-server")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the server (default)
    Serve,

    /// Write a synthetic 10-20 EEG recording as EDF
    GenerateDemo {
        /// Destination file
        #[arg(short, long, default_value = "data/sample_eeg.edf")]
        output: PathBuf,

        /// Length of the recording in seconds
        #[arg(short, long, default_value = "60")]
        duration: f64,

        /// Sampling frequency in Hz (must be a whole number)
        #[arg(short, long, default_value = "256")]
        sfreq: f64,

        /// Seed for the noise generator
        #[arg(long, default_value = "42")]
        seed: u64,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_subcommand_means_serve() {
        let cli = Cli::try_parse_from(["encephalic-server"]).unwrap();
        assert!(cli.command.is_none());
    }

    #[test]
    fn test_generate_demo_arguments() {
        let cli = Cli::try_parse_from([
            "encephalic-server",
            "generate-demo",
            "--output",
            "/tmp/demo.edf",
            "--duration",
            "12.5",
        ])
        .unwrap();
        match cli.command {
            Some(Commands::GenerateDemo {
                output,
                duration,
                sfreq,
                seed,
            }) => {
                assert_eq!(output, PathBuf::from("/tmp/demo.edf"));
                assert_eq!(duration, 12.5);
                assert_eq!(sfreq, 256.0);
                assert_eq!(seed, 42);
            }
            _ => panic!("expected generate-demo"),
        }
    }
}
