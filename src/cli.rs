use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "trafficmode", version, about = "Classify photos with the bundled traffic-mode model")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file (default: ./trafficmode.toml, then the data directory)
    #[arg(long, global = true, value_name = "PATH")]
    pub config: Option<PathBuf>,
}

#[derive(Debug, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Import and classify one or more images
    Classify(ClassifyArgs),
    /// Copy the bundled model into private storage and print its path
    Materialize,
    /// Delete imported image copies
    Prune,
    /// Print the effective configuration
    Config,
}

#[derive(Debug, PartialEq, Eq, Args)]
pub struct ClassifyArgs {
    /// Image paths or file:// URIs
    #[arg(required = true, value_name = "IMAGE")]
    pub images: Vec<String>,

    /// Number of ranked labels to show per image
    #[arg(long, default_value_t = 1, value_parser = clap::value_parser!(u16).range(1..))]
    pub top: u16,

    /// Write a JSON report to this path
    #[arg(long, value_name = "PATH")]
    pub json: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_classify_with_defaults() {
        let cli = Cli::try_parse_from(["trafficmode", "classify", "street.jpg"]).unwrap();
        assert!(!cli.verbose);
        assert!(cli.config.is_none());
        match cli.command {
            Command::Classify(args) => {
                assert_eq!(args.images, vec![String::from("street.jpg")]);
                assert_eq!(args.top, 1);
                assert!(args.json.is_none());
            }
            _ => panic!("expected classify command"),
        }
    }

    #[test]
    fn parses_classify_flags() {
        let cli = Cli::try_parse_from([
            "trafficmode",
            "-v",
            "classify",
            "a.jpg",
            "file:///photos/b.png",
            "--top",
            "3",
            "--json",
            "out/report.json",
            "--config",
            "custom.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.config, Some(PathBuf::from("custom.toml")));
        assert_eq!(
            cli.command,
            Command::Classify(ClassifyArgs {
                images: vec![String::from("a.jpg"), String::from("file:///photos/b.png")],
                top: 3,
                json: Some(PathBuf::from("out/report.json")),
            })
        );
    }

    #[test]
    fn classify_requires_an_image() {
        assert!(Cli::try_parse_from(["trafficmode", "classify"]).is_err());
    }

    #[test]
    fn rejects_zero_top() {
        assert!(Cli::try_parse_from(["trafficmode", "classify", "a.jpg", "--top", "0"]).is_err());
    }

    #[test]
    fn parses_maintenance_commands() {
        let cli = Cli::try_parse_from(["trafficmode", "prune"]).unwrap();
        assert_eq!(cli.command, Command::Prune);
        let cli = Cli::try_parse_from(["trafficmode", "materialize", "--config", "x.toml"]).unwrap();
        assert_eq!(cli.command, Command::Materialize);
        assert_eq!(cli.config, Some(PathBuf::from("x.toml")));
    }
}
