use crate::tracing::{LogLevel, TracingFormat};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "devpack")]
#[command(about = "Keep the lint tool and the QA kit installed and up to date")]
#[command(long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short = 'l',
        long,
        global = true,
        help = "Set logging level",
        default_value = "warn",
        value_enum
    )]
    pub level: LogLevel,

    #[arg(
        long = "log-format",
        global = true,
        help = "Log output format",
        default_value = "compact",
        value_enum
    )]
    pub log_format: TracingFormat,

    #[arg(long, global = true, help = "Registry mirror for installs and queries")]
    pub registry: Option<String>,

    #[arg(long, global = true, help = "Install into this prefix instead of the global one")]
    pub prefix: Option<PathBuf>,

    #[arg(long, global = true, help = "Hide the progress bar")]
    pub no_progress: bool,
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum Commands {
    #[command(about = "Make sure every managed tool is installed and current")]
    Boot,
    #[command(about = "Repair commands")]
    Fix {
        #[command(subcommand)]
        subcommand: FixCommands,
    },
    #[command(about = "Provision the QA kit for organization repositories among these paths")]
    Open {
        #[arg(required = true, help = "Files or directories being opened")]
        paths: Vec<PathBuf>,
    },
    #[command(about = "Show installed and latest versions without installing")]
    Status {
        #[arg(long, help = "Print JSON instead of a table")]
        json: bool,
    },
}

#[derive(Subcommand, Debug, PartialEq, Eq)]
pub enum FixCommands {
    #[command(about = "Re-run provisioning, ignoring the cool-down and cached results")]
    Boot,
    #[command(about = "Repair the QA kit (reserved)")]
    Qakit,
}

pub fn parse() -> Cli {
    Cli::parse()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_values() {
        let cli = Cli::try_parse_from(["devpack", "boot"]).unwrap();

        assert_eq!(cli.level, LogLevel::Warn);
        assert_eq!(cli.log_format, TracingFormat::Compact);
        assert!(cli.registry.is_none());
        assert!(!cli.no_progress);
        assert_eq!(cli.command, Commands::Boot);
    }

    #[test]
    fn test_fix_subcommands() {
        let cli = Cli::try_parse_from(["devpack", "fix", "boot"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Fix {
                subcommand: FixCommands::Boot
            }
        );

        let cli = Cli::try_parse_from(["devpack", "fix", "qakit"]).unwrap();
        assert_eq!(
            cli.command,
            Commands::Fix {
                subcommand: FixCommands::Qakit
            }
        );
    }

    #[test]
    fn test_open_requires_paths() {
        assert!(Cli::try_parse_from(["devpack", "open"]).is_err());

        let cli = Cli::try_parse_from(["devpack", "open", "src/main.rs", "docs"]).unwrap();
        let Commands::Open { paths } = cli.command else {
            panic!("Expected open command");
        };
        assert_eq!(paths, vec![PathBuf::from("src/main.rs"), PathBuf::from("docs")]);
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "devpack",
            "status",
            "--json",
            "-l",
            "debug",
            "--registry",
            "https://registry.npmmirror.com",
            "--prefix",
            "/tmp/devpack",
        ])
        .unwrap();

        assert_eq!(cli.command, Commands::Status { json: true });
        assert_eq!(cli.level, LogLevel::Debug);
        assert_eq!(cli.registry.as_deref(), Some("https://registry.npmmirror.com"));
        assert_eq!(cli.prefix, Some(PathBuf::from("/tmp/devpack")));
    }

    #[test]
    fn test_unknown_fix_target() {
        assert!(Cli::try_parse_from(["devpack", "fix", "everything"]).is_err());
    }
}
