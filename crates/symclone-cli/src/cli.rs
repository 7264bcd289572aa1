//! CLI argument parsing using clap derive

use std::path::PathBuf;

use clap::Parser;

/// symclone - Mirror a directory tree as real directories full of symlinks
///
/// Every source directory becomes a real directory in the destination and
/// every source file becomes an absolute symlink to it. Entries that only
/// exist in the destination are left alone. The destination is only touched
/// when it differs from what a merge would produce.
///
/// Examples:
///   symclone --src /opt/app/share --dest /srv/share
///   symclone --src ./assets --dest ./public --mode 0755 --owner www-data
///   symclone --task deploy.toml --json
#[derive(Parser, Debug)]
#[command(name = "symclone")]
#[command(author, version, about, long_about)]
pub struct Cli {
    /// Source directory to mirror
    #[arg(long, env = "SYMCLONE_SRC")]
    pub src: Option<PathBuf>,

    /// Destination directory
    #[arg(long, visible_aliases = ["path", "name"], env = "SYMCLONE_DEST")]
    pub dest: Option<PathBuf>,

    /// Mode for destination directories: octal (0755) or symbolic (u=rwX,go=rX)
    #[arg(long)]
    pub mode: Option<String>,

    /// Owner for destination directories, by name or uid
    #[arg(long)]
    pub owner: Option<String>,

    /// Group for destination directories, by name or gid
    #[arg(long)]
    pub group: Option<String>,

    /// Task file (TOML, JSON or YAML) providing any of the options above
    #[arg(long, value_name = "FILE")]
    pub task: Option<PathBuf>,

    /// Print the report as JSON
    #[arg(long)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_minimal() {
        let cli = Cli::try_parse_from(["symclone", "--src", "a", "--dest", "b"]).unwrap();
        assert_eq!(cli.src, Some(PathBuf::from("a")));
        assert_eq!(cli.dest, Some(PathBuf::from("b")));
        assert!(!cli.json);
        assert!(!cli.verbose);
    }

    #[test]
    fn parse_destination_aliases() {
        for flag in ["--path", "--name"] {
            let cli = Cli::try_parse_from(["symclone", flag, "out"]).unwrap();
            assert_eq!(cli.dest, Some(PathBuf::from("out")), "alias {}", flag);
        }
    }

    #[test]
    fn parse_metadata_flags() {
        let cli = Cli::try_parse_from([
            "symclone", "--src", "a", "--dest", "b", "--mode", "u=rwX", "--owner", "0",
            "--group", "staff", "--json", "-v",
        ])
        .unwrap();
        assert_eq!(cli.mode.as_deref(), Some("u=rwX"));
        assert_eq!(cli.owner.as_deref(), Some("0"));
        assert_eq!(cli.group.as_deref(), Some("staff"));
        assert!(cli.json);
        assert!(cli.verbose);
    }
}
