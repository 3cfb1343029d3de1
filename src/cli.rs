//! CLI argument definitions using clap derive macros.

use clap::Parser;

/// Invite a beta tester to an app's TestFlight program.
///
/// Signs in to App Store Connect with the given account (the password is
/// prompted for interactively), infers the team and default external tester
/// group when not supplied, and invites the given email address.
#[derive(Parser, Debug)]
#[command(name = "tfinvite")]
#[command(author, version, about)]
pub struct Args {
    /// App Store Connect login email
    pub login_email: String,

    /// Numeric application identifier
    pub app_id: u64,

    /// Email address of the tester to invite
    pub invitee_email: String,

    /// Invitee first name
    #[arg(default_value = "")]
    pub first_name: String,

    /// Invitee last name
    #[arg(default_value = "")]
    pub last_name: String,

    /// HTTPS proxy address for session traffic
    #[arg(long)]
    pub proxy: Option<String>,

    /// Tester group id to assign, skipping default-group inference
    #[arg(long)]
    pub group_id: Option<String>,

    /// Content provider (team) id, skipping profile inference
    #[arg(long)]
    pub content_provider_id: Option<String>,

    /// Increase output verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress non-error output
    #[arg(short, long)]
    pub quiet: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_positional_args_parse() {
        let args = Args::try_parse_from([
            "tfinvite",
            "dev@example.com",
            "12345",
            "tester@example.com",
            "Ada",
            "Lovelace",
        ])
        .unwrap();
        assert_eq!(args.login_email, "dev@example.com");
        assert_eq!(args.app_id, 12345);
        assert_eq!(args.invitee_email, "tester@example.com");
        assert_eq!(args.first_name, "Ada");
        assert_eq!(args.last_name, "Lovelace");
    }

    #[test]
    fn test_cli_names_default_to_empty() {
        let args =
            Args::try_parse_from(["tfinvite", "dev@example.com", "12345", "tester@example.com"])
                .unwrap();
        assert_eq!(args.first_name, "");
        assert_eq!(args.last_name, "");
    }

    #[test]
    fn test_cli_missing_positionals_is_usage_error() {
        let result = Args::try_parse_from(["tfinvite", "dev@example.com"]);
        assert!(result.is_err());
        assert_eq!(
            result.unwrap_err().kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_cli_non_numeric_app_id_is_rejected() {
        let result = Args::try_parse_from([
            "tfinvite",
            "dev@example.com",
            "not-a-number",
            "tester@example.com",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_cli_linkage_overrides_parse() {
        let args = Args::try_parse_from([
            "tfinvite",
            "--group-id",
            "g-1",
            "--content-provider-id",
            "11142800",
            "dev@example.com",
            "12345",
            "tester@example.com",
        ])
        .unwrap();
        assert_eq!(args.group_id.as_deref(), Some("g-1"));
        assert_eq!(args.content_provider_id.as_deref(), Some("11142800"));
    }

    #[test]
    fn test_cli_help_flag_shows_usage() {
        // --help causes early exit, so we check it returns an error with Help kind
        let result = Args::try_parse_from(["tfinvite", "--help"]);
        assert!(result.is_err());
        let err = result.unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
