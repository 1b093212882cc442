use crate::config::{DEFAULT_API_BASE_URL, DEFAULT_TIMEOUT_SECS};
use clap::{
    builder::{
        styling::{AnsiColor, Effects, Styles},
        ValueParser,
    },
    Arg, ArgAction, ColorChoice, Command,
};

pub fn validator_log_level() -> ValueParser {
    ValueParser::from(move |level: &str| -> std::result::Result<u8, String> {
        if let Ok(parsed) = level.parse::<u8>() {
            if parsed <= 5 {
                return Ok(parsed);
            }
        }

        match level.to_lowercase().as_str() {
            "error" => Ok(0),
            "warn" => Ok(1),
            "info" => Ok(2),
            "debug" => Ok(3),
            "trace" => Ok(4),
            _ => Err("invalid log level".to_string()),
        }
    })
}

fn username_arg() -> Arg {
    Arg::new("username")
        .short('u')
        .long("username")
        .help("Account username")
        .env("CODENEST_USERNAME")
        .required(true)
}

fn password_arg() -> Arg {
    Arg::new("password")
        .short('p')
        .long("password")
        .help("Account password")
        .env("CODENEST_PASSWORD")
        .hide_env_values(true)
        .required(true)
}

fn profile_args(command: Command, required: bool) -> Command {
    command
        .arg(
            Arg::new("email")
                .long("email")
                .help("Email address")
                .required(required),
        )
        .arg(
            Arg::new("first-name")
                .long("first-name")
                .help("First name")
                .required(required),
        )
        .arg(
            Arg::new("last-name")
                .long("last-name")
                .help("Last name")
                .required(required),
        )
}

pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    Command::new("codenest")
        .about("CodeNest session client")
        .version(env!("CARGO_PKG_VERSION"))
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("api-url")
                .long("api-url")
                .help("Backend API base URL")
                .default_value(DEFAULT_API_BASE_URL)
                .env("CODENEST_API_URL")
                .global(true),
        )
        .arg(
            Arg::new("credentials")
                .short('c')
                .long("credentials")
                .help("File to persist credentials in [default: ~/.config/codenest/credentials.json]")
                .env("CODENEST_CREDENTIALS")
                .global(true),
        )
        .arg(
            Arg::new("timeout")
                .long("timeout")
                .help(format!("Request timeout in seconds [default: {DEFAULT_TIMEOUT_SECS}]"))
                .env("CODENEST_TIMEOUT")
                .global(true)
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbose")
                .help("Verbosity level: ERROR, WARN, INFO, DEBUG, TRACE (default: ERROR)")
                .env("CODENEST_LOG_LEVEL")
                .global(true)
                .action(ArgAction::Count)
                .value_parser(validator_log_level()),
        )
        .subcommand(
            Command::new("login")
                .about("Log in and store the session")
                .arg(username_arg())
                .arg(password_arg()),
        )
        .subcommand(profile_args(
            Command::new("register")
                .about("Create an account and log in")
                .arg(username_arg())
                .arg(password_arg())
                .arg(
                    Arg::new("role")
                        .long("role")
                        .help("Account role")
                        .value_parser(["faculty", "student"])
                        .required(true),
                ),
            true,
        ))
        .subcommand(Command::new("logout").about("End the stored session"))
        .subcommand(
            Command::new("whoami")
                .about("Show the stored user")
                .arg(
                    Arg::new("refresh")
                        .long("refresh")
                        .help("Reload the profile from the backend first")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(profile_args(
            Command::new("update-profile").about("Update profile fields"),
            false,
        ))
        .subcommand(
            Command::new("resend-verification").about("Send the verification email again"),
        )
        .subcommand(
            Command::new("recover")
                .about("Reset a forgotten password")
                .arg(
                    Arg::new("username")
                        .short('u')
                        .long("username")
                        .help("Account username")
                        .required(true),
                )
                .arg(
                    Arg::new("email")
                        .long("email")
                        .help("Email address of the account")
                        .required(true),
                ),
        )
        .subcommand(
            Command::new("check-route")
                .about("Evaluate the route guard for a path")
                .arg(Arg::new("path").help("Application path, e.g. /faculty").required(true)),
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENV_VARS: [&str; 5] = [
        "CODENEST_API_URL",
        "CODENEST_CREDENTIALS",
        "CODENEST_TIMEOUT",
        "CODENEST_LOG_LEVEL",
        "CODENEST_PASSWORD",
    ];

    fn clean_env<F: FnOnce()>(f: F) {
        temp_env::with_vars(ENV_VARS.map(|key| (key, None::<String>)), f);
    }

    #[test]
    fn test_new() {
        let command = new();

        assert_eq!(command.get_name(), "codenest");
        assert_eq!(
            command.get_about().map(ToString::to_string),
            Some("CodeNest session client".to_string())
        );
        assert_eq!(
            command.get_version().map(ToString::to_string),
            Some(env!("CARGO_PKG_VERSION").to_string())
        );
    }

    #[test]
    fn test_defaults() {
        clean_env(|| {
            let matches = new().get_matches_from(vec!["codenest", "logout"]);
            assert_eq!(
                matches.get_one::<String>("api-url").map(String::as_str),
                Some(DEFAULT_API_BASE_URL)
            );
            assert!(matches.get_one::<u64>("timeout").is_none());
            assert!(matches.get_one::<String>("credentials").is_none());
            assert_eq!(matches.subcommand_name(), Some("logout"));
        });
    }

    #[test]
    fn test_login_args() {
        clean_env(|| {
            let matches = new().get_matches_from(vec![
                "codenest",
                "--api-url",
                "https://codenest.dev/api",
                "login",
                "-u",
                "alice",
                "-p",
                "secret123",
            ]);
            assert_eq!(
                matches.get_one::<String>("api-url").map(String::as_str),
                Some("https://codenest.dev/api")
            );
            let login = matches.subcommand_matches("login");
            assert_eq!(
                login
                    .and_then(|m| m.get_one::<String>("username"))
                    .map(String::as_str),
                Some("alice")
            );
            assert_eq!(
                login
                    .and_then(|m| m.get_one::<String>("password"))
                    .map(String::as_str),
                Some("secret123")
            );
        });
    }

    #[test]
    fn test_register_rejects_unknown_role() {
        clean_env(|| {
            let result = new().try_get_matches_from(vec![
                "codenest",
                "register",
                "-u",
                "bob",
                "-p",
                "secret123",
                "--email",
                "bob@uni.edu",
                "--first-name",
                "Bob",
                "--last-name",
                "Ross",
                "--role",
                "admin",
            ]);
            assert!(result.is_err());
        });
    }

    #[test]
    fn test_check_env() {
        temp_env::with_vars(
            [
                ("CODENEST_API_URL", Some("https://codenest.dev/api")),
                ("CODENEST_CREDENTIALS", Some("/tmp/codenest.json")),
                ("CODENEST_TIMEOUT", Some("30")),
                ("CODENEST_LOG_LEVEL", Some("info")),
            ],
            || {
                let matches = new().get_matches_from(vec!["codenest", "whoami"]);
                assert_eq!(
                    matches.get_one::<String>("api-url").map(String::as_str),
                    Some("https://codenest.dev/api")
                );
                assert_eq!(
                    matches.get_one::<String>("credentials").map(String::as_str),
                    Some("/tmp/codenest.json")
                );
                assert_eq!(matches.get_one::<u64>("timeout").copied(), Some(30));
                assert_eq!(matches.get_one::<u8>("verbosity").copied(), Some(2));
            },
        );
    }

    #[test]
    fn test_check_log_level_env() {
        let levels = ["error", "warn", "info", "debug", "trace"];
        for (index, &level) in levels.iter().enumerate() {
            temp_env::with_vars([("CODENEST_LOG_LEVEL", Some(level))], || {
                let matches = new().get_matches_from(vec!["codenest", "logout"]);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }

    #[test]
    fn test_check_log_level_verbosity() {
        for index in 0..5_usize {
            temp_env::with_vars([("CODENEST_LOG_LEVEL", None::<String>)], || {
                let mut args = vec!["codenest".to_string(), "check-route".to_string()];
                args.push("/faculty".to_string());

                if index > 0 {
                    args.push(format!("-{}", "v".repeat(index)));
                }

                let matches = new().get_matches_from(args);
                assert_eq!(
                    matches.get_one::<u8>("verbosity").copied(),
                    u8::try_from(index).ok()
                );
            });
        }
    }
}
