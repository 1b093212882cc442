use crate::{
    auth::{RegisterRequest, Role, UserUpdate},
    cli::{actions::Action, globals::GlobalArgs},
};
use anyhow::{anyhow, Context, Result};
use secrecy::SecretString;

pub fn handler(matches: &clap::ArgMatches) -> Result<(Action, GlobalArgs)> {
    let globals = GlobalArgs {
        api_url: matches
            .get_one::<String>("api-url")
            .cloned()
            .unwrap_or_default(),
        credentials: matches.get_one::<String>("credentials").cloned(),
        timeout_secs: matches.get_one::<u64>("timeout").copied(),
    };

    let sub_m = |subcommand: &str| sub_matches(matches, subcommand);

    let action = match matches.subcommand_name() {
        Some("login") => {
            let m = sub_m("login")?;
            Action::Login {
                username: required(m, "username")?,
                password: SecretString::from(required(m, "password")?),
            }
        }
        Some("register") => {
            let m = sub_m("register")?;
            let role: Role = required(m, "role")?.parse().map_err(|e| anyhow!("{e}"))?;
            Action::Register {
                fields: RegisterRequest {
                    username: required(m, "username")?,
                    email: required(m, "email")?,
                    password: required(m, "password")?,
                    first_name: required(m, "first-name")?,
                    last_name: required(m, "last-name")?,
                    role,
                },
            }
        }
        Some("logout") => Action::Logout,
        Some("whoami") => Action::Whoami {
            refresh: sub_m("whoami")?.get_flag("refresh"),
        },
        Some("update-profile") => {
            let m = sub_m("update-profile")?;
            let update = UserUpdate {
                email: m.get_one::<String>("email").cloned(),
                first_name: m.get_one::<String>("first-name").cloned(),
                last_name: m.get_one::<String>("last-name").cloned(),
                ..UserUpdate::default()
            };
            if update.is_empty() {
                return Err(anyhow!("nothing to update"));
            }
            Action::UpdateProfile { update }
        }
        Some("resend-verification") => Action::ResendVerification,
        Some("recover") => {
            let m = sub_m("recover")?;
            Action::Recover {
                username: required(m, "username")?,
                email: required(m, "email")?,
            }
        }
        Some("check-route") => Action::CheckRoute {
            path: required(sub_m("check-route")?, "path")?,
        },
        _ => return Err(anyhow!("unknown subcommand")),
    };

    Ok((action, globals))
}

fn sub_matches<'a>(matches: &'a clap::ArgMatches, name: &str) -> Result<&'a clap::ArgMatches> {
    matches
        .subcommand_matches(name)
        .context("arguments not found")
}

fn required(matches: &clap::ArgMatches, name: &str) -> Result<String> {
    matches
        .get_one::<String>(name)
        .cloned()
        .ok_or_else(|| anyhow!("missing required argument: --{name}"))
}
