use crate::{
    auth::{AuthFailure, SessionManager, User},
    cli::{actions::Action, globals::GlobalArgs},
};
use anyhow::{anyhow, Result};
use secrecy::ExposeSecret;

fn print_user(user: &User) {
    println!("{} ({})", user.username, user.role);
    let name = format!("{} {}", user.first_name, user.last_name);
    if !name.trim().is_empty() {
        println!("  name:     {}", name.trim());
    }
    if !user.email.is_empty() {
        let verified = if user.email_verified {
            "verified"
        } else {
            "not verified"
        };
        println!("  email:    {} ({verified})", user.email);
    }
    println!("  home:     {}", user.role.home_path());
}

fn failure(err: AuthFailure) -> anyhow::Error {
    anyhow!(err)
}

/// Handle session actions
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    let manager = globals.connect()?;
    run(&manager, action).await
}

pub(crate) async fn run(manager: &SessionManager, action: Action) -> Result<()> {
    match action {
        Action::Login { username, password } => {
            let user = manager
                .login(&username, password.expose_secret())
                .await
                .map_err(failure)?;
            print_user(&user);
        }
        Action::Register { fields } => {
            let registration = manager.register(fields).await.map_err(failure)?;
            print_user(&registration.user);
            if let Some(message) = registration.email_message {
                println!("{message}");
            }
        }
        Action::Logout => {
            manager.logout().await;
            println!("Logged out");
        }
        Action::Whoami { refresh } => {
            let user = if refresh {
                Some(manager.refresh_profile().await.map_err(failure)?)
            } else {
                manager.session().user
            };
            match user {
                Some(user) => print_user(&user),
                None => println!("Not logged in"),
            }
        }
        Action::UpdateProfile { update } => {
            let user = manager.update_profile(&update).await.map_err(failure)?;
            print_user(&user);
        }
        Action::ResendVerification => {
            let message = manager.resend_verification().await.map_err(failure)?;
            println!("{message}");
        }
        Action::Recover { .. } | Action::CheckRoute { .. } => {
            return Err(anyhow!("not a session action"));
        }
    }

    Ok(())
}
