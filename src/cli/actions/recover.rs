use crate::{
    auth::{navigation::Navigator, PasswordRecovery, RecoveryError, TracingNavigator},
    cli::{actions::Action, globals::GlobalArgs},
};
use anyhow::{anyhow, Result};
use std::sync::Arc;
use tokio::io::{self, AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};

/// Attempts per step before giving up.
const MAX_ATTEMPTS: usize = 3;

async fn prompt(lines: &mut Lines<BufReader<Stdin>>, label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    stdout.write_all(label.as_bytes()).await?;
    stdout.flush().await?;

    lines
        .next_line()
        .await?
        .ok_or_else(|| anyhow!("input closed"))
}

/// Handle the recover action: request a code, then prompt for it and for the new password.
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    let Action::Recover { username, email } = action else {
        return Err(anyhow!("not a recover action"));
    };

    let manager = globals.connect()?;
    let navigator: Arc<dyn Navigator> = Arc::new(TracingNavigator);
    let mut flow = PasswordRecovery::new(manager.api().clone(), navigator);
    let mut lines = BufReader::new(io::stdin()).lines();

    flow.begin();
    println!("{}", flow.submit_request(&username, &email).await?);

    let mut verified = false;
    for _ in 0..MAX_ATTEMPTS {
        let code = prompt(&mut lines, "Reset code: ").await?;
        match flow.submit_code(&code).await {
            Ok(()) => {
                verified = true;
                break;
            }
            Err(RecoveryError::Transport(message)) => return Err(anyhow!(message)),
            Err(err) => eprintln!("{err}"),
        }
    }
    if !verified {
        flow.back();
        return Err(anyhow!("reset code not verified"));
    }

    for _ in 0..MAX_ATTEMPTS {
        let new_password = prompt(&mut lines, "New password: ").await?;
        let confirm_password = prompt(&mut lines, "Confirm password: ").await?;
        match flow.submit_new_password(&new_password, &confirm_password).await {
            Ok(message) => {
                println!("{message}");
                return Ok(());
            }
            Err(RecoveryError::Transport(message)) => return Err(anyhow!(message)),
            Err(err) => eprintln!("{err}"),
        }
    }

    flow.back();
    Err(anyhow!("password not reset"))
}
