use crate::{
    auth::{route_access, Access, GuardDecision, RouteGuard},
    cli::{actions::Action, globals::GlobalArgs},
};
use anyhow::{anyhow, Result};

/// Handle the check-route action
pub async fn handle(action: Action, globals: &GlobalArgs) -> Result<()> {
    let Action::CheckRoute { path } = action else {
        return Err(anyhow!("not a check-route action"));
    };

    let manager = globals.connect()?;
    let guard = RouteGuard::new(manager.state().clone());

    let rule = match route_access(&path) {
        Access::Public => "public".to_string(),
        Access::GuestOnly => "guest only".to_string(),
        Access::Unknown => "unknown".to_string(),
        Access::Authenticated => "authenticated".to_string(),
        Access::Role(role) => format!("role {role}"),
    };

    match guard.check_path(&path) {
        GuardDecision::Allow => println!("{path} ({rule}): allow"),
        GuardDecision::Pending => println!("{path} ({rule}): pending"),
        GuardDecision::Redirect(route) => println!("{path} ({rule}): redirect to {route}"),
    }

    Ok(())
}
