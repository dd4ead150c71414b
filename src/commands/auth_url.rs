//! Yahoo consent URL command implementation

use crate::{config::AppConfig, oauth::authorization_url, Result};

/// Print the URL a Yahoo user opens to approve access and receive a code.
pub fn handle_auth_url(config: &AppConfig) -> Result<()> {
    let app = config.require_yahoo_app()?;
    let url = authorization_url(&config.endpoints.yahoo_auth, app)?;
    println!("{url}");
    eprintln!("Open the URL, approve access, then pass the code with `recap --auth-code`.");
    Ok(())
}
