// ABOUTME: Hosts command implementation.
// ABOUTME: Lists the host aliases defined in the config file.

use sshrun::config::Config;
use sshrun::error::Result;
use sshrun::output::Output;

pub fn list_hosts(config: &Config, output: &Output) -> Result<()> {
    if config.hosts.is_empty() {
        output.progress("No hosts configured");
        return Ok(());
    }

    for (alias, host) in &config.hosts {
        let user = host.user.as_deref().or(config.user.as_deref());
        let line = match user {
            Some(user) => format!("{}\t{}@{}:{}", alias, user, host.host, host.port),
            None => format!("{}\t{}:{}", alias, host.host, host.port),
        };
        output.line(&line);
    }
    Ok(())
}
