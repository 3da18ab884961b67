// ABOUTME: Exec command implementation.
// ABOUTME: Runs one command on a remote host and relays its output.

use crate::cli::ExecArgs;
use sshrun::config::{Config, HostConfig, HostKeyPolicy};
use sshrun::diagnostics::Diagnostics;
use sshrun::error::{Error, Result};
use sshrun::output::Output;
use sshrun::ssh::{self, Client, ClientConfig, Secret};

/// Execute a command on the target host.
pub async fn exec_command(config: Config, args: ExecArgs, mut output: Output) -> Result<()> {
    let host = apply_overrides(config.resolve_target(&args.target)?, &args);
    let client_config = client_config(&config, &host, &args)?;

    let mut diag = Diagnostics::default();
    diag.check_client_config(&client_config);
    for warning in diag.warnings() {
        output.warning(&warning.message);
    }

    let label = format!("{}@{}", client_config.user, client_config.endpoint);
    let command = args.command.join(" ");

    output.start_timer();
    output.progress(&format!("  → Connecting to {}...", label));

    let client = Client::new(client_config);
    let result = client.exec(&command).await;
    client.close().await;

    let result = result.inspect_err(|e| {
        if e.kind().is_auth() {
            output.warning("check the login name, --identity or --password-env");
        }
    })?;

    // A failed command prints nothing to stdout; the error carries status and stderr
    if result.success() {
        output.command_output(&label, &result);
    } else {
        result.into_stdout().map_err(ssh::Error::from)?;
    }

    output.success(&format!("  ✓ Command finished on {}", label));
    Ok(())
}

/// Command-line flags take precedence over the config file.
fn apply_overrides(mut host: HostConfig, args: &ExecArgs) -> HostConfig {
    if let Some(port) = args.port {
        host.port = port;
    }
    if let Some(user) = &args.user {
        host.user = Some(user.clone());
    }
    if let Some(identity) = &args.identity {
        host.key = Some(identity.clone());
    }
    if let Some(path) = &args.known_hosts {
        host.known_hosts = Some(path.clone());
    }
    if args.accept_any_host_key {
        host.host_key = HostKeyPolicy::AcceptAny;
    } else if args.trust_on_first_use {
        host.host_key = HostKeyPolicy::TrustOnFirstUse;
    }
    host
}

fn client_config(config: &Config, host: &HostConfig, args: &ExecArgs) -> Result<ClientConfig> {
    let mut client_config = config.client_config(host)?;

    if let Some(var) = &args.password_env {
        let password =
            std::env::var(var).map_err(|_| Error::MissingEnvVar(var.clone()))?;
        client_config.password = Some(Secret::new(password));
    }
    if let Some(timeout) = args.timeout {
        client_config = client_config.command_timeout(Some(timeout));
    }

    Ok(client_config)
}
