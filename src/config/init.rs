// ABOUTME: Config scaffolding for new projects.
// ABOUTME: Creates sshrun.yml template files.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

use super::CONFIG_FILENAME;

const TEMPLATE: &str = r#"# Default deadlines (humantime format: 30s, 5m, 1h)
connect_timeout: 30s
command_timeout: 5m

hosts:
  # Short form: [user@]host[:port]
  web: deploy@server.example.com:22

  # Detailed form
  db:
    host: db.example.com
    port: 22
    user: admin
    # password: { env: DB_PASSWORD }
    # key: ~/.ssh/id_ed25519
    # Host key checking: strict (default), trust-on-first-use, accept-any
    host_key: strict
"#;

/// Write a template config into `dir`. Returns the path written.
pub fn init_config(dir: &Path, force: bool) -> Result<PathBuf> {
    let config_path = dir.join(CONFIG_FILENAME);

    if config_path.exists() && !force {
        return Err(Error::AlreadyExists(config_path));
    }

    std::fs::write(&config_path, TEMPLATE)?;
    Ok(config_path)
}
