//! Lookup of passwords in a libpq password file (`~/.pgpass`).
//!
//! Each non-comment line has the form `hostname:port:database:username:password`. The first
//! four fields may be `*` to match anything; `:` and `\` inside a field are escaped with `\`.
//! The first matching line wins.

use secrecy::SecretString;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors raised while reading a password file.
#[derive(Debug, Error)]
pub enum PgPassError {
    /// The file exists but could not be read.
    #[error("failed to read password file `{path}`: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The file is readable by group or others and is ignored, as libpq does.
    #[error("password file `{0}` has group or world access; permissions should be u=rw (0600) or less")]
    InsecurePermissions(PathBuf),
}

/// A single parsed password file entry.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PgPassEntry {
    host: String,
    port: String,
    database: String,
    username: String,
    password: String,
}

impl PgPassEntry {
    fn matches(&self, host: &str, port: u16, database: &str, username: &str) -> bool {
        fn field_matches(pattern: &str, value: &str) -> bool {
            pattern == "*" || pattern == value
        }

        field_matches(&self.host, host)
            && field_matches(&self.port, &port.to_string())
            && field_matches(&self.database, database)
            && field_matches(&self.username, username)
    }
}

/// Splits one line into its unescaped fields. Lines with fewer than five fields are skipped.
fn parse_line(line: &str) -> Option<PgPassEntry> {
    let mut fields = Vec::with_capacity(5);
    let mut current = String::new();
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            // The password is the last field and may contain unescaped colons.
            ':' if fields.len() < 4 => fields.push(std::mem::take(&mut current)),
            c => current.push(c),
        }
    }
    fields.push(current);

    let [host, port, database, username, password] = <[String; 5]>::try_from(fields).ok()?;

    Some(PgPassEntry {
        host,
        port,
        database,
        username,
        password,
    })
}

/// Finds the password for the given connection parameters in `contents`.
fn find_password(
    contents: &str,
    host: &str,
    port: u16,
    database: &str,
    username: &str,
) -> Option<String> {
    contents
        .lines()
        .map(|line| line.trim_end_matches('\r'))
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(parse_line)
        .find(|entry| entry.matches(host, port, database, username))
        .map(|entry| entry.password)
}

#[cfg(unix)]
fn check_permissions(path: &Path) -> Result<(), PgPassError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata = std::fs::metadata(path).map_err(|source| PgPassError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    if metadata.permissions().mode() & 0o077 != 0 {
        return Err(PgPassError::InsecurePermissions(path.to_path_buf()));
    }

    Ok(())
}

#[cfg(not(unix))]
fn check_permissions(_path: &Path) -> Result<(), PgPassError> {
    Ok(())
}

/// Looks up the password for a connection in the password file at `path`.
///
/// A missing file is not an error and yields `Ok(None)`.
pub fn lookup_password(
    path: &Path,
    host: &str,
    port: u16,
    database: &str,
    username: &str,
) -> Result<Option<SecretString>, PgPassError> {
    if !path.is_file() {
        return Ok(None);
    }

    check_permissions(path)?;

    let contents = std::fs::read_to_string(path).map_err(|source| PgPassError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    Ok(find_password(&contents, host, port, database, username).map(SecretString::new))
}
