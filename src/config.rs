//! Runtime settings that do not belong to a single command.

use std::path::PathBuf;

/// Environment variable naming the user store file
pub const USERS_FILE_ENV: &str = "ZIPBROWSE_USERS_FILE";

const DEFAULT_DIR: &str = ".zipbrowse";
const DEFAULT_USERS_FILE: &str = "users.json";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub users_file: PathBuf,
}

impl Config {
    /// Resolve settings: explicit flag, then environment, then the home
    /// directory (current directory if there is no home).
    pub fn resolve(users_file: Option<PathBuf>) -> Self {
        let env = std::env::var_os(USERS_FILE_ENV)
            .filter(|value| !value.is_empty())
            .map(PathBuf::from);
        Self::from_sources(users_file, env, dirs::home_dir())
    }

    fn from_sources(flag: Option<PathBuf>, env: Option<PathBuf>, home: Option<PathBuf>) -> Self {
        let users_file = flag.or(env).unwrap_or_else(|| {
            home.unwrap_or_else(|| PathBuf::from("."))
                .join(DEFAULT_DIR)
                .join(DEFAULT_USERS_FILE)
        });
        Self { users_file }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flag_then_env_then_home() {
        let flag = Some(PathBuf::from("/tmp/flag.json"));
        let env = Some(PathBuf::from("/tmp/env.json"));
        let home = Some(PathBuf::from("/home/me"));

        assert_eq!(
            Config::from_sources(flag, env.clone(), home.clone()).users_file,
            PathBuf::from("/tmp/flag.json")
        );
        assert_eq!(
            Config::from_sources(None, env, home.clone()).users_file,
            PathBuf::from("/tmp/env.json")
        );
        assert_eq!(
            Config::from_sources(None, None, home).users_file,
            PathBuf::from("/home/me/.zipbrowse/users.json")
        );
        assert_eq!(
            Config::from_sources(None, None, None).users_file,
            PathBuf::from("./.zipbrowse/users.json")
        );
    }
}
