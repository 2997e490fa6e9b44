use std::io;

#[derive(thiserror::Error, Debug)]
pub enum Error {
    // from
    #[error("failed io {0}")]
    Io(#[from] io::Error),
    #[error("failed to decode toml {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("origin request failed {0}")]
    Origin(#[from] reqwest::Error),
    #[error("internal error {0}")]
    Any(#[from] anyhow::Error),
}

pub type Result<T, E = Error> = anyhow::Result<T, E>;
