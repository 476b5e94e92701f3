//! On-disk layout of a chain.

use std::fs;
use std::io;
use std::path::PathBuf;

use powledger_consensus::Network;

#[derive(Clone, Debug)]
pub struct ChainConfig {
    pub data_dir: PathBuf,
    pub network: Network,
}

impl ChainConfig {
    pub fn new(data_dir: impl Into<PathBuf>, network: Network) -> Self {
        Self {
            data_dir: data_dir.into(),
            network,
        }
    }

    /// `<data_dir>/<network>`; networks never share a directory.
    pub fn chain_dir(&self) -> PathBuf {
        self.data_dir.join(self.network.as_str())
    }

    pub fn db_dir(&self) -> PathBuf {
        self.chain_dir().join("db")
    }

    pub fn ensure_dirs(&self) -> io::Result<()> {
        fs::create_dir_all(self.db_dir())
    }

    /// Removes the network's chain directory. A missing directory is not an error.
    pub fn wipe(&self) -> io::Result<()> {
        match fs::remove_dir_all(self.chain_dir()) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}
