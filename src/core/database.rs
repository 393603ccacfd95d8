use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::prelude::*;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("could not access {}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("{} is not a valid database document", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BotConfigRow {
    pub id: u32,
    pub currency_name: String,
    pub currency_sign: String,
    pub forward_to_owners: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EightBallResponse {
    pub id: u32,
    pub text: String,
}

/// The whole persisted state
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Tables {
    #[serde(default)]
    pub bot_config: Vec<BotConfigRow>,
    #[serde(default)]
    pub eight_ball: Vec<EightBallResponse>,
}

const EIGHT_BALL_DEFAULTS: &[&str] = &[
    "Most definitely yes",
    "For sure",
    "As I see it, yes",
    "My sources say yes",
    "Yes",
    "Most likely",
    "Perhaps",
    "Maybe",
    "Not sure",
    "It is uncertain",
    "Ask me again later",
    "Don't count on it",
    "Probably not",
    "Very doubtful",
    "Most likely no",
    "Nope",
    "No",
    "My sources say no",
    "Dont even think about it",
    "Definitely no",
    "NO - It may cause disease contraction",
];

/// Owner of the persisted tables. All access goes through a [`DbContext`].
pub struct DbHandler {
    path: Option<PathBuf>,
    tables: Mutex<Tables>,
}

impl DbHandler {
    /// Store backed by a JSON file, created on the first save
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let tables = match std::fs::read(path) {
            Ok(bytes) => serde_json::from_slice(&bytes).map_err(|source| DbError::Corrupt {
                path: path.to_path_buf(),
                source,
            })?,
            Err(why) if why.kind() == io::ErrorKind::NotFound => Tables::default(),
            Err(source) => {
                return Err(DbError::Io {
                    path: path.to_path_buf(),
                    source,
                })
            }
        };
        Ok(Self {
            path: Some(path.to_path_buf()),
            tables: Mutex::new(tables),
        })
    }

    pub fn in_memory() -> Self {
        Self {
            path: None,
            tables: Mutex::new(Tables::default()),
        }
    }

    /// Exclusive context over a working copy of the tables. Dropping it
    /// without [`DbContext::save_changes`] throws the changes away.
    pub fn context(&self) -> DbContext<'_> {
        let committed = lock(&self.tables);
        DbContext {
            working: committed.clone(),
            committed,
            path: self.path.as_deref(),
        }
    }

    #[cfg(test)]
    pub fn snapshot(&self) -> Tables {
        lock(&self.tables).clone()
    }
}

pub struct DbContext<'a> {
    committed: MutexGuard<'a, Tables>,
    working: Tables,
    path: Option<&'a Path>,
}

impl<'a> DbContext<'a> {
    pub fn tables(&self) -> &Tables {
        &self.working
    }

    #[cfg(test)]
    pub fn tables_mut(&mut self) -> &mut Tables {
        &mut self.working
    }

    /// Inserts whatever baseline rows are missing and returns how many were
    /// added. Running it on a seeded store changes nothing.
    pub fn ensure_seed_data(&mut self) -> usize {
        let mut inserted = 0;
        let tables = &mut self.working;

        if !tables.bot_config.iter().any(|row| row.id == 1) {
            tables.bot_config.push(BotConfigRow {
                id: 1,
                currency_name: "Kestrel Feather".into(),
                currency_sign: "🪶".into(),
                forward_to_owners: false,
            });
            inserted += 1;
        }

        for (id, text) in (1..).zip(EIGHT_BALL_DEFAULTS) {
            if tables.eight_ball.iter().all(|row| row.id != id) {
                tables.eight_ball.push(EightBallResponse {
                    id,
                    text: text.to_string(),
                });
                inserted += 1;
            }
        }
        inserted
    }

    pub fn has_changes(&self) -> bool {
        *self.committed != self.working
    }

    pub fn save_changes(&mut self) -> Result<(), DbError> {
        if !self.has_changes() {
            return Ok(());
        }
        if let Some(path) = self.path {
            write_document(path, &self.working)?;
        }
        *self.committed = self.working.clone();
        Ok(())
    }
}

// Written next to the target and renamed over it so a crash never leaves
// half a document behind
fn write_document(path: &Path, tables: &Tables) -> Result<(), DbError> {
    let io_err = |source| DbError::Io {
        path: path.to_path_buf(),
        source,
    };
    let bytes = serde_json::to_vec_pretty(tables).map_err(|source| DbError::Corrupt {
        path: path.to_path_buf(),
        source,
    })?;
    let tmp = path.with_extension("tmp");
    std::fs::write(&tmp, bytes).map_err(io_err)?;
    std::fs::rename(&tmp, path).map_err(io_err)
}
