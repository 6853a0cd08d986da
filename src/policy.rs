//! JSON persistence of a solved policy.
//!
//! A policy file is an array of `{index, action, value}` records, one per
//! state in enumeration order, with the action stored as its numeric code.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::{is_legal, Action, StateTable};

/// One state's entry in a policy file.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PolicyRecord {
    pub index: usize,
    pub action: Action,
    pub value: f64,
}

/// Every record of a policy file, in index order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PolicyDocument {
    pub records: Vec<PolicyRecord>,
}

impl PolicyDocument {
    /// Snapshot of the favoured action and value of every state in `table`.
    pub fn from_table(table: &StateTable) -> Self {
        Self {
            records: table
                .iter()
                .map(|state| PolicyRecord {
                    index: state.index(),
                    action: state.favoured,
                    value: state.value,
                })
                .collect(),
        }
    }

    pub fn to_writer<W: Write>(&self, writer: W) -> Result<()> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        Ok(serde_json::from_reader(reader)?)
    }

    /// Checks the document against `table` without touching it.
    ///
    /// # Errors
    /// * [`Error::RecordCount`] if there is not exactly one record per state
    /// * [`Error::RecordOrder`] if a record sits at the wrong position
    /// * [`Error::IllegalAction`] if a record's action is not admissible in its state
    pub fn validate(&self, table: &StateTable) -> Result<()> {
        if self.records.len() != table.len() {
            return Err(Error::RecordCount {
                expected: table.len(),
                found: self.records.len(),
            });
        }
        for (position, (record, state)) in self.records.iter().zip(table.iter()).enumerate() {
            if record.index != position {
                return Err(Error::RecordOrder {
                    position,
                    index: record.index,
                });
            }
            if !is_legal(state.key(), record.action) {
                return Err(Error::IllegalAction {
                    index: record.index,
                    action: record.action,
                });
            }
        }
        Ok(())
    }

    /// Restores every state's favoured action and value. Nothing is written
    /// unless the whole document validates; a document taken from an unsolved
    /// table, where every state still favours `None`, does not.
    pub fn apply(&self, table: &mut StateTable) -> Result<()> {
        self.validate(table)?;
        for (state, record) in table.iter_mut().zip(&self.records) {
            state.favoured = record.action;
            state.value = record.value;
        }
        Ok(())
    }
}

/// Writes the policy held in `table` to `path`.
///
/// The document goes to a sibling `.tmp` file first and is renamed into
/// place, so an interrupted save never leaves a truncated policy behind.
pub fn save<P: AsRef<Path>>(table: &StateTable, path: P) -> Result<()> {
    let path = path.as_ref();
    let temp_path = path.with_extension("json.tmp");

    let mut writer = BufWriter::new(File::create(&temp_path)?);
    PolicyDocument::from_table(table).to_writer(&mut writer)?;
    writer.flush()?;
    drop(writer);
    fs::rename(&temp_path, path)?;

    info!("saved policy for {} states to {}", table.len(), path.display());
    Ok(())
}

pub fn load<P: AsRef<Path>>(path: P) -> Result<PolicyDocument> {
    let path = path.as_ref();
    let document = PolicyDocument::from_reader(BufReader::new(File::open(path)?))?;
    debug!("read {} policy records from {}", document.records.len(), path.display());
    Ok(document)
}

/// Loads `path` and applies it to `table`.
pub fn load_into<P: AsRef<Path>>(path: P, table: &mut StateTable) -> Result<()> {
    load(path)?.apply(table)
}
