use std::path::PathBuf;

use crate::error::{Error, Result};

pub fn create_state_store_path() -> Result<PathBuf> {
    let home_dir = dirs::home_dir()
        .ok_or_else(|| Error::Configuration("Could not determine home directory".to_string()))?;
    Ok(home_dir.join(".keepstar").join("state.db"))
}
