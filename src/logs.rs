use fs2::FileExt;
use serde_json::Value;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;

use crate::error::{BummrError, BummrResult};
use crate::paths::ensure_parent_dir;

pub fn append_jsonl(path: &Path, value: &Value) -> BummrResult<()> {
    ensure_parent_dir(path).map_err(BummrError::invalid)?;
    let mut f = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| BummrError::io(format!("failed opening {}", path.display()), e))?;
    f.lock_exclusive()
        .map_err(|e| BummrError::io(format!("failed locking {}", path.display()), e))?;
    let mut line =
        serde_json::to_string(value).map_err(|e| BummrError::json("log json serialize", e))?;
    line.push('\n');
    let write_res = f
        .write_all(line.as_bytes())
        .map_err(|e| BummrError::io(format!("failed writing {}", path.display()), e));
    let _ = FileExt::unlock(&f);
    write_res
}

/// Every parseable row; blank and corrupt lines are skipped.
pub fn load_values(path: &Path) -> BummrResult<Vec<Value>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let file = File::open(path)
        .map_err(|e| BummrError::io(format!("cannot open {}", path.display()), e))?;
    let mut out = Vec::new();
    for line in BufReader::new(file).lines() {
        let line =
            line.map_err(|e| BummrError::io(format!("cannot read {}", path.display()), e))?;
        if line.trim().is_empty() {
            continue;
        }
        if let Ok(v) = serde_json::from_str::<Value>(&line) {
            out.push(v);
        }
    }
    Ok(out)
}

pub fn tail_values(path: &Path, n: usize) -> BummrResult<Vec<Value>> {
    let mut rows = load_values(path)?;
    let keep = rows.len().saturating_sub(n);
    Ok(rows.split_off(keep))
}
