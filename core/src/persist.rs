use crate::config::TokenizerConfig;
use crate::error::{Error, Result};
use crate::index::InvertedIndex;
use serde::{Deserialize, Serialize};
use std::fs::{self, create_dir_all, File};
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

pub const SNAPSHOT_VERSION: u32 = 3;

#[derive(Debug, Serialize, Deserialize)]
pub struct MetaFile {
    pub num_docs: u32,
    pub num_terms: u32,
    pub created_at: String,
    pub version: u32,
    /// Terms in the snapshot were produced with these settings.
    #[serde(default)]
    pub tokenizer: TokenizerConfig,
}

#[derive(Debug, Clone)]
pub struct IndexPaths {
    pub root: PathBuf,
}

impl IndexPaths {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self { root: root.as_ref().to_path_buf() }
    }
    fn index(&self) -> PathBuf { self.root.join("index.bin") }
    fn meta(&self) -> PathBuf { self.root.join("meta.json") }
}

pub fn snapshot_exists(paths: &IndexPaths) -> bool {
    paths.meta().is_file() && paths.index().is_file()
}

/// Write `bytes` next to `target` and rename over it, so readers never see a torn file.
fn write_atomic(target: &Path, bytes: &[u8]) -> Result<()> {
    let tmp = target.with_extension("tmp");
    {
        let mut f = BufWriter::new(File::create(&tmp)?);
        f.write_all(bytes)?;
        f.flush()?;
    }
    fs::rename(&tmp, target)?;
    Ok(())
}

pub fn save_snapshot(paths: &IndexPaths, index: &InvertedIndex, tokenizer: &TokenizerConfig) -> Result<()> {
    create_dir_all(&paths.root)?;
    let bytes = bincode::serialize(index)?;
    write_atomic(&paths.index(), &bytes)?;
    let meta = MetaFile {
        num_docs: index.num_docs() as u32,
        num_terms: index.num_terms() as u32,
        created_at: OffsetDateTime::now_utc().format(&Rfc3339).unwrap_or_default(),
        version: SNAPSHOT_VERSION,
        tokenizer: *tokenizer,
    };
    save_meta(paths, &meta)
}

/// Load the snapshot, refusing one whose terms were built with other tokenizer settings.
pub fn load_snapshot(paths: &IndexPaths, tokenizer: &TokenizerConfig) -> Result<InvertedIndex> {
    let meta = load_meta(paths)?;
    if meta.version != SNAPSHOT_VERSION {
        return Err(Error::Storage(format!(
            "unsupported snapshot version {} in {} (expected {})",
            meta.version,
            paths.root.display(),
            SNAPSHOT_VERSION
        )));
    }
    if meta.tokenizer != *tokenizer {
        return Err(Error::Storage(format!(
            "index in {} was built with tokenizer settings {:?}, not {:?}",
            paths.root.display(),
            meta.tokenizer,
            tokenizer
        )));
    }
    let mut f = BufReader::new(File::open(paths.index())?);
    let mut buf = Vec::new();
    f.read_to_end(&mut buf)?;
    let index: InvertedIndex = bincode::deserialize(&buf)?;
    if index.num_docs() as u32 != meta.num_docs {
        return Err(Error::Storage(format!(
            "snapshot in {} holds {} documents but meta.json records {}",
            paths.root.display(),
            index.num_docs(),
            meta.num_docs
        )));
    }
    Ok(index)
}

pub fn save_meta(paths: &IndexPaths, meta: &MetaFile) -> Result<()> {
    create_dir_all(&paths.root)?;
    let json = serde_json::to_string_pretty(meta)?;
    write_atomic(&paths.meta(), json.as_bytes())
}

pub fn load_meta(paths: &IndexPaths) -> Result<MetaFile> {
    let mut f = File::open(paths.meta())?;
    let mut buf = String::new();
    f.read_to_string(&mut buf)?;
    let meta: MetaFile = serde_json::from_str(&buf)?;
    Ok(meta)
}
