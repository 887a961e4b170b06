use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use sheetgraph_common::LiteralValue;
use sheetgraph_eval::{
    DataSource, Engine, EngineConfig, EngineError, TrimReport, ValidationReport,
};
use tracing::{info, info_span, warn};

#[cfg(feature = "calamine")]
use crate::backends::CalamineAdapter;
use crate::backends::JsonAdapter;
use crate::format::{SaveFormat, SavePlan, path_for, probe};
use crate::record::{CellMap, TextRecord};
use crate::replay::ReplaySource;
use crate::IoError;

/// The stored fingerprint no longer matches the workbook on disk. Advisory:
/// the compiled graph is still usable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleArtifact {
    pub filename: String,
    pub stored: String,
    /// `None` when the workbook could not be read.
    pub current: Option<String>,
}

/// An [`Engine`] together with where it came from.
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct CompiledWorkbook {
    engine: Engine,
    filename: Option<String>,
    excel_hash: Option<String>,
    extra_data: BTreeMap<String, serde_json::Value>,
}

/// `sha256:<hex>` of the file's bytes.
pub fn fingerprint<P: AsRef<Path>>(path: P) -> Result<String, IoError> {
    let bytes = fs::read(path)?;
    Ok(format!("sha256:{:x}", Sha256::digest(&bytes)))
}

impl CompiledWorkbook {
    /* ─────────────── construction ─────────────── */

    /// Open a workbook file as the engine's data source: `.json`, or
    /// `.xlsx`/`.xlsm` with the `calamine` feature.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        Self::open_with_config(path, EngineConfig::default())
    }

    pub fn open_with_config<P: AsRef<Path>>(path: P, config: EngineConfig) -> Result<Self, IoError> {
        let path = path.as_ref();
        let _span = info_span!("open", path = %path.display()).entered();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_ascii_lowercase);
        let source: Box<dyn DataSource> = match ext.as_deref() {
            Some("json") => Box::new(JsonAdapter::open_path(path)?),
            #[cfg(feature = "calamine")]
            Some("xlsx" | "xlsm") => Box::new(CalamineAdapter::open_path(path)?),
            _ => return Err(IoError::UnknownFormat(path.display().to_string())),
        };
        let mut engine = Engine::new(config);
        engine.attach_source(source);
        Ok(CompiledWorkbook {
            engine,
            filename: Some(path.display().to_string()),
            excel_hash: Some(fingerprint(path)?),
            extra_data: BTreeMap::new(),
        })
    }

    /// Wrap a data source that does not come from a file.
    pub fn from_source<S: DataSource + 'static>(source: S, config: EngineConfig) -> Self {
        CompiledWorkbook {
            engine: Engine::with_source(source, config),
            ..CompiledWorkbook::default()
        }
    }

    /* ─────────────── accessors ─────────────── */

    pub fn engine(&self) -> &Engine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    pub fn into_engine(self) -> Engine {
        self.engine
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub fn excel_hash(&self) -> Option<&str> {
        self.excel_hash.as_deref()
    }

    /// Caller metadata saved alongside the cell map.
    pub fn extra_data(&self) -> &BTreeMap<String, serde_json::Value> {
        &self.extra_data
    }

    pub fn extra_data_mut(&mut self) -> &mut BTreeMap<String, serde_json::Value> {
        &mut self.extra_data
    }

    /* ─────────────── engine operations ─────────────── */

    pub fn evaluate(&mut self, address: &str) -> Result<LiteralValue, EngineError> {
        self.engine.evaluate(address)
    }

    pub fn set_value(
        &mut self,
        address: &str,
        value: impl Into<LiteralValue>,
    ) -> Result<(), EngineError> {
        self.engine.set_value(address, value)
    }

    pub fn recalculate(&mut self) -> Result<(), EngineError> {
        self.engine.recalculate()
    }

    pub fn trim<I, O>(&mut self, inputs: &[I], outputs: &[O]) -> Result<TrimReport, EngineError>
    where
        I: AsRef<str>,
        O: AsRef<str>,
    {
        self.engine.trim(inputs, outputs)
    }

    pub fn validate<S: AsRef<str>>(&mut self, outputs: Option<&[S]>) -> ValidationReport {
        self.engine.validate(outputs)
    }

    /* ─────────────── fingerprint ─────────────── */

    /// Compare the stored fingerprint with the workbook file as it is now.
    /// `None` when there is nothing to compare or the two agree.
    pub fn staleness(&self) -> Option<StaleArtifact> {
        let filename = self.filename.as_ref()?;
        let stored = self.excel_hash.as_ref()?;
        let current = fingerprint(filename).ok();
        (current.as_ref() != Some(stored)).then(|| StaleArtifact {
            filename: filename.clone(),
            stored: stored.clone(),
            current,
        })
    }

    pub fn hash_matches(&self) -> bool {
        self.staleness().is_none()
    }

    /* ─────────────── text form ─────────────── */

    pub fn to_record(&self) -> TextRecord {
        TextRecord {
            extra_data: self.extra_data.clone(),
            filename: self.filename.clone(),
            excel_hash: self.excel_hash.clone(),
            cell_map: CellMap::from_graph(self.engine.graph()),
        }
    }

    pub fn to_text(&self, format: SaveFormat) -> Result<String, IoError> {
        let record = self.to_record();
        match format {
            SaveFormat::Yaml => Ok(serde_yaml::to_string(&record)?),
            SaveFormat::Json => Ok(serde_json::to_string_pretty(&record)?),
            SaveFormat::Binary => Err(IoError::UnknownFormat(format!("{format} is not a text format"))),
        }
    }

    pub fn from_text(text: &str, format: SaveFormat, config: EngineConfig) -> Result<Self, IoError> {
        let record: TextRecord = match format {
            SaveFormat::Yaml => serde_yaml::from_str(text)?,
            SaveFormat::Json => serde_json::from_str(text)?,
            SaveFormat::Binary => {
                return Err(IoError::UnknownFormat(format!("{format} is not a text format")));
            }
        };
        Self::from_record(record, config)
    }

    /// Rebuild the graph by replaying the stored cells through the builder:
    /// cells first, then the ranges they were read through. Unqualified
    /// addresses resolve against the sheet of the first stored cell unless
    /// `config` names one.
    pub fn from_record(record: TextRecord, mut config: EngineConfig) -> Result<Self, IoError> {
        let _span = info_span!("replay", cells = record.cell_map.len()).entered();
        let source = ReplaySource::new(&record.cell_map)?;
        let seeds = source.seeds().to_vec();
        if config.default_sheet.is_none() {
            config.default_sheet = source.active_sheet_name().ok();
        }
        let mut engine = Engine::with_source(source, config);
        engine.build_many(&seeds)?;
        engine.detach_source();
        info!(nodes = engine.graph().len(), edges = engine.graph().edge_count(), "graph replayed");
        Ok(CompiledWorkbook {
            engine,
            filename: record.filename,
            excel_hash: record.excel_hash,
            extra_data: record.extra_data,
        })
    }

    /* ─────────────── binary form ─────────────── */

    /// CBOR encoding of the whole workbook. The data source and the engine's
    /// transient state are not included.
    pub fn snapshot(&self) -> Result<Vec<u8>, IoError> {
        let mut buf = Vec::new();
        ciborium::into_writer(self, &mut buf)?;
        Ok(buf)
    }

    pub fn from_snapshot(bytes: &[u8]) -> Result<Self, IoError> {
        Ok(ciborium::from_reader(bytes)?)
    }

    /* ─────────────── files ─────────────── */

    /// Write the workbook in the requested formats.
    ///
    /// The text form is always produced. A binary snapshot is regenerated
    /// from that text, so it never carries state the text would not restore,
    /// and only when the text changed or the snapshot is missing. The text
    /// file is removed again if it was not asked for.
    pub fn save<P: AsRef<Path>>(&self, path: P, formats: &[SaveFormat]) -> Result<(), IoError> {
        let path = path.as_ref();
        let _span = info_span!("save", path = %path.display()).entered();
        let plan = SavePlan::new(path, formats)?;
        let (text_format, text_path) = plan
            .text
            .clone()
            .unwrap_or_else(|| (SaveFormat::Yaml, path_for(&plan.stem, SaveFormat::Yaml)));

        let text = self.to_text(text_format)?;
        let changed = fs::read_to_string(&text_path).map_or(true, |old| old != text);
        if changed {
            fs::write(&text_path, &text)?;
            info!(path = %text_path.display(), nodes = self.engine.graph().len(), "text written");
        }

        if let Some(binary_path) = &plan.binary {
            if changed || !binary_path.is_file() {
                let fresh = Self::from_text(&text, text_format, self.engine.config().clone())?;
                fs::write(binary_path, fresh.snapshot()?)?;
                info!(path = %binary_path.display(), "snapshot written");
            }
        }

        if plan.text.is_none() {
            fs::remove_file(&text_path)?;
        }
        Ok(())
    }

    /// Load a saved workbook. `path` either carries a known extension or is
    /// a stem tried with each extension in turn.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, IoError> {
        let path = path.as_ref();
        let _span = info_span!("load", path = %path.display()).entered();
        let (file, format) = match SaveFormat::from_path(path) {
            Some(format) if path.is_file() => (path.to_path_buf(), format),
            _ => probe(path).ok_or_else(|| IoError::NotFound(path.to_path_buf()))?,
        };

        let workbook = match format {
            SaveFormat::Binary => Self::from_snapshot(&fs::read(&file)?)?,
            text => Self::from_text(&fs::read_to_string(&file)?, text, EngineConfig::default())?,
        };
        if let Some(stale) = workbook.staleness() {
            warn!(
                filename = %stale.filename,
                stored = %stale.stored,
                current = stale.current.as_deref().unwrap_or("<unreadable>"),
                "compiled workbook is older than its source"
            );
        }
        info!(file = %file.display(), nodes = workbook.engine.graph().len(), "loaded");
        Ok(workbook)
    }
}
