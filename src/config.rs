use crate::db;
use anyhow::Context;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

pub const GENERATED_MARKER: &str = "GERADO";

const CONTINUATION_VALUE: &str =
    "JÁ CADASTREI MEUS DADOS PESSOAIS, QUERO CADASTRAR OUTRO VEÍCULO";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RegistrantKind {
    #[serde(rename = "PF")]
    Pf,
    #[serde(rename = "PJ")]
    Pj,
}

impl RegistrantKind {
    pub const ALL: [RegistrantKind; 2] = [RegistrantKind::Pf, RegistrantKind::Pj];

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PF" => Some(Self::Pf),
            "PJ" => Some(Self::Pj),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pf => "PF",
            Self::Pj => "PJ",
        }
    }

    fn settings_key(self) -> &'static str {
        match self {
            Self::Pf => "sheet_config.pf",
            Self::Pj => "sheet_config.pj",
        }
    }
}

/// Column names and literals that drive source/continuation linkage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkageColumns {
    /// Receives the generated marker; never back-filled.
    pub generation_status: String,
    /// Holds the continuation literal on rows that extend a registration.
    pub registration: String,
    pub trigger_id: String,
    pub comparison_id: String,
    pub continuation_value: String,
    pub timestamp_columns: Vec<String>,
}

impl LinkageColumns {
    pub fn defaults(kind: RegistrantKind) -> Self {
        let (trigger_id, comparison_id) = match kind {
            RegistrantKind::Pf => ("CPF - (SOMENTE NÚMERO)", "CPF (somente número)"),
            RegistrantKind::Pj => ("CNPJ - (SOMENTE NÚMERO)", "CNPJ (somente número)"),
        };
        Self {
            generation_status: "Status".to_string(),
            registration: "CADASTRO".to_string(),
            trigger_id: trigger_id.to_string(),
            comparison_id: comparison_id.to_string(),
            continuation_value: CONTINUATION_VALUE.to_string(),
            timestamp_columns: vec!["Timestamp".to_string(), "Carimbo de data/hora".to_string()],
        }
    }

    /// Columns that are never copied from a source row.
    pub fn is_control_column(&self, name: &str) -> bool {
        name == self.generation_status
            || name == self.registration
            || name == self.trigger_id
            || name == self.comparison_id
            || self.timestamp_columns.iter().any(|t| t == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SheetConfig {
    pub kind: RegistrantKind,
    pub spreadsheet: String,
    pub tab: String,
    pub columns: LinkageColumns,
}

impl SheetConfig {
    pub fn defaults(kind: RegistrantKind) -> Self {
        let (spreadsheet, tab) = match kind {
            RegistrantKind::Pf => (
                "FORMULÁRIO PESSOA FÍSICA (respostas)",
                "Respostas ao formulário PF",
            ),
            RegistrantKind::Pj => (
                "FORMULÁRIO PESSOA JURÍDICA (respostas)",
                "Respostas ao formulário PJ",
            ),
        };
        Self {
            kind,
            spreadsheet: spreadsheet.to_string(),
            tab: tab.to_string(),
            columns: LinkageColumns::defaults(kind),
        }
    }
}

/// Overlays `patch` onto `base`, recursing into objects. `kind` is fixed by
/// the settings key and cannot be patched.
fn merge_json(base: &mut Value, patch: &serde_json::Map<String, Value>) {
    let Some(obj) = base.as_object_mut() else {
        return;
    };
    for (k, v) in patch {
        if k == "kind" {
            continue;
        }
        let Some(existing) = obj.get_mut(k) else {
            continue;
        };
        match v {
            Value::Object(inner) if existing.is_object() => merge_json(existing, inner),
            _ => *existing = v.clone(),
        }
    }
}

pub fn apply_patch(
    current: &SheetConfig,
    patch: &serde_json::Map<String, Value>,
) -> anyhow::Result<SheetConfig> {
    let mut merged = serde_json::to_value(current).context("failed to serialize sheet config")?;
    merge_json(&mut merged, patch);
    let cfg: SheetConfig =
        serde_json::from_value(merged).context("patched sheet config is malformed")?;
    validate(&cfg)?;
    Ok(cfg)
}

fn validate(cfg: &SheetConfig) -> anyhow::Result<()> {
    let c = &cfg.columns;
    for (field, value) in [
        ("generationStatus", &c.generation_status),
        ("registration", &c.registration),
        ("triggerId", &c.trigger_id),
        ("comparisonId", &c.comparison_id),
        ("continuationValue", &c.continuation_value),
    ] {
        if value.trim().is_empty() {
            anyhow::bail!("{field} must not be empty");
        }
    }
    if c.trigger_id == c.comparison_id {
        anyhow::bail!("triggerId and comparisonId must name different columns");
    }
    Ok(())
}

pub fn load(conn: &Connection, kind: RegistrantKind) -> anyhow::Result<SheetConfig> {
    let defaults = SheetConfig::defaults(kind);
    let Some(saved) = db::settings_get_json(conn, kind.settings_key())? else {
        return Ok(defaults);
    };
    let Some(saved_obj) = saved.as_object() else {
        warn!(key = kind.settings_key(), "saved sheet config is not an object; using defaults");
        return Ok(defaults);
    };
    match apply_patch(&defaults, saved_obj) {
        Ok(cfg) => Ok(cfg),
        Err(e) => {
            warn!(
                key = kind.settings_key(),
                error = %format!("{e:#}"),
                "saved sheet config ignored; using defaults"
            );
            Ok(defaults)
        }
    }
}

pub fn save(conn: &Connection, cfg: &SheetConfig) -> anyhow::Result<()> {
    let value = serde_json::to_value(cfg).context("failed to serialize sheet config")?;
    db::settings_set_json(conn, cfg.kind.settings_key(), &value)
}
