//! Rule definitions loader.
//!
//! Definitions live in an object store under
//! `<prefix>/<MODULE>/<formver>/<PACKET>/rules/` with a parallel `codes/`
//! tree holding error codes per rule. Each file holds the rules of one form
//! (the file name up to the first `_`); all files of a directory are merged
//! into one schema keyed by field name.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use futures::TryStreamExt;
use object_store::ObjectStore;
use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::path::Path;
use qc_config::{DefinitionsBackend, DefinitionsConfig};
use qc_core::keys;
use qc_core::{FieldMap, FieldValue};

use crate::error::DefinitionError;

/// Per-field rule definitions.
pub type RuleSchema = BTreeMap<String, serde_json::Value>;
/// Per-field error-code definitions, parallel to [`RuleSchema`].
pub type CodesMap = BTreeMap<String, serde_json::Value>;

/// `{module: {formver: {packet: [forms]}}}`
type OptionalFormsTable = BTreeMap<String, BTreeMap<String, BTreeMap<String, Vec<String>>>>;

const OPTIONAL_SUFFIX: &str = "_optional.json";
const C2T_MODE: f64 = 1.0;
const DEFAULT_C2C2T_MODE: f64 = 2.0;

/// Rules and codes loaded for one record.
#[derive(Debug, Clone, PartialEq)]
pub struct Definitions {
    pub rules: RuleSchema,
    pub codes: Option<CodesMap>,
}

pub struct DefinitionsLoader {
    store: Arc<dyn ObjectStore>,
    prefix: String,
    strict: bool,
}

impl DefinitionsLoader {
    /// `strict` makes missing `mode<form>` variables an error instead of
    /// "form not submitted".
    #[must_use]
    pub fn new(store: Arc<dyn ObjectStore>, prefix: impl Into<String>, strict: bool) -> Self {
        Self {
            store,
            prefix: prefix.into().trim_matches('/').to_string(),
            strict,
        }
    }

    /// Build the backing store from configuration.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::Config` for an incomplete S3 section and
    /// `DefinitionError::ObjectStore` if the store cannot be opened.
    pub fn from_config(config: &DefinitionsConfig, strict: bool) -> Result<Self, DefinitionError> {
        config
            .validate()
            .map_err(|e| DefinitionError::Config(e.to_string()))?;
        let store: Arc<dyn ObjectStore> = match config.backend {
            DefinitionsBackend::Local => {
                Arc::new(LocalFileSystem::new_with_prefix(&config.root_path)?)
            }
            DefinitionsBackend::Memory => Arc::new(InMemory::new()),
            DefinitionsBackend::S3 => {
                let mut builder = AmazonS3Builder::from_env().with_bucket_name(&config.bucket);
                if !config.region.is_empty() {
                    builder = builder.with_region(&config.region);
                }
                if !config.endpoint.is_empty() {
                    builder = builder
                        .with_endpoint(&config.endpoint)
                        .with_allow_http(config.endpoint.starts_with("http://"));
                }
                Arc::new(builder.build()?)
            }
        };
        tracing::debug!(backend = ?config.backend, prefix = %config.prefix, "definitions store ready");
        Ok(Self::new(store, config.prefix.clone(), strict))
    }

    /// Load the rules and codes for `module` at the record's form version and
    /// packet, honouring optional-form status and skipped forms.
    ///
    /// A codes tree that fails to load is dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::NoDefinitions` or `Parse` when the rules
    /// cannot be loaded and `Mismatch` when rules and codes disagree on the
    /// field set.
    pub async fn load(
        &self,
        module: &str,
        version: &FieldValue,
        packet: Option<&str>,
        optional: Option<&BTreeMap<String, bool>>,
        skip: &[String],
    ) -> Result<Definitions, DefinitionError> {
        let mut base = format!("{}/{module}/{}", self.prefix, formver_dir(version)?);
        if let Some(packet) = packet.filter(|p| !p.trim().is_empty()) {
            base = format!("{base}/{}", packet.to_uppercase());
        }

        let rules = self
            .load_directory(&format!("{base}/rules"), optional, skip)
            .await?;
        let codes = match self
            .load_directory(&format!("{base}/codes"), optional, skip)
            .await
        {
            Ok(codes) => Some(codes),
            Err(e) => {
                tracing::warn!(error = %e, "codes definitions unavailable");
                None
            }
        };

        if let Some(codes) = &codes {
            let rule_keys: BTreeSet<&String> = rules.keys().collect();
            let code_keys: BTreeSet<&String> = codes.keys().collect();
            let fields: Vec<String> = rule_keys
                .symmetric_difference(&code_keys)
                .map(|k| (*k).clone())
                .collect();
            if !fields.is_empty() {
                return Err(DefinitionError::Mismatch { fields });
            }
        }
        Ok(Definitions { rules, codes })
    }

    /// [`DefinitionsLoader::load`] with form version, packet, optional-form
    /// status and skipped forms all taken from the record.
    ///
    /// # Errors
    ///
    /// See [`DefinitionsLoader::load`] and
    /// [`DefinitionsLoader::optional_forms_status`].
    pub async fn load_for_record(
        &self,
        module: &str,
        record: &FieldMap,
    ) -> Result<Definitions, DefinitionError> {
        let optional = self.optional_forms_status(record, module).await?;
        let skip = skip_forms_for(module, record);
        let version = record.get(keys::FORMVER).cloned().unwrap_or_default();
        let packet = record
            .get(keys::PACKET)
            .filter(|v| !v.is_blank())
            .map(FieldValue::render);
        self.load(module, &version, packet.as_deref(), optional.as_ref(), &skip)
            .await
    }

    async fn load_directory(
        &self,
        directory: &str,
        optional: Option<&BTreeMap<String, bool>>,
        skip: &[String],
    ) -> Result<RuleSchema, DefinitionError> {
        let prefix = Path::from(directory);
        let mut objects: Vec<_> = self.store.list(Some(&prefix)).try_collect().await?;
        if objects.is_empty() {
            return Err(DefinitionError::NoDefinitions {
                prefix: directory.to_string(),
            });
        }
        objects.sort_by(|a, b| a.location.cmp(&b.location));

        let mut schema = RuleSchema::new();
        let mut failed = false;
        for meta in objects {
            let Some(file_name) = meta.location.filename() else {
                continue;
            };
            let form = file_name.split('_').next().unwrap_or(file_name);

            if skip.iter().any(|s| s == form) {
                tracing::info!(file = %meta.location, "skipping definition file");
                continue;
            }
            if let Some(submitted) = optional.and_then(|o| o.get(form)) {
                let optional_def = file_name.ends_with(OPTIONAL_SUFFIX);
                if *submitted == optional_def {
                    continue;
                }
            }

            let bytes = self.store.get(&meta.location).await?.bytes().await?;
            match parse_definition(file_name, &bytes) {
                Ok(rules) if rules.is_empty() => {
                    tracing::error!(file = %meta.location, "empty definition file");
                    failed = true;
                }
                Ok(rules) => {
                    tracing::debug!(file = %meta.location, fields = rules.len(), "parsed definition file");
                    schema.extend(rules);
                }
                Err(reason) => {
                    tracing::error!(file = %meta.location, %reason, "failed to parse definition file");
                    failed = true;
                }
            }
        }

        if failed {
            return Err(DefinitionError::Parse {
                prefix: directory.to_string(),
            });
        }
        Ok(schema)
    }

    /// Submission status of each optional form of the record's
    /// module/version/packet, from the `mode<form>` variables.
    ///
    /// `None` when the table lists nothing for the record.
    ///
    /// # Errors
    ///
    /// Returns `DefinitionError::OptionalForms` when the table cannot be read
    /// and `MissingModeFields` in strict mode when mode variables are absent.
    pub async fn optional_forms_status(
        &self,
        record: &FieldMap,
        module: &str,
    ) -> Result<Option<BTreeMap<String, bool>>, DefinitionError> {
        let path = format!("{}/{}", self.prefix, keys::OPTIONAL_FORMS_FILE);
        let optional_error = |reason: String| DefinitionError::OptionalForms {
            path: path.clone(),
            reason,
        };

        let bytes = match self.store.get(&Path::from(path.as_str())).await {
            Ok(result) => result.bytes().await?,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(optional_error("not found".to_string()));
            }
            Err(e) => return Err(optional_error(e.to_string())),
        };
        let table: OptionalFormsTable =
            serde_json::from_slice(&bytes).map_err(|e| optional_error(e.to_string()))?;
        if table.is_empty() {
            tracing::warn!("optional forms information not defined");
            return Ok(None);
        }

        let version = record.get(keys::FORMVER).cloned().unwrap_or_default();
        let formver = formver_dir(&version)?;
        let packet = record
            .get(keys::PACKET)
            .filter(|v| !v.is_blank())
            .map_or_else(|| keys::FOLLOWUP_PACKET_KEY.to_string(), FieldValue::render);

        let Some(forms) = table
            .get(module)
            .and_then(|v| v.get(&formver))
            .and_then(|p| p.get(&packet))
        else {
            tracing::warn!(module, %formver, %packet, "optional forms info not available");
            return Ok(None);
        };

        let mut missing = Vec::new();
        let mut status = BTreeMap::new();
        for form in forms {
            let mode_var = format!("{}{form}", keys::MODE);
            match record.get(&mode_var).filter(|v| !v.is_blank()) {
                Some(mode) => {
                    let submitted = !mode.loose_eq(&FieldValue::Integer(keys::NOT_FILLED));
                    status.insert(form.clone(), submitted);
                }
                None if self.strict => missing.push(mode_var),
                None => {
                    status.insert(form.clone(), false);
                }
            }
        }
        if !missing.is_empty() {
            return Err(DefinitionError::MissingModeFields(missing));
        }
        Ok(Some(status))
    }
}

/// Forms whose definitions must not be loaded for this record. A UDS visit
/// carries either C2 or C2T, chosen by `rmmodec2c2t`.
#[must_use]
pub fn skip_forms_for(module: &str, record: &FieldMap) -> Vec<String> {
    if !module.eq_ignore_ascii_case(keys::UDS_MODULE) {
        return Vec::new();
    }
    let mode = match record.get(keys::RMMODE_C2C2T).filter(|v| !v.is_blank()) {
        None => Some(DEFAULT_C2C2T_MODE),
        Some(value) => value.as_number(),
    };
    match mode {
        Some(mode) if (mode - C2T_MODE).abs() < f64::EPSILON => vec![keys::C2_FORM.to_string()],
        Some(_) => vec![keys::C2T_FORM.to_string()],
        None => Vec::new(),
    }
}

/// Directory name of a form version: always at least one decimal place.
fn formver_dir(version: &FieldValue) -> Result<String, DefinitionError> {
    let number = if version.is_blank() {
        0.0
    } else {
        version
            .as_number()
            .ok_or_else(|| DefinitionError::FormVersion(version.render()))?
    };
    if number.fract() == 0.0 {
        Ok(format!("{number:.1}"))
    } else {
        Ok(number.to_string())
    }
}

fn parse_definition(file_name: &str, bytes: &[u8]) -> Result<RuleSchema, String> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(RuleSchema::new());
    }
    let lower = file_name.to_lowercase();
    if lower.ends_with(".json") {
        serde_json::from_slice(bytes).map_err(|e| e.to_string())
    } else if lower.ends_with(".yaml") || lower.ends_with(".yml") {
        serde_yaml::from_slice(bytes).map_err(|e| e.to_string())
    } else {
        Err("unhandled definition file type".to_string())
    }
}
