use super::extension::ExtensionLoader;
use super::{Handler, KeywordEntry, KeywordError, KeywordOutput, KeywordProvider, KeywordSignature, ProviderKeyword};
use crate::loader::SignatureSource;
use crate::model::Vars;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tracing::{debug, info};

type Resolution = Result<Arc<KeywordEntry>, KeywordError>;

/// Name → handler table with a late-bound extension fallback.
///
/// Registered keywords always win. A name missing from the table triggers
/// exactly one probe of the extension directory; the outcome (handler or
/// `UnknownKeyword`) is cached for the lifetime of the registry.
#[derive(Debug, Default)]
pub struct KeywordRegistry {
    entries: RwLock<BTreeMap<String, Arc<KeywordEntry>>>,
    extensions: Option<ExtensionLoader>,
    resolved: Mutex<HashMap<String, Resolution>>,
}

impl KeywordRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the built-in keywords.
    pub fn with_builtins() -> Self {
        let registry = Self::new();
        super::builtins::register_builtins(&registry);
        registry
    }

    pub fn with_extensions(mut self, loader: ExtensionLoader) -> Self {
        self.extensions = Some(loader);
        self
    }

    pub fn extensions(&self) -> Option<&ExtensionLoader> {
        self.extensions.as_ref()
    }

    pub fn register(&self, name: impl Into<String>, handler: Handler) {
        let name = name.into();
        let signature = KeywordSignature {
            name: name.clone(),
            ..KeywordSignature::default()
        };
        self.register_with(signature, handler);
    }

    pub fn register_with(&self, signature: KeywordSignature, handler: Handler) {
        let name = signature.name.clone();
        debug!(keyword = %name, kind = %handler.kind(), "keyword registered");
        let entry = Arc::new(KeywordEntry { signature, handler });
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.clone(), entry);
        // a late registration overrides any cached miss
        self.resolved
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&name);
    }

    /// Registers every keyword a provider declares.
    pub fn register_provider(&self, provider: Arc<dyn KeywordProvider>) {
        let keywords = provider.keywords();
        info!(
            provider = provider.provider_name(),
            keywords = keywords.len(),
            "provider registered"
        );
        for signature in keywords {
            let handler = Handler::from_async(ProviderKeyword {
                provider: provider.clone(),
                keyword: signature.name.clone(),
            });
            self.register_with(signature, handler);
        }
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<KeywordEntry>, KeywordError> {
        if let Some(entry) = self.registered(name) {
            return Ok(entry);
        }

        // held across the probe so concurrent misses for one name probe once
        let mut resolved = self.resolved.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(outcome) = resolved.get(name) {
            return outcome.clone();
        }

        let outcome = match &self.extensions {
            Some(loader) => loader.probe(name).map(Arc::new),
            None => Err(KeywordError::UnknownKeyword {
                name: name.to_string(),
            }),
        };
        match &outcome {
            Ok(entry) => info!(keyword = %name, kind = %entry.kind(), "extension keyword loaded"),
            Err(err) => debug!(keyword = %name, error = %err, "keyword resolution failed"),
        }
        resolved.insert(name.to_string(), outcome.clone());
        outcome
    }

    pub async fn invoke(&self, name: &str, args: Vars) -> Result<KeywordOutput, KeywordError> {
        let entry = self.resolve(name)?;
        entry.handler.call(args).await
    }

    /// Signature of `name`, resolving extensions if needed.
    pub fn describe(&self, name: &str) -> Option<KeywordSignature> {
        self.resolve(name).ok().map(|entry| entry.signature.clone())
    }

    /// Registered keyword names, sorted.
    pub fn names(&self) -> Vec<String> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// Signatures of all registered keywords, sorted by name.
    pub fn signatures(&self) -> Vec<KeywordSignature> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .map(|entry| entry.signature.clone())
            .collect()
    }

    fn registered(&self, name: &str) -> Option<Arc<KeywordEntry>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned()
    }
}

impl SignatureSource for KeywordRegistry {
    fn param_names(&self, keyword: &str) -> Option<Vec<String>> {
        self.describe(keyword)
            .map(|sig| sig.params)
            .filter(|params| !params.is_empty())
    }
}
