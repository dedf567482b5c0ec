//! Object and method registry.
//!
//! Thread-safe store of object definitions, abbreviation expansion, and
//! user aliases. Names are canonicalized to uppercase on insertion and
//! compared case-insensitively. Read operations return defensive copies;
//! callers never observe internal maps.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::EngineError;

/// Internal service label for built-in objects.
pub const INTERNAL_SERVICE: &str = "tcol-internal";

/// Jaro-Winkler score a candidate must reach to be suggested.
const SUGGESTION_THRESHOLD: f64 = 0.85;

/// Seed abbreviation table: common object and method prefixes.
const BUILTIN_ABBREVIATIONS: &[(&str, &str)] = &[
    ("CUST", "CUSTOMER"),
    ("ACCT", "ACCOUNT"),
    ("ORD", "ORDER"),
    ("PROD", "PRODUCT"),
    ("INV", "INVOICE"),
    ("USR", "USER"),
    ("RPT", "REPORT"),
    ("EXP", "EXPORT"),
    ("SESS", "SESSION"),
    ("CR", "CREATE"),
    ("UPD", "UPDATE"),
    ("DEL", "DELETE"),
    ("RM", "REMOVE"),
    ("LS", "LIST"),
    ("EXEC", "EXECUTE"),
    ("SRCH", "SEARCH"),
];

/// A callable method on a registered object.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MethodDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
}

impl MethodDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }
}

/// A field addressable through field operations.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_true")]
    pub writable: bool,
}

fn default_true() -> bool {
    true
}

impl FieldDefinition {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            writable: true,
        }
    }
}

/// A registered object with its backing service.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectDefinition {
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Backing service name; empty means no service is attached.
    #[serde(default)]
    pub service: String,
    #[serde(default)]
    pub methods: HashMap<String, MethodDefinition>,
    #[serde(default)]
    pub fields: HashMap<String, FieldDefinition>,
}

impl ObjectDefinition {
    pub fn new(name: impl Into<String>, service: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: String::new(),
            service: service.into(),
            methods: HashMap::new(),
            fields: HashMap::new(),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_method(mut self, method: MethodDefinition) -> Self {
        self.methods.insert(method.name.clone(), method);
        self
    }

    pub fn with_field(mut self, field: FieldDefinition) -> Self {
        self.fields.insert(field.name.clone(), field);
        self
    }

    fn canonicalize(&mut self) {
        self.name = self.name.to_uppercase();
        let methods = std::mem::take(&mut self.methods);
        self.methods = methods
            .into_values()
            .map(|mut m| {
                m.name = m.name.to_uppercase();
                (m.name.clone(), m)
            })
            .collect();
        let fields = std::mem::take(&mut self.fields);
        self.fields = fields
            .into_values()
            .map(|mut f| {
                f.name = f.name.to_uppercase();
                (f.name.clone(), f)
            })
            .collect();
    }
}

#[derive(Default)]
struct Inner {
    objects: HashMap<String, ObjectDefinition>,
    abbreviations: HashMap<String, String>,
    aliases: HashMap<String, String>,
}

/// Thread-safe object/method/alias registry.
pub struct Registry {
    inner: RwLock<Inner>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    /// A registry with the built-in ALIAS and HELP objects registered.
    pub fn new() -> Self {
        let registry = Self {
            inner: RwLock::new(Inner::default()),
        };
        registry
            .register_object(
                ObjectDefinition::new("ALIAS", INTERNAL_SERVICE)
                    .with_description("User-defined command shortcuts")
                    .with_method(MethodDefinition::new("CREATE").with_description(
                        "Define an alias: ALIAS.CREATE name=<n> command=<cmd>",
                    ))
                    .with_method(MethodDefinition::new("DELETE").with_description(
                        "Remove an alias: ALIAS.DELETE name=<n>",
                    ))
                    .with_method(
                        MethodDefinition::new("LIST").with_description("List all aliases"),
                    ),
            )
            .expect("builtin ALIAS object registers");
        registry
            .register_object(
                ObjectDefinition::new("HELP", INTERNAL_SERVICE)
                    .with_description("Registry introspection")
                    .with_method(MethodDefinition::new("OBJECT").with_description(
                        "Describe an object: HELP.OBJECT name=<object>",
                    ))
                    .with_method(MethodDefinition::new("METHOD").with_description(
                        "Describe a method: HELP.METHOD object=<o> method=<m>",
                    ))
                    .with_method(
                        MethodDefinition::new("LIST").with_description("List all objects"),
                    ),
            )
            .expect("builtin HELP object registers");
        registry
    }

    // ── Objects ────────────────────────────────────────────────────────

    /// Register an object, canonicalizing names to uppercase and
    /// rebuilding the abbreviation table. Duplicate objects are rejected.
    pub fn register_object(&self, mut definition: ObjectDefinition) -> Result<(), EngineError> {
        definition.canonicalize();
        let mut inner = self.inner.write().unwrap();
        if inner.objects.contains_key(&definition.name) {
            return Err(EngineError::Validation(format!(
                "object '{}' is already registered",
                definition.name
            )));
        }
        debug!(object = %definition.name, service = %definition.service, "registering object");
        inner.objects.insert(definition.name.clone(), definition);
        rebuild_abbreviations(&mut inner);
        Ok(())
    }

    pub fn has_object(&self, name: &str) -> bool {
        self.inner
            .read()
            .unwrap()
            .objects
            .contains_key(&name.to_uppercase())
    }

    pub fn get_object(&self, name: &str) -> Option<ObjectDefinition> {
        self.inner
            .read()
            .unwrap()
            .objects
            .get(&name.to_uppercase())
            .cloned()
    }

    /// Defensive copy of the whole object map.
    pub fn get_objects(&self) -> HashMap<String, ObjectDefinition> {
        self.inner.read().unwrap().objects.clone()
    }

    pub fn get_object_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.inner.read().unwrap().objects.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn has_method(&self, object: &str, method: &str) -> bool {
        self.get_method(object, method).is_some()
    }

    pub fn get_method(&self, object: &str, method: &str) -> Option<MethodDefinition> {
        self.inner
            .read()
            .unwrap()
            .objects
            .get(&object.to_uppercase())
            .and_then(|o| o.methods.get(&method.to_uppercase()))
            .cloned()
    }

    pub fn get_method_names(&self, object: &str) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .read()
            .unwrap()
            .objects
            .get(&object.to_uppercase())
            .map(|o| o.methods.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// The backing service for an object; failing when none is attached
    /// is a fatal routing error for the engine.
    pub fn get_service_for_object(&self, name: &str) -> Result<String, EngineError> {
        let inner = self.inner.read().unwrap();
        let object = inner
            .objects
            .get(&name.to_uppercase())
            .ok_or_else(|| self.unknown_object_locked(&inner, name))?;
        if object.service.is_empty() {
            return Err(EngineError::NoService {
                object: object.name.clone(),
            });
        }
        Ok(object.service.clone())
    }

    // ── Abbreviations ──────────────────────────────────────────────────

    /// Expand an abbreviation to its full form, or return the input
    /// unchanged when nothing is mapped. `OBJ.METHOD` inputs expand each
    /// part independently when the whole form is unmapped.
    pub fn expand_abbreviation(&self, input: &str) -> String {
        let inner = self.inner.read().unwrap();
        let upper = input.to_uppercase();
        if let Some(full) = inner.abbreviations.get(&upper) {
            return full.clone();
        }
        if let Some((object_part, method_part)) = upper.split_once('.') {
            let object = inner
                .abbreviations
                .get(object_part)
                .cloned()
                .unwrap_or_else(|| object_part.to_string());
            let method = inner
                .abbreviations
                .get(method_part)
                .cloned()
                .unwrap_or_else(|| method_part.to_string());
            return format!("{object}.{method}");
        }
        input.to_string()
    }

    /// Expand abbreviations, then check the object and method exist.
    /// Returns the canonical (uppercase, expanded) names.
    pub fn validate_command(
        &self,
        object: &str,
        method: Option<&str>,
    ) -> Result<(String, Option<String>), EngineError> {
        let object = self.expand_abbreviation(object).to_uppercase();
        let inner = self.inner.read().unwrap();
        let definition = inner
            .objects
            .get(&object)
            .ok_or_else(|| self.unknown_object_locked(&inner, &object))?;

        let method = match method {
            None => None,
            Some(method) => {
                let method = self.expand_abbreviation_locked(&inner, method);
                if !definition.methods.contains_key(&method) {
                    let suggestion = best_match(&method, definition.methods.keys());
                    return Err(EngineError::UnknownMethod {
                        object: object.clone(),
                        method,
                        suggestion,
                    });
                }
                Some(method)
            }
        };
        Ok((object, method))
    }

    // ── Aliases ────────────────────────────────────────────────────────

    /// Register a user alias; the name is normalized to uppercase.
    pub fn register_alias(
        &self,
        name: &str,
        command: &str,
    ) -> Result<(), EngineError> {
        if name.trim().is_empty() {
            return Err(EngineError::Validation("alias name is empty".to_string()));
        }
        if command.trim().is_empty() {
            return Err(EngineError::Validation(format!(
                "alias '{name}' has an empty command"
            )));
        }
        let mut inner = self.inner.write().unwrap();
        inner
            .aliases
            .insert(name.to_uppercase(), command.to_string());
        Ok(())
    }

    /// Resolve an alias to its original command text, case-insensitively.
    pub fn resolve_alias(&self, name: &str) -> Option<String> {
        self.inner
            .read()
            .unwrap()
            .aliases
            .get(&name.to_uppercase())
            .cloned()
    }

    pub fn remove_alias(&self, name: &str) -> bool {
        self.inner
            .write()
            .unwrap()
            .aliases
            .remove(&name.to_uppercase())
            .is_some()
    }

    pub fn get_aliases(&self) -> Vec<(String, String)> {
        let mut aliases: Vec<(String, String)> = self
            .inner
            .read()
            .unwrap()
            .aliases
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        aliases.sort();
        aliases
    }

    // ── Internals ──────────────────────────────────────────────────────

    fn expand_abbreviation_locked(&self, inner: &Inner, input: &str) -> String {
        let upper = input.to_uppercase();
        inner.abbreviations.get(&upper).cloned().unwrap_or(upper)
    }

    fn unknown_object_locked(&self, inner: &Inner, name: &str) -> EngineError {
        EngineError::UnknownObject {
            name: name.to_uppercase(),
            suggestion: best_match(&name.to_uppercase(), inner.objects.keys()),
        }
    }
}

/// Best fuzzy candidate above the suggestion threshold.
fn best_match<'a>(input: &str, candidates: impl Iterator<Item = &'a String>) -> Option<String> {
    candidates
        .map(|c| (strsim::jaro_winkler(input, c), c))
        .filter(|(score, _)| *score >= SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, c)| c.clone())
}

/// Consonant-biased prefix: the first character, then consonants, padded
/// with the remaining characters when too short.
fn consonant_prefix(name: &str, len: usize) -> String {
    let chars: Vec<char> = name.chars().collect();
    let mut prefix = String::new();
    let Some(&first) = chars.first() else {
        return prefix;
    };
    prefix.push(first);
    for &c in &chars[1..] {
        if prefix.len() >= len {
            break;
        }
        if !matches!(c, 'A' | 'E' | 'I' | 'O' | 'U') {
            prefix.push(c);
        }
    }
    for &c in &chars[1..] {
        if prefix.len() >= len {
            break;
        }
        if !prefix.contains(c) {
            prefix.push(c);
        }
    }
    prefix
}

/// Rebuild the abbreviation table: the built-in prefix set plus
/// synthesized `OBJ.METHOD` entries, never replacing existing mappings.
fn rebuild_abbreviations(inner: &mut Inner) {
    let mut table: HashMap<String, String> = HashMap::new();
    for (short, full) in BUILTIN_ABBREVIATIONS {
        table.insert((*short).to_string(), (*full).to_string());
    }
    for object in inner.objects.values() {
        let object_prefix = consonant_prefix(&object.name, 3);
        for method in object.methods.keys() {
            let method_prefix = consonant_prefix(method, 2);
            let key = format!("{object_prefix}.{method_prefix}");
            let full = format!("{}.{}", object.name, method);
            table.entry(key).or_insert(full);
        }
    }
    inner.abbreviations = table;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn customer_object() -> ObjectDefinition {
        ObjectDefinition::new("customer", "customer-service")
            .with_description("Customer records")
            .with_method(MethodDefinition::new("list"))
            .with_method(MethodDefinition::new("create"))
            .with_field(FieldDefinition::new("status"))
    }

    #[test]
    fn names_are_canonicalized_to_uppercase() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();

        assert!(registry.has_object("CUSTOMER"));
        assert!(registry.has_object("customer"));
        assert!(registry.has_method("Customer", "List"));
        let object = registry.get_object("customer").unwrap();
        assert_eq!(object.name, "CUSTOMER");
        assert!(object.methods.contains_key("LIST"));
        assert!(object.fields.contains_key("STATUS"));
    }

    #[test]
    fn duplicate_objects_are_rejected() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();
        let err = registry.register_object(customer_object()).unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[test]
    fn builtins_are_auto_registered() {
        let registry = Registry::new();
        assert!(registry.has_method("ALIAS", "CREATE"));
        assert!(registry.has_method("ALIAS", "DELETE"));
        assert!(registry.has_method("ALIAS", "LIST"));
        assert!(registry.has_method("HELP", "OBJECT"));
        assert!(registry.has_method("HELP", "METHOD"));
        assert!(registry.has_method("HELP", "LIST"));
        assert_eq!(
            registry.get_service_for_object("ALIAS").unwrap(),
            INTERNAL_SERVICE
        );
    }

    #[test]
    fn expand_abbreviation_per_part() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();

        assert_eq!(registry.expand_abbreviation("CUST.LS"), "CUSTOMER.LIST");
        assert_eq!(registry.expand_abbreviation("cust.cr"), "CUSTOMER.CREATE");
        // Unmapped input comes back unchanged.
        assert_eq!(registry.expand_abbreviation("WIDGET.FLIP"), "WIDGET.FLIP");
        assert_eq!(registry.expand_abbreviation("nothing"), "nothing");
    }

    #[test]
    fn synthesized_abbreviations_from_registration() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();

        // CUSTOMER → CST, LIST → LS.
        assert_eq!(registry.expand_abbreviation("CST.LS"), "CUSTOMER.LIST");
    }

    #[test]
    fn synthesis_never_replaces_existing_entries() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();
        // A colliding object: CASTLE also yields prefix CST.
        registry
            .register_object(
                ObjectDefinition::new("CASTLE", "castle-service")
                    .with_method(MethodDefinition::new("LIST")),
            )
            .unwrap();

        // Iteration order of the object map is arbitrary, but the entry
        // must expand to exactly one of the two, not be clobbered twice.
        let expanded = registry.expand_abbreviation("CST.LS");
        assert!(expanded == "CUSTOMER.LIST" || expanded == "CASTLE.LIST");
        // The built-in prefix table is untouched by synthesis.
        assert_eq!(registry.expand_abbreviation("CUST.LS"), "CUSTOMER.LIST");
    }

    #[test]
    fn validate_command_expands_first() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();

        let (object, method) = registry.validate_command("CUST", Some("LS")).unwrap();
        assert_eq!(object, "CUSTOMER");
        assert_eq!(method.as_deref(), Some("LIST"));

        let err = registry.validate_command("GHOST", None).unwrap_err();
        assert_eq!(err.code(), "UNKNOWN_OBJECT");
    }

    #[test]
    fn unknown_names_get_suggestions() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();

        let err = registry.validate_command("CUSTOMR", None).unwrap_err();
        assert_eq!(err.suggestion(), Some("CUSTOMER"));

        let err = registry
            .validate_command("CUSTOMER", Some("LISTT"))
            .unwrap_err();
        assert_eq!(err.suggestion(), Some("LIST"));
    }

    #[test]
    fn aliases_are_case_insensitive() {
        let registry = Registry::new();
        registry
            .register_alias("uc", "CUSTOMER.LIST status=unpaid")
            .unwrap();

        assert_eq!(
            registry.resolve_alias("UC").as_deref(),
            Some("CUSTOMER.LIST status=unpaid")
        );
        assert_eq!(
            registry.resolve_alias("uc").as_deref(),
            Some("CUSTOMER.LIST status=unpaid")
        );
        assert!(registry.remove_alias("Uc"));
        assert!(registry.resolve_alias("uc").is_none());
    }

    #[test]
    fn empty_alias_is_rejected() {
        let registry = Registry::new();
        assert!(registry.register_alias("", "CUSTOMER.LIST").is_err());
        assert!(registry.register_alias("x", "  ").is_err());
    }

    #[test]
    fn no_service_is_a_routing_error() {
        let registry = Registry::new();
        registry
            .register_object(ObjectDefinition::new("ORPHAN", ""))
            .unwrap();
        let err = registry.get_service_for_object("ORPHAN").unwrap_err();
        assert_eq!(err.code(), "NO_SERVICE_FOR_OBJECT");
    }

    #[test]
    fn reads_return_defensive_copies() {
        let registry = Registry::new();
        registry.register_object(customer_object()).unwrap();

        let mut copy = registry.get_objects();
        copy.remove("CUSTOMER");
        assert!(registry.has_object("CUSTOMER"));

        let mut object = registry.get_object("CUSTOMER").unwrap();
        object.methods.clear();
        assert!(registry.has_method("CUSTOMER", "LIST"));
    }

    #[test]
    fn consonant_prefixes() {
        assert_eq!(consonant_prefix("CUSTOMER", 3), "CST");
        assert_eq!(consonant_prefix("LIST", 2), "LS");
        assert_eq!(consonant_prefix("CREATE", 2), "CR");
        assert_eq!(consonant_prefix("AUDIO", 3), "ADU");
    }
}
