//! Language resolution
//!
//! Decides which language tag governs a request: an explicit `Language`
//! member wins, then the extension of `FileName` as claimed by the active
//! project systems, then whatever the endpoint's predicate says about the
//! empty path.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::models::config::ProjectSystemConfig;
use crate::models::endpoint::EndpointDescriptor;
use crate::models::request::RoutingHints;

/// An owner of a set of file extensions and a language tag.
pub trait ProjectSystem: Send + Sync {
    fn name(&self) -> &str;
    fn language(&self) -> &str;
    /// Recognized extensions, with leading dot.
    fn extensions(&self) -> &[String];
    fn is_initialized(&self) -> bool;

    fn claims(&self, path: &str) -> bool {
        let path = path.to_ascii_lowercase();
        self.extensions().iter().any(|ext| {
            let ext = ext.trim().to_ascii_lowercase();
            if ext.is_empty() {
                return false;
            }
            if ext.starts_with('.') {
                path.ends_with(&ext)
            } else {
                path.ends_with(&format!(".{}", ext))
            }
        })
    }
}

/// A project system declared in configuration.
pub struct StaticProjectSystem {
    name: String,
    language: String,
    extensions: Vec<String>,
    initialized: AtomicBool,
}

impl StaticProjectSystem {
    pub fn new<I, S>(name: impl Into<String>, language: impl Into<String>, extensions: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            language: language.into(),
            extensions: extensions.into_iter().map(Into::into).collect(),
            initialized: AtomicBool::new(true),
        }
    }

    pub fn set_initialized(&self, initialized: bool) {
        self.initialized.store(initialized, Ordering::Release);
    }
}

impl From<&ProjectSystemConfig> for StaticProjectSystem {
    fn from(config: &ProjectSystemConfig) -> Self {
        Self::new(&config.name, &config.language, config.extensions.iter().cloned())
    }
}

impl ProjectSystem for StaticProjectSystem {
    fn name(&self) -> &str {
        &self.name
    }

    fn language(&self) -> &str {
        &self.language
    }

    fn extensions(&self) -> &[String] {
        &self.extensions
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::Acquire)
    }
}

/// Maps a path to a language tag.
pub trait PredicateHandler: Send + Sync {
    /// `path` may be empty for requests that name no file.
    fn language_for_path(&self, path: &str) -> Option<String>;
}

/// Asks initialized project systems in registration order; the first one
/// claiming the extension wins.
#[derive(Clone, Default)]
pub struct ProjectSystemPredicate {
    systems: Vec<Arc<dyn ProjectSystem>>,
}

impl ProjectSystemPredicate {
    pub fn new(systems: Vec<Arc<dyn ProjectSystem>>) -> Self {
        Self { systems }
    }
}

impl PredicateHandler for ProjectSystemPredicate {
    fn language_for_path(&self, path: &str) -> Option<String> {
        let path = path.trim();
        if path.is_empty() {
            return None;
        }

        self.systems
            .iter()
            .filter(|system| system.is_initialized())
            .find(|system| system.claims(path))
            .map(|system| system.language().to_string())
    }
}

/// Binds an endpoint to one fixed language.
#[derive(Debug, Clone)]
pub struct StaticPredicate(String);

impl StaticPredicate {
    pub fn new(language: impl Into<String>) -> Self {
        Self(language.into())
    }
}

impl PredicateHandler for StaticPredicate {
    fn language_for_path(&self, _path: &str) -> Option<String> {
        Some(self.0.clone())
    }
}

/// Outcome of language resolution for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// Named by the request itself.
    Explicit(String),
    /// Derived from the file name or the endpoint predicate.
    Inferred(String),
    Unresolved,
}

impl Resolution {
    pub fn language(&self) -> Option<&str> {
        match self {
            Self::Explicit(l) | Self::Inferred(l) => Some(l),
            Self::Unresolved => None,
        }
    }
}

pub fn resolve_language(
    descriptor: &EndpointDescriptor,
    hints: &RoutingHints,
    predicate: &dyn PredicateHandler,
) -> Resolution {
    if descriptor.has_language
        && let Some(language) = hints.language()
    {
        return Resolution::Explicit(language.to_string());
    }

    if descriptor.has_file_name
        && let Some(file_name) = hints.file_name()
    {
        return predicate
            .language_for_path(file_name)
            .map(Resolution::Inferred)
            .unwrap_or(Resolution::Unresolved);
    }

    predicate
        .language_for_path("")
        .map(Resolution::Inferred)
        .unwrap_or(Resolution::Unresolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::endpoint::{Endpoint, FindSymbols, GotoDefinition, WorkspaceInformation};

    fn systems() -> ProjectSystemPredicate {
        ProjectSystemPredicate::new(vec![
            Arc::new(StaticProjectSystem::new("MSBuild", "csharp", [".cs", ".csx"])),
            Arc::new(StaticProjectSystem::new("Fsi", "fsharp", ["fs"])),
            Arc::new(StaticProjectSystem::new("B", "B", [".b"])),
        ])
    }

    fn hints(value: serde_json::Value) -> RoutingHints {
        RoutingHints::inspect(&value)
    }

    #[test]
    fn test_explicit_language_wins_over_extension() {
        let descriptor = EndpointDescriptor {
            has_file_name: true,
            ..FindSymbols::descriptor()
        };
        let resolution = resolve_language(
            &descriptor,
            &hints(serde_json::json!({"Language": "A", "FileName": "x.b"})),
            &systems(),
        );
        assert_eq!(resolution, Resolution::Explicit("A".to_string()));
    }

    #[test]
    fn test_extension_fallback() {
        let resolution = resolve_language(
            &GotoDefinition::descriptor(),
            &hints(serde_json::json!({"FileName": "src/Foo.CS"})),
            &systems(),
        );
        assert_eq!(resolution, Resolution::Inferred("csharp".to_string()));

        let resolution = resolve_language(
            &GotoDefinition::descriptor(),
            &hints(serde_json::json!({"FileName": "a.fs"})),
            &systems(),
        );
        assert_eq!(resolution.language(), Some("fsharp"));
    }

    #[test]
    fn test_uninitialized_systems_are_skipped() {
        let pending = Arc::new(StaticProjectSystem::new("MSBuild", "csharp", [".cs"]));
        pending.set_initialized(false);
        let script: Arc<dyn ProjectSystem> =
            Arc::new(StaticProjectSystem::new("Script", "csx", [".cs"]));
        let predicate = ProjectSystemPredicate::new(vec![pending as Arc<dyn ProjectSystem>, script]);
        assert_eq!(predicate.language_for_path("a.cs").as_deref(), Some("csx"));
    }

    #[test]
    fn test_language_ignored_when_request_type_lacks_field() {
        // GotoDefinition requests carry no Language member.
        let resolution = resolve_language(
            &GotoDefinition::descriptor(),
            &hints(serde_json::json!({"Language": "vb", "FileName": "a.unknown"})),
            &systems(),
        );
        assert_eq!(resolution, Resolution::Unresolved);
    }

    #[test]
    fn test_neither_field_consults_empty_path() {
        let descriptor = WorkspaceInformation::descriptor();
        let empty = hints(serde_json::json!({}));
        assert_eq!(resolve_language(&descriptor, &empty, &systems()), Resolution::Unresolved);
        assert_eq!(
            resolve_language(&descriptor, &empty, &StaticPredicate::new("Projects")),
            Resolution::Inferred("Projects".to_string())
        );
    }

    #[test]
    fn test_blank_language_falls_through() {
        let resolution = resolve_language(
            &FindSymbols::descriptor(),
            &hints(serde_json::json!({"Language": ""})),
            &systems(),
        );
        assert_eq!(resolution, Resolution::Unresolved);
    }
}
