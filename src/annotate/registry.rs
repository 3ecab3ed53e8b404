//! Registry of the annotators a pipeline stage can name.

use indexmap::IndexMap;

use crate::err::Error;

use super::{score, variant, Annotator, StageContext};

/// Builds the annotator of a stage.
pub type AnnotatorFactory = fn(&StageContext) -> Result<Box<dyn Annotator>, anyhow::Error>;

/// Metadata describing a registered annotator.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotatorInfo {
    pub name: String,
    pub description: String,
}

#[derive(Debug, Clone)]
struct Entry {
    factory: AnnotatorFactory,
    description: String,
}

/// Annotators available by name.
#[derive(Debug, Clone, Default)]
pub struct AnnotatorRegistry {
    entries: IndexMap<String, Entry>,
}

impl AnnotatorRegistry {
    /// Registry with the annotators shipped with this crate.
    pub fn with_builtins() -> Self {
        let mut registry = Self::default();
        registry.register(
            variant::NAME,
            "normalize variant columns into virtual VF:* columns",
            variant::create,
        );
        registry.register(
            score::POSITION_SCORE,
            "per-position scores from a tabix indexed score file",
            score::create_position_score,
        );
        registry.register(
            score::NP_SCORE,
            "per-allele scores from a tabix indexed score file",
            score::create_np_score,
        );
        registry.register(
            score::ALLELE_SCORE,
            "scores of exactly matching alleles from a tabix indexed score file",
            score::create_allele_score,
        );
        registry
    }

    /// Register `factory` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: &str, description: &str, factory: AnnotatorFactory) {
        self.entries.insert(
            name.to_owned(),
            Entry {
                factory,
                description: description.to_owned(),
            },
        );
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn list(&self) -> Vec<AnnotatorInfo> {
        self.entries
            .iter()
            .map(|(name, entry)| AnnotatorInfo {
                name: name.clone(),
                description: entry.description.clone(),
            })
            .collect()
    }

    /// Instantiate annotator `name` for the stage described by `ctx`.
    pub fn create(&self, name: &str, ctx: &StageContext) -> Result<Box<dyn Annotator>, anyhow::Error> {
        let entry = self.entries.get(name).ok_or_else(|| {
            Error::config(format!(
                "stage [{}] names unknown annotator {:?}, available: {}",
                ctx.name,
                name,
                self.entries.keys().map(String::as_str).collect::<Vec<_>>().join(", ")
            ))
        })?;
        tracing::debug!("creating annotator {} for stage [{}]", name, ctx.name);
        (entry.factory)(ctx)
    }
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::annotate::{Cell, Options};

    #[derive(Debug)]
    struct Constant;

    impl Annotator for Constant {
        fn line_annotations(&mut self, _line: &[Cell], keys: &[String]) -> Result<Vec<Cell>, anyhow::Error> {
            Ok(keys.iter().map(|_| Some(String::from("x"))).collect())
        }
    }

    fn constant(_ctx: &StageContext) -> Result<Box<dyn Annotator>, anyhow::Error> {
        Ok(Box::new(Constant))
    }

    #[test]
    fn builtins_are_listed() {
        let names = AnnotatorRegistry::with_builtins()
            .list()
            .into_iter()
            .map(|info| info.name)
            .collect::<Vec<_>>();

        assert_eq!(names, vec!["variant_format", "position_score", "np_score", "allele_score"]);
    }

    #[test]
    fn create_registered() -> Result<(), anyhow::Error> {
        let mut registry = AnnotatorRegistry::default();
        registry.register("constant", "always x", constant);
        let options = Options::new();
        let keys = vec![String::from("a"), String::from("b")];
        let ctx = StageContext {
            name: "stage",
            options: &options,
            header: &[],
            keys: &keys,
        };

        let mut annotator = registry.create("constant", &ctx)?;

        assert_eq!(
            annotator.line_annotations(&[], &keys)?,
            vec![Some("x".to_owned()), Some("x".to_owned())]
        );
        Ok(())
    }

    #[test]
    fn create_unknown() {
        let registry = AnnotatorRegistry::with_builtins();
        let options = Options::new();
        let ctx = StageContext {
            name: "stage",
            options: &options,
            header: &[],
            keys: &[],
        };

        let err = registry.create("nope", &ctx).unwrap_err();

        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Config(_))));
        assert!(err.to_string().contains("position_score"));
    }
}
